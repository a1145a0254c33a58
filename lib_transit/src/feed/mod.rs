//! # Live Feed Module
//!
//! Everything needed to hold a subscription to the live vehicle feed open:
//! the Socket.IO frame codec, the outbound/inbound message protocol, the
//! reconnect pacing and the session reactor that ties them together.
//!
//! ## Contained Modules:
//! - **`codec`**: Engine.IO / Socket.IO text frame decoding and event encoding.
//! - **`protocol`**: Authentication and join frames, topic naming and the
//!   event demultiplexer that turns envelopes into vehicle sightings.
//! - **`backoff`**: Exponential reconnect delays with jitter.
//! - **`session`**: The `Session` state machine and its reactor task.
//!
//! The primary types are re-exported so callers can reach them via
//! `lib_transit::feed::...`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Reconnect pacing.
pub mod backoff;
/// Socket.IO v2 / Engine.IO v3 text frames.
pub mod codec;
/// Feed messages and event routing.
pub mod protocol;
/// Session lifecycle and reactor.
pub mod session;

// --- Public API Re-exports ---
pub use backoff::Backoff;
pub use protocol::{topic_for, Demultiplexer};
pub use session::{socket_url, Session, SessionConfig, SessionState};
