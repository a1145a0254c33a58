//! # lib_transit
//!
//! Live bus positions for a fixed city network: a websocket feed session
//! folds per-stop vehicle updates into one in-memory view keyed by vehicle,
//! while the compiled-in route topology stays available for rendering
//! regardless of feed readiness.
//!
//! ## Modules
//! - **`topology`**: the built-in street and stop-sequence table.
//! - **`catalog`**: stop and line display names resolved from the city script.
//! - **`reconciler`**: `LiveState` and its atomically published store.
//! - **`preferences`**: the persisted board settings.
//! - **`board`**: the query surface and board composition for rendering.
//! - **`feed`** (feature `feed`): the Socket.IO session and its codec.
//! - **`retrieve`** (feature `retrieve`): HTTP bootstrap of credential and catalog.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod board;
pub mod catalog;
pub mod error;
pub mod preferences;
pub mod reconciler;
pub mod topology;

#[cfg(feature = "feed")]
pub mod feed;

#[cfg(feature = "retrieve")]
pub mod retrieve;

// --- Public API Re-exports ---
pub use board::{BoardState, BoardView};
pub use catalog::{Catalog, CatalogStatus, UNKNOWN_STOP};
pub use error::{Result, TransitError};
pub use preferences::{PreferenceStore, Preferences, PreferencesPatch};
pub use reconciler::{LiveState, LiveStore, VehicleSighting};
pub use topology::{RouteTable, StopRef, Street};
