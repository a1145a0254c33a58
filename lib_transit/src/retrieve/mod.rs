//! # Bootstrap Retrieval Module
//!
//! HTTP side of the bootstrap: the city page that carries the feed credential
//! and the city script that embeds the stop and line catalog.
//!
//! ## Contained Modules:
//!
//! - **`http`**: A small text-fetching client built on `reqwest` and
//!   `reqwest-middleware`, with automatic retries of transient failures.
//! - **`bootstrap`**: `BootstrapClient`, which resolves the credential first
//!   and the catalog second, and the credential extraction pattern.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Text fetching with retry middleware.
pub mod http;
/// Credential and catalog bootstrap.
pub mod bootstrap;

pub use bootstrap::{extract_credential, Bootstrap, BootstrapClient, BootstrapConfig};
pub use http::TextClient;
