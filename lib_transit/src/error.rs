//! # Error Taxonomy
//!
//! One `thiserror` enum per concern, each convertible into the crate-level
//! [`TransitError`]. Only bootstrap and configuration errors are meant to
//! reach a caller; connection errors are absorbed by the session's reconnect
//! policy and malformed envelopes are skipped where they are decoded.

use thiserror::Error;

/// Errors raised while building or querying the route topology table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Street '{0}' is not configured")]
    StreetNotFound(String),

    #[error("Street '{street}' has an empty '{direction}' stop sequence")]
    EmptySequence { street: String, direction: &'static str },

    #[error("Street '{0}' is one-direction but its up and down sequences differ")]
    OneDirectionMismatch(String),

    #[error("Street '{0}' is declared more than once")]
    DuplicateStreet(String),
}

/// Errors raised while resolving the stop and vehicle-line catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Assignment '{0}=...;' not found in catalog script")]
    PatternNotFound(&'static str),

    #[error("Failed to parse '{blob}' payload: {reason}")]
    Parse { blob: &'static str, reason: String },

    #[error("Unexpected shape in '{blob}' payload: {reason}")]
    Shape { blob: &'static str, reason: String },
}

/// Errors raised by the Socket.IO frame codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown Engine.IO packet type '{0}'")]
    UnknownPacketType(char),

    #[error("Unknown Socket.IO packet type '{0}'")]
    UnknownMessageType(char),

    #[error("Invalid JSON in frame: {0}")]
    Json(String),

    #[error("Event frame carries no event name")]
    MissingEventName,
}

/// Errors raised by one attempt of the live feed session.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid feed endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Handshake did not complete within {0}s")]
    HandshakeTimeout(u64),

    #[error("Server rejected the session: {0}")]
    Rejected(String),

    #[error("Connection closed by remote host")]
    Closed,

    #[error("No frames received for {0}s")]
    Silent(u64),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised while fetching the bootstrap inputs.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Credential not found in page {0}")]
    CredentialNotFound(String),

    #[error("Bootstrap did not complete within {0}s")]
    Timeout(u64),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised by a preference storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("No storage location available")]
    Unavailable,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TransitError>;
