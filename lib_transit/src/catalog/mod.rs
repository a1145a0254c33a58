//! # Catalog
//!
//! Stop-id and line-id to display-name lookup tables, resolved once from the
//! city script fetched at bootstrap. The catalog is immutable after it is
//! built; a reload replaces it as a whole.
//!
//! ## Contained Modules:
//! - **`resolver`**: extraction of the `stops=` / `BUSES=` assignments from the
//!   raw script and strict structural parsing of their payloads.

pub mod resolver;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::CatalogError;

/// Stop name used when a sighting references a stop the catalog does not know.
pub const UNKNOWN_STOP: &str = "unknown_stop";

/// Resolved display-name tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    /// Stop id to stop display name.
    pub stops: HashMap<String, String>,
    /// Vehicle-line id to line display name.
    pub vehicles: HashMap<String, String>,
}

impl Catalog {
    pub fn new(stops: HashMap<String, String>, vehicles: HashMap<String, String>) -> Self {
        Self { stops, vehicles }
    }

    /// Builds the catalog from the two raw payload blobs.
    pub fn from_blobs(stop_blob: &str, vehicle_blob: &str) -> Result<Self, CatalogError> {
        let stops = resolver::resolve_stops(stop_blob)?;
        let vehicles = resolver::resolve_vehicles(vehicle_blob)?;
        log::info!("Catalog resolved: {} stops, {} lines", stops.len(), vehicles.len());
        Ok(Self { stops, vehicles })
    }

    /// Builds the catalog from the raw city script that embeds both payloads.
    pub fn from_script(script: &str) -> Result<Self, CatalogError> {
        let stop_blob = resolver::extract_assignment(script, resolver::STOPS_VAR)?;
        let vehicle_blob = resolver::extract_assignment(script, resolver::BUSES_VAR)?;
        Self::from_blobs(stop_blob, vehicle_blob)
    }

    /// Display name of a stop, or [`UNKNOWN_STOP`].
    pub fn stop_name(&self, stop_id: &str) -> &str {
        self.stops.get(stop_id).map(String::as_str).unwrap_or(UNKNOWN_STOP)
    }

    pub fn vehicle_name(&self, line_id: &str) -> Option<&str> {
        self.vehicles.get(line_id).map(String::as_str)
    }

    /// True while no stop names are known; the board shows "loading" then.
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

/// Availability of the catalog as seen by rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogStatus {
    /// Bootstrap still running.
    Loading,
    Ready(Arc<Catalog>),
    /// Bootstrap failed or timed out; the reason is shown to the user.
    Unavailable(String),
}

impl CatalogStatus {
    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        match self {
            CatalogStatus::Ready(catalog) => Some(catalog),
            _ => None,
        }
    }
}
