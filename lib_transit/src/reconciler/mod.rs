//! # Live State Reconciler
//!
//! Folds batches of vehicle sightings into one canonical map keyed by vehicle
//! identity. Every sighting replaces the previous one for that vehicle in
//! full; vehicles that stop reporting stay at their last known stop until the
//! session resets.
//!
//! [`LiveStore`] is the shared handle. The feed session is its only writer and
//! publishes each merged batch as a fresh `Arc<LiveState>`, so readers see
//! either the state before a batch or after it, never half of one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Latest known stop of one physical vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSighting {
    pub vehicle_id: String,
    pub stop_id: String,
    /// Resolved when the envelope arrived; `"unknown_stop"` if not in the catalog.
    pub stop_name: String,
    pub line_id: String,
    /// Display name of the line, if the catalog knows it.
    pub bus: Option<String>,
    pub seen_at: DateTime<Utc>,
}

/// Canonical position of every vehicle seen this session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LiveState {
    vehicles: HashMap<String, VehicleSighting>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state with `candidates` merged in.
    ///
    /// Candidates win over existing entries, later candidates win over earlier
    /// ones with the same vehicle id, and nothing is ever removed.
    pub fn apply<I>(&self, candidates: I) -> LiveState
    where
        I: IntoIterator<Item = VehicleSighting>,
    {
        let mut next = self.clone();
        next.merge(candidates);
        next
    }

    fn merge<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = VehicleSighting>,
    {
        for sighting in candidates {
            self.vehicles.insert(sighting.vehicle_id.clone(), sighting);
        }
    }

    pub fn get(&self, vehicle_id: &str) -> Option<&VehicleSighting> {
        self.vehicles.get(vehicle_id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Sightings whose latest stop is `stop_id`.
    pub fn at_stop<'a>(&'a self, stop_id: &'a str) -> impl Iterator<Item = &'a VehicleSighting> + 'a {
        self.vehicles.values().filter(move |s| s.stop_id == stop_id)
    }
}

/// Single-writer, many-reader handle on the published [`LiveState`].
#[derive(Debug, Clone, Default)]
pub struct LiveStore {
    current: Arc<RwLock<Arc<LiveState>>>,
}

impl LiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch and publishes the result. Returns the new vehicle count.
    pub fn apply(&self, batch: Vec<VehicleSighting>) -> usize {
        if batch.is_empty() {
            return self.snapshot().len();
        }

        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = guard.apply(batch);
        let count = next.len();
        *guard = Arc::new(next);
        count
    }

    /// The latest complete state.
    pub fn snapshot(&self) -> Arc<LiveState> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Discards every sighting.
    pub fn reset(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(LiveState::new());
    }
}
