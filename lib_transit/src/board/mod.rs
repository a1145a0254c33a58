//! # Board
//!
//! The query surface used by rendering. [`BoardState`] bundles the route
//! table, the catalog status, the live store and the preference store, and
//! composes them into a [`BoardView`]: one row per stop of the chosen street
//! and direction, each listing the vehicles last seen there.
//!
//! Composition never fails. A missing catalog yields [`BoardView::Loading`],
//! a failed bootstrap [`BoardView::Unavailable`].

use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::catalog::{Catalog, CatalogStatus};
use crate::error::TopologyError;
use crate::preferences::{PreferenceStore, Preferences, PreferencesPatch};
use crate::reconciler::{LiveState, LiveStore, VehicleSighting};
use crate::topology::{RouteTable, Street};

/// One stop of the displayed sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    pub stop_id: String,
    pub name: String,
    pub border: bool,
    /// Vehicles whose latest sighting is this stop, ordered by vehicle id.
    pub vehicles: Vec<String>,
}

/// A fully composed board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub street: String,
    /// Effective direction; always `true` on one-direction streets.
    pub direction: bool,
    /// Whether the direction toggle applies to this street.
    pub can_toggle: bool,
    pub show_numbers: bool,
    pub rows: Vec<BoardRow>,
}

/// What rendering should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BoardView {
    Loading,
    Unavailable { reason: String },
    Ready(BoardSnapshot),
}

/// Display label of one vehicle.
///
/// The line id stands in for the line name when the catalog does not know it.
pub fn vehicle_label(sighting: &VehicleSighting, show_numbers: bool) -> String {
    let bus = sighting.bus.as_deref().unwrap_or(&sighting.line_id);
    if show_numbers {
        format!("{} ({})", bus, sighting.vehicle_id)
    } else {
        bus.to_string()
    }
}

/// Lays `street` out as board rows.
pub fn compose_rows(street: &Street, direction: bool, catalog: &Catalog, live: &LiveState, show_numbers: bool) -> Vec<BoardRow> {
    street
        .stops(direction)
        .iter()
        .map(|stop| {
            let mut here: Vec<&VehicleSighting> = live.at_stop(&stop.id).collect();
            here.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));

            BoardRow {
                stop_id: stop.id.clone(),
                name: catalog.stop_name(&stop.id).to_string(),
                border: stop.border,
                vehicles: here.into_iter().map(|s| vehicle_label(s, show_numbers)).collect(),
            }
        })
        .collect()
}

/// Shared state behind the query surface. Cheap to clone.
#[derive(Clone)]
pub struct BoardState {
    routes: Arc<RouteTable>,
    catalog: Arc<RwLock<CatalogStatus>>,
    live: LiveStore,
    preferences: PreferenceStore,
}

impl BoardState {
    /// Starts with the catalog in `Loading`.
    pub fn new(routes: RouteTable, live: LiveStore, preferences: PreferenceStore) -> Self {
        Self {
            routes: Arc::new(routes),
            catalog: Arc::new(RwLock::new(CatalogStatus::Loading)),
            live,
            preferences,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn get_street(&self, name: &str) -> Result<&Street, TopologyError> {
        self.routes.lookup(name)
    }

    pub fn get_catalog(&self) -> CatalogStatus {
        self.catalog.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces the catalog status, typically once when bootstrap settles.
    pub fn set_catalog(&self, status: CatalogStatus) {
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = status;
    }

    pub fn get_live_state(&self) -> Arc<LiveState> {
        self.live.snapshot()
    }

    pub fn live(&self) -> &LiveStore {
        &self.live
    }

    /// Stored preferences. A stored street that is no longer configured is
    /// replaced by the default street.
    pub fn preferences(&self) -> Preferences {
        let mut prefs = self.preferences.load();
        if !self.routes.contains(&prefs.street) {
            log::warn!("Stored street '{}' is not configured; using '{}'", prefs.street, self.preferences.defaults().street);
            prefs.street = self.preferences.defaults().street.clone();
        }
        prefs
    }

    /// Applies and persists a partial preference change.
    ///
    /// # Errors
    /// `TopologyError::StreetNotFound` if the patch names an unknown street;
    /// nothing is stored then.
    pub fn set_preferences(&self, mut patch: PreferencesPatch) -> Result<Preferences, TopologyError> {
        match &patch.street {
            Some(street) => {
                self.routes.lookup(street)?;
            }
            None if !self.routes.contains(&self.preferences.load().street) => {
                patch.street = Some(self.preferences.defaults().street.clone());
            }
            None => {}
        }
        Ok(self.preferences.update(patch))
    }

    /// Composes the board for `prefs`.
    pub fn compose(&self, prefs: &Preferences) -> BoardView {
        let catalog = match self.get_catalog() {
            CatalogStatus::Loading => return BoardView::Loading,
            CatalogStatus::Unavailable(reason) => return BoardView::Unavailable { reason },
            CatalogStatus::Ready(catalog) if catalog.is_empty() => return BoardView::Loading,
            CatalogStatus::Ready(catalog) => catalog,
        };

        let street = match self.routes.lookup(&prefs.street) {
            Ok(street) => street,
            Err(e) => return BoardView::Unavailable { reason: e.to_string() },
        };

        let direction = prefs.direction || street.one_direction;
        let live = self.live.snapshot();

        BoardView::Ready(BoardSnapshot {
            street: street.name.clone(),
            direction,
            can_toggle: !street.one_direction,
            show_numbers: prefs.show_numbers,
            rows: compose_rows(street, direction, &catalog, &live, prefs.show_numbers),
        })
    }

    /// The board for the stored preferences.
    pub fn board(&self) -> BoardView {
        self.compose(&self.preferences())
    }
}
