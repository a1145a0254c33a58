//! # Feed Protocol
//!
//! Outbound messages (authentication, topic joins) and the inbound
//! demultiplexer. Every event whose name does not start with the subscribed
//! `<namespace>.bus_mode1__` prefix is dropped; matching events carry
//!
//! ```text
//! { "bdata_mode1": { "<stop id>": [ { "g": <vehicle id>, "id": <line id> }, ... ] } }
//! ```
//!
//! and turn into one [`VehicleSighting`] per record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::codec::{self, Event};
use crate::catalog::resolver::wire_id;
use crate::catalog::Catalog;
use crate::reconciler::VehicleSighting;

/// Topic family of per-line vehicle positions.
pub const BUS_MODE_TOPIC: &str = "bus_mode1__";

/// Payload key holding the per-stop vehicle lists.
pub const BUS_DATA_KEY: &str = "bdata_mode1";

/// Client identifier sent with the authentication message.
pub const CLIENT_OS: &str = "web";

#[derive(Debug, Serialize)]
struct Authentication<'a> {
    username: &'a str,
    password: &'a str,
    os: &'a str,
}

/// Topic name for one vehicle line.
pub fn topic_for(namespace: &str, line_id: &str) -> String {
    format!("{namespace}.{BUS_MODE_TOPIC}{line_id}")
}

/// The `authentication` event frame. The password is always empty.
pub fn authentication_frame(credential: &str) -> String {
    let auth = Authentication { username: credential, password: "", os: CLIENT_OS };
    let payload = serde_json::to_value(&auth).unwrap_or(Value::Null);
    codec::encode_event("authentication", &payload)
}

/// The `join` event frame for one topic.
pub fn join_frame(topic: &str) -> String {
    codec::encode_event("join", &Value::String(topic.to_string()))
}

/// Routes inbound events by name to the vehicle-position handler.
#[derive(Debug, Clone)]
pub struct Demultiplexer {
    prefix: String,
}

impl Demultiplexer {
    pub fn new(namespace: &str) -> Self {
        Self { prefix: format!("{namespace}.{BUS_MODE_TOPIC}") }
    }

    pub fn matches(&self, event_name: &str) -> bool {
        event_name.starts_with(&self.prefix)
    }

    /// Sightings carried by `event`, or `None` when the event is not ours.
    ///
    /// A matching event without `bdata_mode1` yields an empty batch.
    pub fn route(&self, event: &Event, catalog: &Catalog, seen_at: DateTime<Utc>) -> Option<Vec<VehicleSighting>> {
        if !self.matches(&event.name) {
            log::debug!("Dropping event '{}' outside '{}'", event.name, self.prefix);
            return None;
        }

        let batch = event
            .payload()
            .and_then(|payload| payload.get(BUS_DATA_KEY))
            .map(|stops| sightings_from_stops(stops, catalog, seen_at))
            .unwrap_or_default();
        Some(batch)
    }
}

/// Flattens a `stop id -> [records]` map into sightings, in payload order.
pub fn sightings_from_stops(stops: &Value, catalog: &Catalog, seen_at: DateTime<Utc>) -> Vec<VehicleSighting> {
    let Some(stops) = stops.as_object() else {
        log::debug!("'{}' is not an object; skipping envelope", BUS_DATA_KEY);
        return Vec::new();
    };

    let mut batch = Vec::new();
    for (stop_id, records) in stops {
        let Some(records) = records.as_array() else {
            log::debug!("Stop {} carries no record list; skipping", stop_id);
            continue;
        };

        for record in records {
            let (Some(vehicle_id), Some(line_id)) = (wire_id(&record["g"]), wire_id(&record["id"])) else {
                log::debug!("Skipping malformed record at stop {}: {}", stop_id, record);
                continue;
            };

            batch.push(VehicleSighting {
                stop_name: catalog.stop_name(stop_id).to_string(),
                bus: catalog.vehicle_name(&line_id).map(String::from),
                vehicle_id,
                stop_id: stop_id.clone(),
                line_id,
                seen_at,
            });
        }
    }
    batch
}
