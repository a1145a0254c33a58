//! # Route Topology
//!
//! Static description of the named streets shown on the board. Each street
//! carries an `up` and a `down` stop sequence; `border` markers separate
//! adjacent named segments and only matter to rendering.
//!
//! The table is built once, validated, and never mutated. Lookups that miss
//! are configuration errors.

mod streets;

use serde::Serialize;

use crate::error::TopologyError;

/// A stop as it appears in a street's sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopRef {
    /// Opaque stable stop identifier.
    pub id: String,
    /// Marks a visual boundary between adjacent named segments.
    pub border: bool,
}

impl StopRef {
    /// Plain stop without a boundary marker.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), border: false }
    }

    /// Stop that starts a new named segment.
    pub fn border(id: impl Into<String>) -> Self {
        Self { id: id.into(), border: true }
    }
}

/// Named corridor with one or two directional stop sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Street {
    pub name: String,
    pub up: Vec<StopRef>,
    pub down: Vec<StopRef>,
    /// When set, `up == down` and the direction toggle is disabled.
    pub one_direction: bool,
}

impl Street {
    /// Builds a street from stop sequences in authored order.
    ///
    /// The board lists stops from the far end toward the centre, so both
    /// sequences are reversed here.
    pub fn authored(name: &str, up: Vec<StopRef>, down: Vec<StopRef>, one_direction: bool) -> Self {
        Self {
            name: name.to_string(),
            up: up.into_iter().rev().collect(),
            down: down.into_iter().rev().collect(),
            one_direction,
        }
    }

    /// Returns the sequence for the requested direction (`true` is "up").
    ///
    /// One-direction streets always answer with `up`.
    pub fn stops(&self, direction: bool) -> &[StopRef] {
        if direction || self.one_direction {
            &self.up
        } else {
            &self.down
        }
    }

    fn validate(&self) -> Result<(), TopologyError> {
        if self.up.is_empty() {
            return Err(TopologyError::EmptySequence { street: self.name.clone(), direction: "up" });
        }
        if self.down.is_empty() {
            return Err(TopologyError::EmptySequence { street: self.name.clone(), direction: "down" });
        }
        if self.one_direction && self.up != self.down {
            return Err(TopologyError::OneDirectionMismatch(self.name.clone()));
        }
        Ok(())
    }
}

/// The validated, read-only street table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    // Declaration order is kept; it drives the selector layout.
    streets: Vec<Street>,
}

impl RouteTable {
    /// Validates and wraps a list of streets.
    pub fn new(streets: Vec<Street>) -> Result<Self, TopologyError> {
        for (idx, street) in streets.iter().enumerate() {
            street.validate()?;
            if streets[..idx].iter().any(|s| s.name == street.name) {
                return Err(TopologyError::DuplicateStreet(street.name.clone()));
            }
        }
        Ok(Self { streets })
    }

    /// The compiled-in Norilsk table.
    ///
    /// # Panics
    /// Panics if the compiled-in data fails validation.
    pub fn builtin() -> Self {
        Self::new(streets::builtin_streets()).unwrap_or_else(|e| panic!("built-in route table is invalid: {e}"))
    }

    pub fn lookup(&self, name: &str) -> Result<&Street, TopologyError> {
        self.streets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| TopologyError::StreetNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streets.iter().any(|s| s.name == name)
    }

    /// Street names in declaration order.
    pub fn street_names(&self) -> Vec<&str> {
        self.streets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn streets(&self) -> &[Street] {
        &self.streets
    }
}
