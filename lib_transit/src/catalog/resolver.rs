//! # Catalog Resolver
//!
//! The city script embeds two JavaScript literals:
//!
//! - `stops=[{ value: "<name>", ids: [<stop id>, ...] }, ...];`
//! - `BUSES={ "<line id>": { name: "<name>", ... }, ... };`
//!
//! They are parsed as JSON5, which covers the object-literal forms the script
//! uses, and then walked structurally. Nothing is evaluated.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::error::CatalogError;

/// Variable holding the stop groups.
pub const STOPS_VAR: &str = "stops";
/// Variable holding the vehicle-line definitions.
pub const BUSES_VAR: &str = "BUSES";

/// Returns the right-hand side of `<name>=...;` in `script`.
pub fn extract_assignment<'a>(script: &'a str, name: &'static str) -> Result<&'a str, CatalogError> {
    let pattern = format!(r"\b{}=([^;]+);", regex::escape(name));
    let re = Regex::new(&pattern).map_err(|e| CatalogError::Parse { blob: name, reason: e.to_string() })?;

    re.captures(script)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(CatalogError::PatternNotFound(name))
}

/// Inverts the stop groups into a flat `stop id -> name` map.
///
/// An id listed by several groups keeps the name of the last one.
pub fn resolve_stops(blob: &str) -> Result<HashMap<String, String>, CatalogError> {
    let root = parse_literal(blob, STOPS_VAR)?;
    let groups = root.as_array().ok_or_else(|| shape(STOPS_VAR, "expected an array of groups"))?;

    let mut stops = HashMap::new();
    for (idx, group) in groups.iter().enumerate() {
        let name = group["value"]
            .as_str()
            .ok_or_else(|| shape(STOPS_VAR, &format!("group {idx} has no string 'value'")))?;
        let ids = group["ids"]
            .as_array()
            .ok_or_else(|| shape(STOPS_VAR, &format!("group {idx} has no 'ids' array")))?;

        for id in ids {
            let id = wire_id(id).ok_or_else(|| shape(STOPS_VAR, &format!("group {idx} has a non-scalar id")))?;
            stops.insert(id, name.to_string());
        }
    }

    Ok(stops)
}

/// Projects the line definitions onto `line id -> name`.
pub fn resolve_vehicles(blob: &str) -> Result<HashMap<String, String>, CatalogError> {
    let root = parse_literal(blob, BUSES_VAR)?;
    let lines = root.as_object().ok_or_else(|| shape(BUSES_VAR, "expected an object keyed by line id"))?;

    lines
        .iter()
        .map(|(line_id, def)| {
            def["name"]
                .as_str()
                .map(|name| (line_id.clone(), name.to_string()))
                .ok_or_else(|| shape(BUSES_VAR, &format!("line {line_id} has no string 'name'")))
        })
        .collect()
}

/// Normalizes an id that may arrive as a JSON number or string.
pub(crate) fn wire_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                // JSON5 may hand integers back as floats.
                n.as_f64().filter(|f| f.fract() == 0.0).map(|f| format!("{f:.0}"))
            }
        }
        _ => None,
    }
}

fn parse_literal(blob: &str, name: &'static str) -> Result<Value, CatalogError> {
    json5::from_str::<Value>(blob).map_err(|e| CatalogError::Parse { blob: name, reason: e.to_string() })
}

fn shape(blob: &'static str, reason: &str) -> CatalogError {
    CatalogError::Shape { blob, reason: reason.to_string() }
}
