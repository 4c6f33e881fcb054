use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::derive::GraphEdge;
use crate::port_ref::PortRef;

// ------------------------------------------------------------------
// Wire format
// ------------------------------------------------------------------

/// Target side of a wiring entry: a single reference or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Targets {
    One(String),
    Many(Vec<String>),
}

impl Targets {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let refs: &[String] = match self {
            Targets::One(target) => std::slice::from_ref(target),
            Targets::Many(targets) => targets,
        };
        refs.iter().map(String::as_str)
    }
}

/// One `{from, to}` element of the declarative wiring list.
///
/// `from` is empty when the raw value was not a string; such entries never
/// contribute edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringEntry {
    pub from: String,
    pub to: Targets,
}

impl WiringEntry {
    pub fn new(from: impl Into<String>, to: Targets) -> Self {
        Self {
            from: from.into(),
            to,
        }
    }

    fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let from = object
            .get("from")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let raw_targets = object
            .get("to")
            .filter(|value| !value.is_null())
            .or_else(|| object.get("targets"));
        let to = match raw_targets {
            Some(Value::String(target)) => Targets::One(target.clone()),
            Some(Value::Array(items)) => Targets::Many(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => Targets::Many(Vec::new()),
        };
        Self { from, to }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("{0}")]
    Json(String),
    #[error("Wiring must be a JSON array.")]
    NotArray,
}

/// Decode a raw JSON value into wiring entries. Non-object elements are
/// dropped; anything other than an array is rejected.
pub fn decode(raw: &Value) -> Result<Vec<WiringEntry>, FormatError> {
    let Value::Array(items) = raw else {
        return Err(FormatError::NotArray);
    };
    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(WiringEntry::from_object)
        .collect())
}

/// Parse wiring text as held by the `wiring` control.
pub fn parse_wiring_text(
    text: &str,
) -> Result<Vec<WiringEntry>, FormatError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| FormatError::Json(e.to_string()))?;
    decode(&raw)
}

// ------------------------------------------------------------------
// Normal form
// ------------------------------------------------------------------

/// Canonical wiring: source reference -> set of target references, both
/// levels ordered. Encoding this and normalizing again is the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedWiring {
    connections: BTreeMap<String, BTreeSet<String>>,
}

impl NormalizedWiring {
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a WiringEntry>,
    ) -> Self {
        let mut wiring = Self::default();
        for entry in entries {
            let Some(source) = PortRef::parse(&entry.from) else {
                continue;
            };
            for target in entry.to.iter() {
                if let Some(target) = PortRef::parse(target) {
                    wiring.insert(&source, &target);
                }
            }
        }
        wiring
    }

    /// Rebuild wiring from the visual edge set. Edges missing a handle
    /// carry no port and are skipped.
    pub fn from_edges<'a>(
        edges: impl IntoIterator<Item = &'a GraphEdge>,
    ) -> Self {
        let mut wiring = Self::default();
        for edge in edges {
            if edge.source_handle.is_empty()
                || edge.target_handle.is_empty()
            {
                continue;
            }
            wiring.insert(&edge.source_ref(), &edge.target_ref());
        }
        wiring
    }

    pub fn insert(&mut self, source: &PortRef, target: &PortRef) {
        self.connections
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
    }

    /// All `(from, to)` pairs in canonical order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.connections.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |target| (source.as_str(), target.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        self.connections.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn to_entries(&self) -> Vec<WiringEntry> {
        self.connections
            .iter()
            .map(|(source, targets)| {
                WiringEntry::new(
                    source.clone(),
                    Targets::Many(targets.iter().cloned().collect()),
                )
            })
            .collect()
    }

    /// Two-space indented JSON, the text written back to the server.
    pub fn to_json_pretty(&self) -> String {
        // Entries hold only strings, so serialization cannot fail.
        serde_json::to_string_pretty(&self.to_entries())
            .unwrap_or_else(|_| String::from("[]"))
    }
}
