use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use wiring::{AutoLayout, GraphEdge, GraphNode, LayoutDirection, Position};

use crate::controls::value_to_text;
use crate::storage::Storage;
use crate::storage_key::layout_key;

pub const LAYOUT_VERSION: u64 = 1;

// ------------------------------------------------------------------
// Layout record
// ------------------------------------------------------------------

/// Node positions and hidden modules for one storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRecord {
    pub version: u64,
    pub nodes: BTreeMap<String, Position>,
    pub hidden_modules: Vec<String>,
}

impl Default for LayoutRecord {
    fn default() -> Self {
        Self {
            version: LAYOUT_VERSION,
            nodes: BTreeMap::new(),
            hidden_modules: Vec::new(),
        }
    }
}

impl LayoutRecord {
    /// Never fails: unreadable text yields the empty record, and each
    /// field falls back on its own.
    pub fn parse(text: &str) -> Self {
        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(text)
        else {
            return Self::default();
        };

        let version = record
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(LAYOUT_VERSION);

        let mut nodes = BTreeMap::new();
        if let Some(Value::Object(entries)) = record.get("nodes") {
            for (alias, position) in entries {
                let x = position.get("x").and_then(Value::as_f64);
                let y = position.get("y").and_then(Value::as_f64);
                if let (Some(x), Some(y)) = (x, y) {
                    nodes.insert(alias.clone(), Position::new(x, y));
                }
            }
        }

        let mut hidden_modules: Vec<String> = match record.get("hidden_modules")
        {
            Some(Value::Array(items)) => {
                items.iter().map(value_to_text).collect()
            }
            _ => Vec::new(),
        };
        hidden_modules.sort();
        hidden_modules.dedup();

        Self {
            version,
            nodes,
            hidden_modules,
        }
    }

    pub fn hidden(&self) -> BTreeSet<String> {
        self.hidden_modules.iter().cloned().collect()
    }

    pub fn is_hidden(&self, alias: &str) -> bool {
        self.hidden_modules.iter().any(|hidden| hidden == alias)
    }

    pub fn set_hidden(&mut self, alias: &str, hidden: bool) {
        let mut set = self.hidden();
        if hidden {
            set.insert(alias.to_string());
        } else {
            set.remove(alias);
        }
        self.hidden_modules = set.into_iter().collect();
    }

    pub fn toggle_hidden(&mut self, alias: &str) {
        let hidden = self.is_hidden(alias);
        self.set_hidden(alias, !hidden);
    }

    pub fn merge_positions(
        &mut self,
        positions: impl IntoIterator<Item = (String, Position)>,
    ) {
        self.nodes.extend(positions);
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::debug!("failed to encode layout: {e}");
            String::new()
        })
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            tracing::debug!("failed to encode layout: {e}");
            String::new()
        })
    }
}

// ------------------------------------------------------------------
// Layout store
// ------------------------------------------------------------------

/// Where layout changes are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutBacking {
    /// The backend exposes a `wiring_layout` control.
    Control,
    /// Device-local storage under `<storage key>:layout`.
    Local { key: String },
}

/// A pending layout write, applied by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutWrite {
    Control { text: String },
    Local { key: String, text: String },
}

/// In-memory layout plus the capability it is persisted through.
///
/// Every mutation updates the record first and returns the single write
/// that persists the whole record.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutStore {
    backing: LayoutBacking,
    record: LayoutRecord,
}

impl LayoutStore {
    pub fn control_backed(control_text: &str) -> Self {
        Self {
            backing: LayoutBacking::Control,
            record: LayoutRecord::parse(control_text),
        }
    }

    pub fn load_local(storage: &dyn Storage, storage_key: &str) -> Self {
        let key = layout_key(storage_key);
        let record = storage
            .get(&key)
            .map(|text| LayoutRecord::parse(&text))
            .unwrap_or_default();
        Self {
            backing: LayoutBacking::Local { key },
            record,
        }
    }

    /// A local store that starts from `record` instead of storage.
    pub fn local_with(storage_key: &str, record: LayoutRecord) -> Self {
        Self {
            backing: LayoutBacking::Local {
                key: layout_key(storage_key),
            },
            record,
        }
    }

    pub fn backing(&self) -> &LayoutBacking {
        &self.backing
    }

    pub fn record(&self) -> &LayoutRecord {
        &self.record
    }

    /// Content fingerprint of the current record.
    pub fn text(&self) -> String {
        self.record.to_json()
    }

    pub fn save(&mut self, record: LayoutRecord) -> LayoutWrite {
        self.record = LayoutRecord {
            version: LAYOUT_VERSION,
            ..record
        };
        self.write()
    }

    /// The write that persists the current record as is.
    pub fn write(&self) -> LayoutWrite {
        match &self.backing {
            LayoutBacking::Control => LayoutWrite::Control {
                text: self.record.to_json_pretty(),
            },
            LayoutBacking::Local { key } => LayoutWrite::Local {
                key: key.clone(),
                text: self.record.to_json(),
            },
        }
    }

    pub fn toggle_hidden(&mut self, alias: &str) -> LayoutWrite {
        let mut record = self.record.clone();
        record.toggle_hidden(alias);
        self.save(record)
    }

    pub fn set_hidden(&mut self, alias: &str, hidden: bool) -> LayoutWrite {
        let mut record = self.record.clone();
        record.set_hidden(alias, hidden);
        self.save(record)
    }

    pub fn store_positions(
        &mut self,
        positions: impl IntoIterator<Item = (String, Position)>,
    ) -> LayoutWrite {
        let mut record = self.record.clone();
        record.merge_positions(positions);
        self.save(record)
    }

    /// Forget every position; hidden modules stay hidden.
    pub fn reset_layout(&mut self) -> LayoutWrite {
        let mut record = self.record.clone();
        record.nodes.clear();
        self.save(record)
    }

    /// Place `nodes` with `engine` and persist all positions in one write.
    pub fn auto_layout(
        &mut self,
        engine: &dyn AutoLayout,
        direction: LayoutDirection,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> (Vec<GraphNode>, LayoutWrite) {
        let placed = engine.layout(nodes, edges, direction);
        let write = self.store_positions(
            placed.iter().map(|node| (node.id.clone(), node.position)),
        );
        (placed, write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use crate::storage::MemoryStorage;
    use wiring::LayeredLayout;

    #[test]
    fn test_parse_is_lenient() {
        assert_eq!(LayoutRecord::parse("nope"), LayoutRecord::default());
        assert_eq!(LayoutRecord::parse("[]"), LayoutRecord::default());

        let record = LayoutRecord::parse(
            r#"{"nodes": {"a": {"x": 10, "y": 20}, "b": {"x": "left"}},
                "hidden_modules": ["z", "e", "z"]}"#,
        );
        assert_eq!(record.version, 1);
        assert_eq!(record.nodes.len(), 1);
        assert_eq!(record.nodes["a"], Position::new(10.0, 20.0));
        assert_eq!(record.hidden_modules, vec!["e", "z"]);

        let odd = LayoutRecord::parse(r#"{"nodes": [], "hidden_modules": 3}"#);
        assert!(odd.nodes.is_empty());
        assert!(odd.hidden_modules.is_empty());
    }

    #[test]
    fn test_toggle_hidden_keeps_sorted_and_positions() {
        let mut store = LayoutStore::control_backed(
            r#"{"version":1,"nodes":{"a":{"x":1,"y":2}},
                "hidden_modules":["m"]}"#,
        );
        store.toggle_hidden("c");
        assert_eq!(store.record().hidden_modules, vec!["c", "m"]);
        store.toggle_hidden("m");
        assert_eq!(store.record().hidden_modules, vec!["c"]);
        assert_eq!(store.record().nodes["a"], Position::new(1.0, 2.0));
    }

    #[test]
    fn test_writes_follow_backing() {
        let mut control = LayoutStore::control_backed("{}");
        let write = control.toggle_hidden("a");
        let LayoutWrite::Control { text } = write else {
            panic!("expected a control write");
        };
        assert!(text.contains("\n  \"hidden_modules\""));

        let storage = MemoryStorage::new();
        let mut local =
            LayoutStore::load_local(&storage, "simui:wiring:run:r1");
        assert_eq!(
            local.toggle_hidden("a"),
            LayoutWrite::Local {
                key: String::from("simui:wiring:run:r1:layout"),
                text: String::from(
                    r#"{"version":1,"nodes":{},"hidden_modules":["a"]}"#
                ),
            }
        );
    }

    #[test]
    fn test_load_local_reads_stored_record() {
        let storage = MemoryStorage::new().with_entry(
            "k:layout",
            r#"{"version":1,"nodes":{"a":{"x":5,"y":6}},"hidden_modules":[]}"#,
        );
        let store = LayoutStore::load_local(&storage, "k");
        assert_eq!(store.record().nodes["a"], Position::new(5.0, 6.0));
        let missing = LayoutStore::load_local(&storage, "other");
        assert_eq!(missing.record(), &LayoutRecord::default());
    }

    #[test]
    fn test_reset_keeps_hidden() {
        let mut store = LayoutStore::control_backed(
            r#"{"nodes":{"a":{"x":1,"y":2}},"hidden_modules":["b"]}"#,
        );
        store.reset_layout();
        assert!(store.record().nodes.is_empty());
        assert_eq!(store.record().hidden_modules, vec!["b"]);
    }

    #[test]
    fn test_auto_layout_persists_every_position_at_once() {
        let node = |id: &str| GraphNode {
            id: id.to_string(),
            inputs: vec![],
            outputs: vec![],
            position: Position::ORIGIN,
        };
        let nodes = vec![node("a"), node("b")];
        let mut store = LayoutStore::control_backed("{}");
        let (placed, write) = store.auto_layout(
            &LayeredLayout::default(),
            LayoutDirection::LeftToRight,
            &nodes,
            &[],
        );
        assert_eq!(placed.len(), 2);
        assert_eq!(store.record().nodes.len(), 2);
        assert!(matches!(write, LayoutWrite::Control { .. }));
        assert!(store.record().nodes.values().all(|p| !p.is_origin()));
    }

    fn record_strategy() -> impl Strategy<Value = LayoutRecord> {
        let alias = "[a-z][a-z0-9_]{0,6}";
        let coordinate = (-5000i32..5000).prop_map(f64::from);
        (
            prop::collection::btree_map(
                alias,
                (coordinate.clone(), coordinate),
                0..6,
            ),
            prop::collection::btree_set(alias, 0..4),
        )
            .prop_map(|(nodes, hidden)| LayoutRecord {
                version: LAYOUT_VERSION,
                nodes: nodes
                    .into_iter()
                    .map(|(alias, (x, y))| (alias, Position::new(x, y)))
                    .collect(),
                hidden_modules: hidden.into_iter().collect(),
            })
    }

    proptest! {
        #[test]
        fn prop_record_reads_back_its_own_json(
            record in record_strategy()
        ) {
            let compact = LayoutRecord::parse(&record.to_json());
            let pretty = LayoutRecord::parse(&record.to_json_pretty());
            prop_assert_eq!(&compact, &record);
            prop_assert_eq!(pretty, record);
        }

        #[test]
        fn prop_parse_never_fails(text in ".{0,40}") {
            let record = LayoutRecord::parse(&text);
            let mut sorted = record.hidden_modules.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(record.hidden_modules, sorted);
        }
    }
}
