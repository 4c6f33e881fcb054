use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::codec::{FormatError, WiringEntry, decode};
use crate::port_ref::PortRef;
use crate::ports::PortDeclarations;

// ------------------------------------------------------------------
// Graph types
// ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// A module on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub position: Position,
}

/// One port-to-port connection on the canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

impl GraphEdge {
    pub fn connecting(id: String, source: &PortRef, target: &PortRef) -> Self {
        Self {
            id,
            source: source.module.clone(),
            source_handle: source.port.clone(),
            target: target.module.clone(),
            target_handle: target.port.clone(),
        }
    }

    pub fn source_ref(&self) -> PortRef {
        PortRef::new(self.source.clone(), self.source_handle.clone())
    }

    pub fn target_ref(&self) -> PortRef {
        PortRef::new(self.target.clone(), self.target_handle.clone())
    }

    pub fn touches(&self, alias: &str) -> bool {
        self.source == alias || self.target == alias
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedGraph {
    pub nodes: Vec<GraphNode>,
    /// Every edge the wiring describes, including edges touching hidden
    /// modules.
    pub edges: Vec<GraphEdge>,
    pub needs_layout: bool,
}

impl DerivedGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    /// Edges whose endpoints are both rendered nodes.
    pub fn visible_edges(&self) -> impl Iterator<Item = &GraphEdge> {
        let ids: BTreeSet<&str> =
            self.nodes.iter().map(|node| node.id.as_str()).collect();
        self.edges.iter().filter(move |edge| {
            ids.contains(edge.source.as_str())
                && ids.contains(edge.target.as_str())
        })
    }

    pub fn positions(&self) -> BTreeMap<String, Position> {
        self.nodes
            .iter()
            .map(|node| (node.id.clone(), node.position))
            .collect()
    }
}

// ------------------------------------------------------------------
// Derivation
// ------------------------------------------------------------------

/// Build the visual graph for a wiring list.
///
/// Nodes come from the declared module list, the port declarations and
/// every alias the wiring mentions, minus `hidden`. Edges are kept for
/// hidden modules too; [`DerivedGraph::visible_edges`] drops them at
/// render time. Positions carry over from `previous_nodes` by id.
pub fn derive_graph(
    entries: &[WiringEntry],
    declared_aliases: &[String],
    port_declarations: &PortDeclarations,
    hidden: &BTreeSet<String>,
    previous_nodes: &[GraphNode],
) -> DerivedGraph {
    let mut aliases: BTreeSet<String> =
        declared_aliases.iter().cloned().collect();
    let mut inputs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut outputs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (alias, ports) in port_declarations.iter() {
        aliases.insert(alias.to_string());
        inputs
            .entry(alias.to_string())
            .or_default()
            .extend(ports.inputs.iter().cloned());
        outputs
            .entry(alias.to_string())
            .or_default()
            .extend(ports.outputs.iter().cloned());
    }

    let mut edges = Vec::new();
    let mut counter = 0usize;
    for entry in entries {
        let Some(source) = PortRef::parse(&entry.from) else {
            continue;
        };
        aliases.insert(source.module.clone());
        outputs
            .entry(source.module.clone())
            .or_default()
            .insert(source.port.clone());
        for raw_target in entry.to.iter() {
            let Some(target) = PortRef::parse(raw_target) else {
                continue;
            };
            aliases.insert(target.module.clone());
            inputs
                .entry(target.module.clone())
                .or_default()
                .insert(target.port.clone());
            counter += 1;
            let id = format!("w-{}-{}->{}", counter, entry.from, raw_target);
            edges.push(GraphEdge::connecting(id, &source, &target));
        }
    }

    for alias in hidden {
        aliases.remove(alias);
    }

    let previous: HashMap<&str, Position> = previous_nodes
        .iter()
        .map(|node| (node.id.as_str(), node.position))
        .collect();

    let nodes: Vec<GraphNode> = aliases
        .into_iter()
        .map(|alias| GraphNode {
            inputs: sorted(inputs.get(&alias)),
            outputs: sorted(outputs.get(&alias)),
            position: previous
                .get(alias.as_str())
                .copied()
                .unwrap_or(Position::ORIGIN),
            id: alias,
        })
        .collect();

    let needs_layout = !nodes.is_empty()
        && nodes.iter().all(|node| node.position.is_origin());

    DerivedGraph {
        nodes,
        edges,
        needs_layout,
    }
}

/// [`derive_graph`] over a raw JSON wiring value.
pub fn derive_graph_from_value(
    raw: &Value,
    declared_aliases: &[String],
    port_declarations: &PortDeclarations,
    hidden: &BTreeSet<String>,
    previous_nodes: &[GraphNode],
) -> Result<DerivedGraph, FormatError> {
    let entries = decode(raw)?;
    Ok(derive_graph(
        &entries,
        declared_aliases,
        port_declarations,
        hidden,
        previous_nodes,
    ))
}

fn sorted(ports: Option<&BTreeSet<String>>) -> Vec<String> {
    ports
        .map(|ports| ports.iter().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_wiring_text;
    use crate::ports::PortDirection;
    use serde_json::json;

    fn modules(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_predator_prey_scenario() {
        let entries = parse_wiring_text(
            r#"[{"from":"prey.population","to":"predator.food_signal"}]"#,
        )
        .unwrap();
        let graph = derive_graph(
            &entries,
            &modules(&["prey", "predator"]),
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &[],
        );

        assert_eq!(graph.nodes.len(), 2);
        let predator = graph.node("predator").unwrap();
        assert_eq!(predator.inputs, vec!["food_signal"]);
        assert!(predator.outputs.is_empty());
        let prey = graph.node("prey").unwrap();
        assert_eq!(prey.outputs, vec!["population"]);
        assert!(prey.inputs.is_empty());

        assert_eq!(graph.edges.len(), 1);
        let edge = &graph.edges[0];
        assert_eq!(edge.source, "prey");
        assert_eq!(edge.source_handle, "population");
        assert_eq!(edge.target, "predator");
        assert_eq!(edge.target_handle, "food_signal");
        assert!(graph.needs_layout);
    }

    #[test]
    fn test_wiring_aliases_become_nodes() {
        let entries = parse_wiring_text(
            r#"[{"from":"x.p","to":["y.q","bad"]},{"from":"nope","to":"z.r"}]"#,
        )
        .unwrap();
        let graph = derive_graph(
            &entries,
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &[],
        );
        let ids: Vec<_> =
            graph.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y"]);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn test_declared_ports_merge_with_wired_ports() {
        let mut ports = PortDeclarations::default();
        ports.ensure_port("b", PortDirection::Input, "extra");
        ports.ensure_port("lonely", PortDirection::Output, "signal");
        let entries =
            parse_wiring_text(r#"[{"from":"a.out","to":"b.in"}]"#).unwrap();
        let graph =
            derive_graph(&entries, &[], &ports, &BTreeSet::new(), &[]);

        assert_eq!(graph.node("b").unwrap().inputs, vec!["extra", "in"]);
        assert_eq!(
            graph.node("lonely").unwrap().outputs,
            vec!["signal"]
        );
    }

    #[test]
    fn test_hidden_alias_keeps_edges_out_of_view_only() {
        let entries = parse_wiring_text(
            r#"[{"from":"a.o","to":["b.i","c.i"]}]"#,
        )
        .unwrap();
        let hidden: BTreeSet<String> = ["b".to_string()].into();
        let graph = derive_graph(
            &entries,
            &[],
            &PortDeclarations::default(),
            &hidden,
            &[],
        );

        assert!(graph.node("b").is_none());
        assert_eq!(graph.edges.len(), 2);
        let visible: Vec<_> = graph.visible_edges().collect();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].target, "c");

        let shown = derive_graph(
            &entries,
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &graph.nodes,
        );
        assert_eq!(shown.visible_edges().count(), 2);
    }

    #[test]
    fn test_positions_carry_over_and_clear_needs_layout() {
        let entries =
            parse_wiring_text(r#"[{"from":"a.o","to":"b.i"}]"#).unwrap();
        let first = derive_graph(
            &entries,
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &[],
        );
        assert!(first.needs_layout);

        let mut placed = first.nodes.clone();
        placed[0].position = Position::new(10.0, 20.0);
        let second = derive_graph(
            &entries,
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &placed,
        );
        assert_eq!(
            second.node("a").unwrap().position,
            Position::new(10.0, 20.0)
        );
        assert_eq!(second.node("b").unwrap().position, Position::ORIGIN);
        assert!(!second.needs_layout);
    }

    #[test]
    fn test_empty_graph_never_needs_layout() {
        let graph = derive_graph(
            &[],
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &[],
        );
        assert!(graph.nodes.is_empty());
        assert!(!graph.needs_layout);
    }

    #[test]
    fn test_raw_value_must_be_array() {
        let result = derive_graph_from_value(
            &json!({"from": "a.o"}),
            &[],
            &PortDeclarations::default(),
            &BTreeSet::new(),
            &[],
        );
        assert_eq!(result, Err(FormatError::NotArray));
    }

    #[test]
    fn test_edge_ids_are_stable_for_identical_input() {
        let entries = parse_wiring_text(
            r#"[{"from":"a.o","to":["b.i","c.i"]}]"#,
        )
        .unwrap();
        let derive = || {
            derive_graph(
                &entries,
                &[],
                &PortDeclarations::default(),
                &BTreeSet::new(),
                &[],
            )
        };
        assert_eq!(derive().edges, derive().edges);
        assert_eq!(derive().edges[0].id, "w-1-a.o->b.i");
    }
}
