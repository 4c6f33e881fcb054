use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::derive::{GraphEdge, GraphNode, Position};

/// Main flow direction of a layered layout.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LayoutDirection {
    #[default]
    LeftToRight,
    TopToBottom,
}

/// Places nodes on the canvas.
///
/// Implementations must be deterministic, return exactly one node per input
/// node in the same order, and leave port lists untouched.
pub trait AutoLayout {
    fn layout(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        direction: LayoutDirection,
    ) -> Vec<GraphNode>;
}

/// Layered placement: each module sits one rank after its latest
/// upstream module. Cycles are broken at the node with the fewest
/// pending inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayeredLayout {
    pub node_width: f64,
    pub node_height: f64,
    /// Gap between nodes sharing a rank
    pub node_gap: f64,
    /// Gap between consecutive ranks
    pub rank_gap: f64,
    /// Offset of the first rank and row from the origin
    pub margin: f64,
}

impl Default for LayeredLayout {
    fn default() -> Self {
        Self {
            node_width: 220.0,
            node_height: 140.0,
            node_gap: 40.0,
            rank_gap: 80.0,
            margin: 50.0,
        }
    }
}

impl LayeredLayout {
    fn ranks(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> Vec<Vec<usize>> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let indices: Vec<NodeIndex> =
            (0..nodes.len()).map(|i| graph.add_node(i)).collect();
        let by_id: HashMap<&str, NodeIndex> = nodes
            .iter()
            .zip(&indices)
            .map(|(node, idx)| (node.id.as_str(), *idx))
            .collect();
        for edge in edges {
            if let (Some(&source), Some(&target)) = (
                by_id.get(edge.source.as_str()),
                by_id.get(edge.target.as_str()),
            ) && source != target
            {
                graph.update_edge(source, target, ());
            }
        }

        let pending_inputs = |idx: NodeIndex, remaining: &BTreeSet<usize>| {
            graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|n| remaining.contains(&graph[*n]))
                .count()
        };

        let mut ranks: Vec<Vec<usize>> = Vec::new();
        let mut remaining: BTreeSet<usize> = (0..nodes.len()).collect();
        while !remaining.is_empty() {
            let mut rank: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| pending_inputs(indices[i], &remaining) == 0)
                .collect();
            if rank.is_empty() {
                let breaker = remaining
                    .iter()
                    .copied()
                    .min_by_key(|&i| pending_inputs(indices[i], &remaining));
                if let Some(i) = breaker {
                    tracing::debug!(
                        node = %nodes[i].id,
                        "breaking wiring cycle"
                    );
                }
                rank.extend(breaker);
            }
            for i in &rank {
                remaining.remove(i);
            }
            ranks.push(rank);
        }

        // Order each rank by the mean row of its upstream neighbours.
        let mut row_of: HashMap<usize, usize> = HashMap::new();
        for rank in &mut ranks {
            let barycenter = |i: usize| {
                let rows: Vec<usize> = graph
                    .neighbors_directed(indices[i], Direction::Incoming)
                    .filter_map(|n| row_of.get(&graph[n]).copied())
                    .collect();
                if rows.is_empty() {
                    f64::MAX
                } else {
                    rows.iter().sum::<usize>() as f64 / rows.len() as f64
                }
            };
            let mut keyed: Vec<(f64, usize)> =
                rank.iter().map(|&i| (barycenter(i), i)).collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            *rank = keyed.into_iter().map(|(_, i)| i).collect();
            for (row, &i) in rank.iter().enumerate() {
                row_of.insert(i, row);
            }
        }
        ranks
    }
}

impl AutoLayout for LayeredLayout {
    fn layout(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        direction: LayoutDirection,
    ) -> Vec<GraphNode> {
        let mut positions = vec![Position::ORIGIN; nodes.len()];
        for (rank_idx, rank) in self.ranks(nodes, edges).iter().enumerate() {
            for (row_idx, &i) in rank.iter().enumerate() {
                let along = rank_idx as f64;
                let across = row_idx as f64;
                positions[i] = match direction {
                    LayoutDirection::LeftToRight => Position::new(
                        self.margin
                            + along * (self.node_width + self.rank_gap),
                        self.margin
                            + across * (self.node_height + self.node_gap),
                    ),
                    LayoutDirection::TopToBottom => Position::new(
                        self.margin
                            + across * (self.node_width + self.node_gap),
                        self.margin
                            + along * (self.node_height + self.rank_gap),
                    ),
                };
            }
        }

        nodes
            .iter()
            .zip(positions)
            .map(|(node, position)| GraphNode {
                position,
                ..node.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            inputs: vec!["in".to_string()],
            outputs: vec!["out".to_string()],
            position: Position::ORIGIN,
        }
    }

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            id: format!("{source}->{target}"),
            source: source.to_string(),
            source_handle: "out".to_string(),
            target: target.to_string(),
            target_handle: "in".to_string(),
        }
    }

    #[test]
    fn test_chain_is_ranked_left_to_right() {
        let nodes = vec![node("c"), node("a"), node("b")];
        let edges = vec![edge("a", "b"), edge("b", "c")];
        let placed = LayeredLayout::default().layout(
            &nodes,
            &edges,
            LayoutDirection::LeftToRight,
        );

        let ids: Vec<_> = placed.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(placed[1].position, Position::new(50.0, 50.0));
        assert_eq!(placed[2].position, Position::new(350.0, 50.0));
        assert_eq!(placed[0].position, Position::new(650.0, 50.0));
    }

    #[test]
    fn test_top_to_bottom_swaps_axes() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![edge("a", "b")];
        let placed = LayeredLayout::default().layout(
            &nodes,
            &edges,
            LayoutDirection::TopToBottom,
        );
        assert_eq!(placed[0].position, Position::new(50.0, 50.0));
        assert_eq!(placed[1].position, Position::new(50.0, 270.0));
    }

    #[test]
    fn test_cycles_and_dangling_edges_still_place_every_node() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![
            edge("a", "b"),
            edge("b", "a"),
            edge("c", "c"),
            edge("ghost", "a"),
        ];
        let layout = LayeredLayout::default();
        let placed =
            layout.layout(&nodes, &edges, LayoutDirection::LeftToRight);

        assert_eq!(placed.len(), 3);
        assert!(placed.iter().all(|n| !n.position.is_origin()));
        for (before, after) in nodes.iter().zip(&placed) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.inputs, after.inputs);
            assert_eq!(before.outputs, after.outputs);
        }
        assert_eq!(
            placed,
            layout.layout(&nodes, &edges, LayoutDirection::LeftToRight)
        );
    }

    #[test]
    fn test_rank_rows_follow_upstream_rows() {
        let nodes = vec![node("a"), node("b"), node("y"), node("x")];
        let edges = vec![edge("a", "x"), edge("b", "y")];
        let placed = LayeredLayout::default().layout(
            &nodes,
            &edges,
            LayoutDirection::LeftToRight,
        );
        // x hangs off a (row 0), y off b (row 1)
        assert_eq!(placed[3].position.y, placed[0].position.y);
        assert_eq!(placed[2].position.y, placed[1].position.y);
    }
}
