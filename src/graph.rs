//! Graph input model
//!
//! The layout consumes a node list and an edge list. Edge endpoints may be
//! given as node indices or node ids; both are resolved to indices into the
//! node arena before the simulation sees them.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::Viewport;
use crate::error::{LayoutError, LayoutResult};
use crate::vec2::Vec2;

/// Default node mass when none is supplied
pub const DEFAULT_NODE_MASS: f32 = 1.0;

/// Default node radius when none is supplied
pub const DEFAULT_NODE_SIZE: f32 = 1.0;

/// Default edge weight when none is supplied
pub const DEFAULT_EDGE_WEIGHT: f32 = 1.0;

/// A node as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    pub id: String,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub mass: Option<f32>,
    #[serde(default)]
    pub size: Option<f32>,
}

impl NodeInput {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = Some(size);
        self
    }
}

/// Reference to a node, either by position in the node list or by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKey {
    Index(usize),
    Id(String),
}

impl From<usize> for NodeKey {
    fn from(index: usize) -> Self {
        NodeKey::Index(index)
    }
}

impl From<&str> for NodeKey {
    fn from(id: &str) -> Self {
        NodeKey::Id(id.to_string())
    }
}

/// An edge as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInput {
    pub source: NodeKey,
    pub target: NodeKey,
    #[serde(default)]
    pub weight: Option<f32>,
}

impl EdgeInput {
    pub fn new(source: impl Into<NodeKey>, target: impl Into<NodeKey>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// The graph handed to `Layout::init_data`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub nodes: Vec<NodeInput>,
    #[serde(default)]
    pub edges: Vec<EdgeInput>,
}

impl GraphInput {
    pub fn new(nodes: Vec<NodeInput>, edges: Vec<EdgeInput>) -> Self {
        Self { nodes, edges }
    }
}

/// Flat arrays ready for either simulation backend
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedGraph {
    pub positions: Vec<Vec2>,
    pub masses: Vec<f32>,
    pub sizes: Vec<f32>,
    pub edges: Vec<(usize, usize)>,
    pub weights: Vec<f32>,
}

impl PreparedGraph {
    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl GraphInput {
    /// Resolve edge endpoints and fill in missing coordinates.
    ///
    /// Nodes without `x`/`y` are placed uniformly at random inside
    /// `viewport`. Fails on the first edge whose endpoint cannot be resolved.
    pub fn prepare(&self, viewport: &Viewport, seed: Option<u64>) -> LayoutResult<PreparedGraph> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let positions = self
            .nodes
            .iter()
            .map(|n| {
                let x = n
                    .x
                    .unwrap_or_else(|| viewport.x + rng.r#gen::<f32>() * viewport.width);
                let y = n
                    .y
                    .unwrap_or_else(|| viewport.y + rng.r#gen::<f32>() * viewport.height);
                Vec2::new(x, y)
            })
            .collect();
        let masses = self
            .nodes
            .iter()
            .map(|n| n.mass.unwrap_or(DEFAULT_NODE_MASS))
            .collect();
        let sizes = self
            .nodes
            .iter()
            .map(|n| n.size.unwrap_or(DEFAULT_NODE_SIZE))
            .collect();

        let id_to_index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let node_count = self.nodes.len();
        let resolve = |edge: usize, key: &NodeKey| -> LayoutResult<usize> {
            match key {
                NodeKey::Index(i) if *i < node_count => Ok(*i),
                NodeKey::Index(i) => Err(LayoutError::EdgeOutOfRange {
                    edge,
                    node: *i,
                    node_count,
                }),
                NodeKey::Id(id) => {
                    id_to_index
                        .get(id.as_str())
                        .copied()
                        .ok_or_else(|| LayoutError::UnknownNode {
                            edge,
                            id: id.clone(),
                        })
                }
            }
        };

        let mut edges = Vec::with_capacity(self.edges.len());
        let mut weights = Vec::with_capacity(self.edges.len());
        for (i, e) in self.edges.iter().enumerate() {
            edges.push((resolve(i, &e.source)?, resolve(i, &e.target)?));
            weights.push(e.weight.unwrap_or(DEFAULT_EDGE_WEIGHT));
        }

        Ok(PreparedGraph {
            positions,
            masses,
            sizes,
            edges,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_ids_and_indices() {
        let graph = GraphInput::new(
            vec![
                NodeInput::new("a").at(0.0, 0.0),
                NodeInput::new("b").at(1.0, 0.0),
            ],
            vec![EdgeInput::new("a", "b"), EdgeInput::new(1, 0).with_weight(3.0)],
        );
        let prepared = graph.prepare(&Viewport::default(), Some(1)).unwrap();

        assert_eq!(prepared.edges, vec![(0, 1), (1, 0)]);
        assert_eq!(prepared.weights, vec![DEFAULT_EDGE_WEIGHT, 3.0]);
    }

    #[test]
    fn out_of_range_index_fails_fast() {
        let graph = GraphInput::new(
            vec![NodeInput::new("a").at(0.0, 0.0)],
            vec![EdgeInput::new(0, 5)],
        );
        let err = graph.prepare(&Viewport::default(), Some(1)).unwrap_err();
        assert_eq!(
            err,
            LayoutError::EdgeOutOfRange {
                edge: 0,
                node: 5,
                node_count: 1
            }
        );
    }

    #[test]
    fn unknown_id_fails_fast() {
        let graph = GraphInput::new(
            vec![NodeInput::new("a").at(0.0, 0.0)],
            vec![EdgeInput::new("a", "nonexistent")],
        );
        let err = graph.prepare(&Viewport::default(), Some(1)).unwrap_err();
        assert!(matches!(err, LayoutError::UnknownNode { edge: 0, .. }));
    }

    #[test]
    fn missing_coordinates_land_in_viewport() {
        let graph = GraphInput::new(
            (0..50).map(|i| NodeInput::new(i.to_string())).collect(),
            vec![],
        );
        let viewport = Viewport::new(-100.0, 50.0, 200.0, 10.0);
        let prepared = graph.prepare(&viewport, Some(7)).unwrap();

        for p in &prepared.positions {
            assert!(p.x >= -100.0 && p.x <= 100.0, "x out of viewport: {}", p.x);
            assert!(p.y >= 50.0 && p.y <= 60.0, "y out of viewport: {}", p.y);
        }
    }

    #[test]
    fn same_seed_same_placement() {
        let graph = GraphInput::new(
            (0..10).map(|i| NodeInput::new(i.to_string())).collect(),
            vec![],
        );
        let a = graph.prepare(&Viewport::default(), Some(42)).unwrap();
        let b = graph.prepare(&Viewport::default(), Some(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_json_with_mixed_endpoints() {
        let json = r#"{
            "nodes": [{"id": "a", "x": 1.0, "y": 2.0, "size": 3.0}, {"id": "b"}],
            "edges": [{"source": "a", "target": 1, "weight": 0.5}]
        }"#;
        let graph: GraphInput = serde_json::from_str(json).unwrap();
        assert_eq!(graph.nodes[0].size, Some(3.0));
        assert_eq!(graph.edges[0].source, NodeKey::Id("a".to_string()));
        assert_eq!(graph.edges[0].target, NodeKey::Index(1));
    }
}
