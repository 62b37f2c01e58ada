//! Seeded lineage graph generators for tests and benchmarks.

use ahash::AHashSet;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    errors::LineageError,
    graph::{
        snapshot::GraphSnapshot,
        types::{AssetNode, LineageEdge},
    },
};

const ASSET_TYPES: [&str; 5] = ["source", "table", "view", "model", "report"];

#[derive(Clone, Debug)]
pub struct SyntheticLineage {
    pub nodes: Vec<AssetNode>,
    pub edges: Vec<LineageEdge>,
}

impl SyntheticLineage {
    /// Id of the first generated node, the natural traversal root.
    pub fn root_id(&self) -> Option<&str> {
        self.nodes.first().map(|node| node.node_id.as_str())
    }

    pub fn to_snapshot(&self) -> Result<GraphSnapshot, LineageError> {
        GraphSnapshot::from_records(self.nodes.iter().cloned(), self.edges.iter().cloned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineageShape {
    /// `n0 -> n1 -> ... -> n(k-1)`.
    Chain,
    /// One source feeding every other node.
    FanOut,
    /// Layers of `width` nodes, each fed by one to three nodes of the layer above.
    LayeredDag { width: usize },
    /// Every node fed by up to `parents` random earlier nodes.
    RandomDag { parents: usize },
}

pub fn node_id(idx: usize) -> String {
    format!("asset_{idx:06}")
}

pub fn generate_lineage(shape: LineageShape, node_count: usize, seed: u64) -> SyntheticLineage {
    let mut rng = StdRng::seed_from_u64(seed);
    let nodes = build_nodes(node_count, shape, &mut rng);
    let pairs = match shape {
        LineageShape::Chain => (1..node_count).map(|idx| (idx - 1, idx)).collect(),
        LineageShape::FanOut => (1..node_count).map(|idx| (0, idx)).collect(),
        LineageShape::LayeredDag { width } => layered_pairs(node_count, width.max(1), &mut rng),
        LineageShape::RandomDag { parents } => random_pairs(node_count, parents.max(1), &mut rng),
    };
    let edges = pairs
        .into_iter()
        .enumerate()
        .map(|(idx, (from, to))| {
            let confidence = (rng.gen_range(50..=100) as f64) / 100.0;
            LineageEdge::new(format!("edge_{idx:07}"), node_id(from), node_id(to), "etl")
                .with_confidence(confidence)
        })
        .collect();
    SyntheticLineage { nodes, edges }
}

fn build_nodes(count: usize, shape: LineageShape, rng: &mut StdRng) -> Vec<AssetNode> {
    (0..count)
        .map(|idx| {
            let tier = match shape {
                LineageShape::LayeredDag { width } => idx / width.max(1),
                _ => idx,
            };
            let asset_type = if idx == 0 {
                ASSET_TYPES[0]
            } else {
                ASSET_TYPES[1 + tier % (ASSET_TYPES.len() - 1)]
            };
            let importance = (rng.gen_range(0..=100) as f64) / 100.0;
            AssetNode::new(node_id(idx), asset_type, format!("asset {idx}")).with_importance(importance)
        })
        .collect()
}

fn layered_pairs(count: usize, width: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(count * 2);
    for idx in width..count {
        let layer_start = (idx / width - 1) * width;
        let mut parents = AHashSet::new();
        for _ in 0..rng.gen_range(1..=3) {
            parents.insert(layer_start + rng.gen_range(0..width));
        }
        let mut parents: Vec<usize> = parents.into_iter().collect();
        parents.sort_unstable();
        pairs.extend(parents.into_iter().map(|parent| (parent, idx)));
    }
    pairs
}

fn random_pairs(count: usize, max_parents: usize, rng: &mut StdRng) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(count * max_parents);
    for idx in 1..count {
        let wanted = max_parents.min(idx);
        let mut parents = AHashSet::with_capacity(wanted);
        while parents.len() < wanted {
            parents.insert(rng.gen_range(0..idx));
        }
        let mut parents: Vec<usize> = parents.into_iter().collect();
        parents.sort_unstable();
        pairs.extend(parents.into_iter().map(|parent| (parent, idx)));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_graph() {
        let a = generate_lineage(LineageShape::RandomDag { parents: 3 }, 200, 7);
        let b = generate_lineage(LineageShape::RandomDag { parents: 3 }, 200, 7);
        assert_eq!(a.edges, b.edges);
        assert_eq!(a.nodes, b.nodes);
    }

    #[test]
    fn test_shapes_build_valid_snapshots() {
        for shape in [
            LineageShape::Chain,
            LineageShape::FanOut,
            LineageShape::LayeredDag { width: 10 },
            LineageShape::RandomDag { parents: 2 },
        ] {
            let data = generate_lineage(shape, 100, 1);
            let snapshot = data.to_snapshot().expect("valid snapshot");
            assert_eq!(snapshot.node_count(), 100);
            assert_eq!(snapshot.edge_count(), data.edges.len());
        }
    }

    #[test]
    fn test_chain_edge_count() {
        let data = generate_lineage(LineageShape::Chain, 5, 0);
        assert_eq!(data.edges.len(), 4);
        assert_eq!(data.root_id(), Some("asset_000000"));
    }
}
