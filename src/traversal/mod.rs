//! Traversal engine.
//!
//! Every strategy runs against one immutable [`GraphSnapshot`] and expands
//! neighbors in the shared tie-break order the snapshot keeps its adjacency
//! lists in. Caps and deadlines never fail a traversal; they end it early and
//! mark the result `truncated`.

mod all_paths;
mod bfs;
mod centrality;
mod critical_path;
mod dfs;
mod shortest_path;

use std::{
    collections::{BTreeMap, BTreeSet},
    time::Instant,
};

use ahash::{AHashMap, AHashSet};

use crate::{
    config::TraversalConfig,
    graph::{
        snapshot::{EdgeIdx, GraphSnapshot, NodeIdx, hop_order},
        types::AssetNode,
    },
    query::{
        LineageGraph, LineagePath, LineageQuery, NodeRanking, PathWeighting, TraversalAlgorithm,
        TraversalDirection, TraversalMetadata, TruncationReason,
    },
};

pub use centrality::{CentralityScores, compute_centrality};

/// A traversal result plus every node id the result depends on.
#[derive(Clone, Debug)]
pub struct TrackedTraversal {
    pub graph: LineageGraph,
    /// Node ids whose change could alter `graph`, sorted.
    pub footprint: Vec<String>,
}

/// Runs `query` with the default caps.
pub fn traverse(snapshot: &GraphSnapshot, query: &LineageQuery) -> LineageGraph {
    traverse_with_config(snapshot, query, &TraversalConfig::default())
}

pub fn traverse_with_config(
    snapshot: &GraphSnapshot,
    query: &LineageQuery,
    config: &TraversalConfig,
) -> LineageGraph {
    traverse_tracked(snapshot, query, config).graph
}

pub fn traverse_tracked(
    snapshot: &GraphSnapshot,
    query: &LineageQuery,
    config: &TraversalConfig,
) -> TrackedTraversal {
    let Some(root) = snapshot.node_idx(&query.asset_id) else {
        return TrackedTraversal {
            graph: LineageGraph::empty(query, snapshot.version()),
            footprint: vec![query.asset_id.clone()],
        };
    };

    let ctx = Ctx::new(snapshot, query, config);
    let walk = match query.algorithm {
        TraversalAlgorithm::BreadthFirst => bfs::run(&ctx, root),
        TraversalAlgorithm::DepthFirst => dfs::run(&ctx, root),
        TraversalAlgorithm::ShortestPath => shortest_path::run(&ctx, root),
        TraversalAlgorithm::AllPaths => all_paths::run(&ctx, root),
        TraversalAlgorithm::CriticalPath => critical_path::run(&ctx, root),
    };
    walk.finish(&ctx, query)
}

/// Read-only state shared by every strategy for one traversal.
pub(crate) struct Ctx<'a> {
    pub snapshot: &'a GraphSnapshot,
    pub config: &'a TraversalConfig,
    pub direction: TraversalDirection,
    pub weighting: PathWeighting,
    pub max_depth: u32,
    min_confidence: f64,
    type_filter: Option<&'a BTreeSet<String>>,
    deadline: Option<Instant>,
}

/// One admissible step from a node.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Hop {
    pub edge: EdgeIdx,
    pub neighbor: NodeIdx,
    pub confidence: f64,
}

impl<'a> Ctx<'a> {
    fn new(snapshot: &'a GraphSnapshot, query: &'a LineageQuery, config: &'a TraversalConfig) -> Self {
        let timeout = query.timeout_duration().or_else(|| config.default_timeout());
        Self {
            snapshot,
            config,
            direction: query.direction,
            weighting: query.weighting,
            max_depth: query.max_depth.min(config.max_depth_limit),
            min_confidence: query.confidence_filter,
            type_filter: query.asset_type_filter.as_ref(),
            deadline: timeout.map(|budget| Instant::now() + budget),
        }
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn node_id(&self, idx: NodeIdx) -> &'a str {
        self.snapshot
            .node_at(idx)
            .map(|node| node.node_id.as_str())
            .unwrap_or_default()
    }

    pub fn edge_id(&self, idx: EdgeIdx) -> &'a str {
        self.snapshot
            .edge_at(idx)
            .map(|edge| edge.edge_id.as_str())
            .unwrap_or_default()
    }

    fn type_allowed(&self, node: &AssetNode) -> bool {
        self.type_filter
            .is_none_or(|types| types.contains(&node.asset_type))
    }

    /// Fills `out` with the hops from `node` in tie-break order, after the
    /// confidence and asset-type filters.
    pub fn hops_into(&self, node: NodeIdx, out: &mut Vec<Hop>) {
        out.clear();
        match self.direction {
            TraversalDirection::Downstream => {
                self.push_hops(self.snapshot.outgoing_at(node), true, out)
            }
            TraversalDirection::Upstream => {
                self.push_hops(self.snapshot.incoming_at(node), false, out)
            }
            TraversalDirection::Bidirectional => {
                self.push_hops(self.snapshot.outgoing_at(node), true, out);
                self.push_hops(self.snapshot.incoming_at(node), false, out);
                out.sort_by(|a, b| {
                    hop_order(
                        a.confidence,
                        self.node_id(a.neighbor),
                        self.edge_id(a.edge),
                        b.confidence,
                        self.node_id(b.neighbor),
                        self.edge_id(b.edge),
                    )
                });
            }
        }
    }

    pub fn hops(&self, node: NodeIdx) -> Vec<Hop> {
        let mut out = Vec::new();
        self.hops_into(node, &mut out);
        out
    }

    fn push_hops(&self, edges: &[EdgeIdx], forward: bool, out: &mut Vec<Hop>) {
        for &edge_idx in edges {
            let Some(edge) = self.snapshot.edge_at(edge_idx) else {
                continue;
            };
            if edge.confidence < self.min_confidence {
                continue;
            }
            let (source, target) = self.snapshot.endpoints(edge_idx);
            let neighbor = if forward { target } else { source };
            let Some(node) = self.snapshot.node_at(neighbor) else {
                continue;
            };
            if !self.type_allowed(node) {
                continue;
            }
            out.push(Hop {
                edge: edge_idx,
                neighbor,
                confidence: edge.confidence,
            });
        }
    }

    pub fn path_from(&self, nodes: &[NodeIdx], edges: &[EdgeIdx]) -> LineagePath {
        let confidence = edges
            .iter()
            .filter_map(|&edge| self.snapshot.edge_at(edge))
            .map(|edge| edge.confidence)
            .product();
        LineagePath {
            nodes: nodes.iter().map(|&idx| self.node_id(idx).to_string()).collect(),
            edges: edges.iter().map(|&idx| self.edge_id(idx).to_string()).collect(),
            confidence,
        }
    }
}

/// Accumulates what a strategy discovered, in discovery order.
#[derive(Default)]
pub(crate) struct Walk {
    nodes: Vec<NodeIdx>,
    depth: AHashMap<NodeIdx, u32>,
    edges: Vec<EdgeIdx>,
    edge_seen: AHashSet<EdgeIdx>,
    pub paths: Vec<LineagePath>,
    pub rankings: Vec<NodeRanking>,
    /// Nodes examined beyond the returned ones (critical-path region).
    pub region: Vec<NodeIdx>,
    pub truncated: Option<TruncationReason>,
}

impl Walk {
    /// Records `idx` at `depth`; keeps the smaller depth for known nodes.
    /// Returns true when the node is new.
    pub fn add_node(&mut self, idx: NodeIdx, depth: u32) -> bool {
        match self.depth.get_mut(&idx) {
            Some(known) => {
                *known = (*known).min(depth);
                false
            }
            None => {
                self.depth.insert(idx, depth);
                self.nodes.push(idx);
                true
            }
        }
    }

    pub fn contains(&self, idx: NodeIdx) -> bool {
        self.depth.contains_key(&idx)
    }

    pub fn add_edge(&mut self, idx: EdgeIdx) {
        if self.edge_seen.insert(idx) {
            self.edges.push(idx);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn truncate(&mut self, reason: TruncationReason) {
        self.truncated.get_or_insert(reason);
    }

    fn finish(self, ctx: &Ctx<'_>, query: &LineageQuery) -> TrackedTraversal {
        let snapshot = ctx.snapshot;
        let nodes: Vec<AssetNode> = self
            .nodes
            .iter()
            .filter_map(|&idx| snapshot.node_at(idx).cloned())
            .collect();
        let edges: Vec<_> = self
            .edges
            .iter()
            .filter_map(|&idx| snapshot.edge_at(idx).cloned())
            .collect();
        let distances: BTreeMap<String, u32> = self
            .nodes
            .iter()
            .map(|&idx| (ctx.node_id(idx).to_string(), self.depth[&idx]))
            .collect();

        let mut footprint: BTreeSet<String> = distances.keys().cloned().collect();
        footprint.extend(self.region.iter().map(|&idx| ctx.node_id(idx).to_string()));
        footprint.insert(query.asset_id.clone());

        let graph = LineageGraph {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            nodes,
            edges,
            distances,
            paths: self.paths,
            rankings: self.rankings,
            metadata: TraversalMetadata {
                root: query.asset_id.clone(),
                root_found: true,
                direction: query.direction,
                algorithm: query.algorithm,
                max_depth: ctx.max_depth,
                confidence_filter: query.confidence_filter,
                snapshot_version: snapshot.version(),
                visited_nodes: self.nodes.len().max(self.region.len()),
                truncated: self.truncated.is_some(),
                truncation_reason: self.truncated,
            },
        };
        TrackedTraversal {
            graph,
            footprint: footprint.into_iter().collect(),
        }
    }
}
