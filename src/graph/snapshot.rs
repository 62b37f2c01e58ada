//! Arena-backed, immutable-once-published view of the lineage graph.
//!
//! Nodes and edges live in slot vectors addressed by integer indices. Deleted
//! slots become tombstones until the next full load rebuilds the arena. Each
//! node keeps outgoing and incoming edge lists sorted by the traversal
//! tie-break (confidence descending, neighbor id ascending, edge id ascending),
//! so every algorithm sees neighbors in the same order without re-sorting.

use std::{
    cmp::Ordering,
    sync::Arc,
    time::{Duration, SystemTime},
};

use ahash::AHashMap;

use crate::{
    errors::LineageError,
    graph::types::{AssetNode, LineageEdge, validate_edge, validate_node},
};

pub type NodeIdx = usize;
pub type EdgeIdx = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeTriple {
    source: NodeIdx,
    target: NodeIdx,
    lineage_type: String,
}

#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    version: u64,
    created_at: SystemTime,
    nodes: Vec<Option<Arc<AssetNode>>>,
    edges: Vec<Option<Arc<LineageEdge>>>,
    endpoints: Vec<(NodeIdx, NodeIdx)>,
    node_lookup: AHashMap<String, NodeIdx>,
    edge_lookup: AHashMap<String, EdgeIdx>,
    triples: AHashMap<EdgeTriple, EdgeIdx>,
    outgoing: Vec<Vec<EdgeIdx>>,
    incoming: Vec<Vec<EdgeIdx>>,
    live_nodes: usize,
    live_edges: usize,
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            created_at: SystemTime::now(),
            nodes: Vec::new(),
            edges: Vec::new(),
            endpoints: Vec::new(),
            node_lookup: AHashMap::new(),
            edge_lookup: AHashMap::new(),
            triples: AHashMap::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
            live_nodes: 0,
            live_edges: 0,
        }
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        let mut snapshot = Self::empty();
        snapshot.nodes.reserve(nodes);
        snapshot.outgoing.reserve(nodes);
        snapshot.incoming.reserve(nodes);
        snapshot.node_lookup.reserve(nodes);
        snapshot.edges.reserve(edges);
        snapshot.endpoints.reserve(edges);
        snapshot.edge_lookup.reserve(edges);
        snapshot.triples.reserve(edges);
        snapshot
    }

    /// Builds a snapshot from complete node and edge lists, rejecting any
    /// duplicate conflict or dangling edge.
    pub fn from_records<N, E>(nodes: N, edges: E) -> Result<Self, LineageError>
    where
        N: IntoIterator<Item = AssetNode>,
        E: IntoIterator<Item = LineageEdge>,
    {
        let mut snapshot = Self::empty();
        for node in nodes {
            snapshot.insert_node(node)?;
        }
        for edge in edges {
            snapshot.insert_edge(edge)?;
        }
        Ok(snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.live_nodes
    }

    pub fn edge_count(&self) -> usize {
        self.live_edges
    }

    pub fn is_empty(&self) -> bool {
        self.live_nodes == 0
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_lookup.contains_key(node_id)
    }

    pub fn contains_edge(&self, edge_id: &str) -> bool {
        self.edge_lookup.contains_key(edge_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&AssetNode> {
        self.node_lookup
            .get(node_id)
            .and_then(|&idx| self.node_at(idx))
    }

    pub fn edge(&self, edge_id: &str) -> Option<&LineageEdge> {
        self.edge_lookup
            .get(edge_id)
            .and_then(|&idx| self.edge_at(idx))
    }

    /// All live nodes ordered by `node_id`.
    pub fn nodes(&self) -> Vec<&AssetNode> {
        let mut nodes: Vec<&AssetNode> = self.nodes.iter().flatten().map(Arc::as_ref).collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    /// All live edges ordered by `edge_id`.
    pub fn edges(&self) -> Vec<&LineageEdge> {
        let mut edges: Vec<&LineageEdge> = self.edges.iter().flatten().map(Arc::as_ref).collect();
        edges.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
        edges
    }

    /// Outgoing edges of a node in tie-break order.
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&LineageEdge> {
        self.node_lookup
            .get(node_id)
            .map(|&idx| self.collect_edges(&self.outgoing[idx]))
            .unwrap_or_default()
    }

    /// Incoming edges of a node in tie-break order.
    pub fn incoming_edges(&self, node_id: &str) -> Vec<&LineageEdge> {
        self.node_lookup
            .get(node_id)
            .map(|&idx| self.collect_edges(&self.incoming[idx]))
            .unwrap_or_default()
    }

    fn collect_edges(&self, list: &[EdgeIdx]) -> Vec<&LineageEdge> {
        list.iter().filter_map(|&idx| self.edge_at(idx)).collect()
    }
}

// Index-level access for the traversal engine.
impl GraphSnapshot {
    pub(crate) fn node_idx(&self, node_id: &str) -> Option<NodeIdx> {
        self.node_lookup.get(node_id).copied()
    }

    pub(crate) fn node_at(&self, idx: NodeIdx) -> Option<&AssetNode> {
        self.nodes.get(idx).and_then(|slot| slot.as_deref())
    }

    pub(crate) fn edge_at(&self, idx: EdgeIdx) -> Option<&LineageEdge> {
        self.edges.get(idx).and_then(|slot| slot.as_deref())
    }

    pub(crate) fn endpoints(&self, idx: EdgeIdx) -> (NodeIdx, NodeIdx) {
        self.endpoints[idx]
    }

    pub(crate) fn outgoing_at(&self, idx: NodeIdx) -> &[EdgeIdx] {
        self.outgoing.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn incoming_at(&self, idx: NodeIdx) -> &[EdgeIdx] {
        self.incoming.get(idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Neighbors of a live node in either direction, without duplicates.
    pub(crate) fn adjacent_node_ids(&self, idx: NodeIdx) -> Vec<String> {
        let mut ids: Vec<String> = self
            .outgoing_at(idx)
            .iter()
            .chain(self.incoming_at(idx))
            .filter_map(|&edge| self.edge_at(edge))
            .flat_map(|edge| [edge.source_node_id.clone(), edge.target_node_id.clone()])
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
        self.created_at = SystemTime::now();
    }
}

// Mutation, only reachable through the store's writer path and the loader.
impl GraphSnapshot {
    /// Inserts a node. An identical existing node is a no-op (`Ok(false)`).
    pub(crate) fn insert_node(&mut self, node: AssetNode) -> Result<bool, LineageError> {
        validate_node(&node)?;
        if let Some(existing) = self.node(&node.node_id) {
            if *existing == node {
                return Ok(false);
            }
            return Err(LineageError::conflict(format!(
                "node {} already exists with different content",
                node.node_id
            )));
        }
        let idx = self.nodes.len();
        self.node_lookup.insert(node.node_id.clone(), idx);
        self.nodes.push(Some(Arc::new(node)));
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.live_nodes += 1;
        Ok(true)
    }

    pub(crate) fn update_node(&mut self, node: AssetNode) -> Result<bool, LineageError> {
        validate_node(&node)?;
        let idx = self
            .node_idx(&node.node_id)
            .ok_or_else(|| LineageError::node_not_found(node.node_id.clone()))?;
        if self.node_at(idx) == Some(&node) {
            return Ok(false);
        }
        self.nodes[idx] = Some(Arc::new(node));
        Ok(true)
    }

    /// Removes a node slot. Incident edges stay attached to the tombstone until
    /// the caller deletes or reassigns them; see [`GraphSnapshot::attached_edges`].
    pub(crate) fn remove_node(&mut self, node_id: &str) -> Result<NodeIdx, LineageError> {
        let idx = self
            .node_lookup
            .remove(node_id)
            .ok_or_else(|| LineageError::node_not_found(node_id))?;
        self.nodes[idx] = None;
        self.live_nodes -= 1;
        Ok(idx)
    }

    /// Edge ids still attached to a node slot, in either direction.
    pub(crate) fn attached_edges(&self, idx: NodeIdx) -> Vec<String> {
        self.outgoing_at(idx)
            .iter()
            .chain(self.incoming_at(idx))
            .filter_map(|&edge| self.edge_at(edge))
            .map(|edge| edge.edge_id.clone())
            .collect()
    }

    pub(crate) fn insert_edge(&mut self, edge: LineageEdge) -> Result<bool, LineageError> {
        validate_edge(&edge)?;
        if let Some(existing) = self.edge(&edge.edge_id) {
            if *existing != edge {
                return Err(LineageError::conflict(format!(
                    "edge {} already exists with different content",
                    edge.edge_id
                )));
            }
            return self.update_edge(edge);
        }
        let (source, target) = self.resolve_endpoints(&edge)?;
        let triple = EdgeTriple {
            source,
            target,
            lineage_type: edge.lineage_type.clone(),
        };
        if let Some(&other) = self.triples.get(&triple) {
            let other_id = self
                .edge_at(other)
                .map(|existing| existing.edge_id.clone())
                .unwrap_or_default();
            return Err(LineageError::conflict(format!(
                "edge {} duplicates {} ({} -> {}, {})",
                edge.edge_id, other_id, edge.source_node_id, edge.target_node_id, edge.lineage_type
            )));
        }
        let idx = self.edges.len();
        self.edge_lookup.insert(edge.edge_id.clone(), idx);
        self.triples.insert(triple, idx);
        self.edges.push(Some(Arc::new(edge)));
        self.endpoints.push((source, target));
        self.attach(idx);
        self.live_edges += 1;
        Ok(true)
    }

    pub(crate) fn update_edge(&mut self, edge: LineageEdge) -> Result<bool, LineageError> {
        validate_edge(&edge)?;
        let idx = self
            .edge_lookup
            .get(&edge.edge_id)
            .copied()
            .ok_or_else(|| LineageError::edge_not_found(edge.edge_id.clone()))?;
        let (source, target) = self.resolve_endpoints(&edge)?;
        // Same content can still point at a slot deleted and re-created earlier
        // in the delta; only a matching slot pair is a no-op.
        if self.edge_at(idx) == Some(&edge) && self.endpoints[idx] == (source, target) {
            return Ok(false);
        }
        let triple = EdgeTriple {
            source,
            target,
            lineage_type: edge.lineage_type.clone(),
        };
        if let Some(&other) = self.triples.get(&triple) {
            if other != idx {
                return Err(LineageError::conflict(format!(
                    "edge {} would duplicate an existing {} relationship {} -> {}",
                    edge.edge_id, edge.lineage_type, edge.source_node_id, edge.target_node_id
                )));
            }
        }
        self.detach(idx);
        let previous = self.triple_of(idx);
        self.triples.remove(&previous);
        self.triples.insert(triple, idx);
        self.edges[idx] = Some(Arc::new(edge));
        self.endpoints[idx] = (source, target);
        self.attach(idx);
        Ok(true)
    }

    pub(crate) fn remove_edge(&mut self, edge_id: &str) -> Result<(NodeIdx, NodeIdx), LineageError> {
        let idx = self
            .edge_lookup
            .get(edge_id)
            .copied()
            .ok_or_else(|| LineageError::edge_not_found(edge_id))?;
        self.detach(idx);
        let triple = self.triple_of(idx);
        self.triples.remove(&triple);
        self.edge_lookup.remove(edge_id);
        self.edges[idx] = None;
        self.live_edges -= 1;
        Ok(self.endpoints[idx])
    }

    fn resolve_endpoints(&self, edge: &LineageEdge) -> Result<(NodeIdx, NodeIdx), LineageError> {
        let source = self
            .node_idx(&edge.source_node_id)
            .ok_or_else(|| LineageError::node_not_found(edge.source_node_id.clone()))?;
        let target = self
            .node_idx(&edge.target_node_id)
            .ok_or_else(|| LineageError::node_not_found(edge.target_node_id.clone()))?;
        Ok((source, target))
    }

    fn triple_of(&self, idx: EdgeIdx) -> EdgeTriple {
        let (source, target) = self.endpoints[idx];
        EdgeTriple {
            source,
            target,
            lineage_type: self
                .edge_at(idx)
                .map(|edge| edge.lineage_type.clone())
                .unwrap_or_default(),
        }
    }

    fn attach(&mut self, idx: EdgeIdx) {
        let (source, target) = self.endpoints[idx];
        let edges = &self.edges;
        let Some(edge) = edges[idx].as_deref() else {
            return;
        };
        let out = &mut self.outgoing[source];
        let pos = out.partition_point(|&other| {
            edges[other]
                .as_deref()
                .is_some_and(|o| adjacency_order(o, edge, true) == Ordering::Less)
        });
        out.insert(pos, idx);
        let inc = &mut self.incoming[target];
        let pos = inc.partition_point(|&other| {
            edges[other]
                .as_deref()
                .is_some_and(|o| adjacency_order(o, edge, false) == Ordering::Less)
        });
        inc.insert(pos, idx);
    }

    fn detach(&mut self, idx: EdgeIdx) {
        let (source, target) = self.endpoints[idx];
        self.outgoing[source].retain(|&edge| edge != idx);
        self.incoming[target].retain(|&edge| edge != idx);
    }
}

/// Shared tie-break: higher confidence first, then smaller neighbor id, then
/// smaller edge id.
pub(crate) fn hop_order(
    confidence_a: f64,
    neighbor_a: &str,
    edge_a: &str,
    confidence_b: f64,
    neighbor_b: &str,
    edge_b: &str,
) -> Ordering {
    confidence_b
        .total_cmp(&confidence_a)
        .then_with(|| neighbor_a.cmp(neighbor_b))
        .then_with(|| edge_a.cmp(edge_b))
}

fn adjacency_order(a: &LineageEdge, b: &LineageEdge, outgoing: bool) -> Ordering {
    let (neighbor_a, neighbor_b) = if outgoing {
        (&a.target_node_id, &b.target_node_id)
    } else {
        (&a.source_node_id, &b.source_node_id)
    };
    hop_order(
        a.confidence,
        neighbor_a,
        &a.edge_id,
        b.confidence,
        neighbor_b,
        &b.edge_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(id: &str) -> AssetNode {
        AssetNode::new(id, "table", id)
    }

    #[test]
    fn test_adjacency_kept_in_tie_break_order() {
        let mut snapshot = GraphSnapshot::empty();
        for id in ["a", "b", "c", "d"] {
            snapshot.insert_node(table(id)).unwrap();
        }
        snapshot
            .insert_edge(LineageEdge::new("e3", "a", "d", "etl").with_confidence(0.5))
            .unwrap();
        snapshot
            .insert_edge(LineageEdge::new("e2", "a", "c", "etl").with_confidence(0.9))
            .unwrap();
        snapshot
            .insert_edge(LineageEdge::new("e1", "a", "b", "etl").with_confidence(0.9))
            .unwrap();
        let order: Vec<&str> = snapshot
            .outgoing_edges("a")
            .iter()
            .map(|edge| edge.target_node_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_update_edge_moves_between_adjacency_lists() {
        let mut snapshot = GraphSnapshot::empty();
        for id in ["a", "b", "c"] {
            snapshot.insert_node(table(id)).unwrap();
        }
        snapshot
            .insert_edge(LineageEdge::new("e1", "a", "b", "etl"))
            .unwrap();
        snapshot
            .update_edge(LineageEdge::new("e1", "a", "c", "etl"))
            .unwrap();
        assert!(snapshot.incoming_edges("b").is_empty());
        assert_eq!(snapshot.incoming_edges("c").len(), 1);
        assert_eq!(snapshot.edge_count(), 1);
    }

    #[test]
    fn test_remove_node_leaves_attached_edges_visible() {
        let mut snapshot = GraphSnapshot::empty();
        for id in ["a", "b"] {
            snapshot.insert_node(table(id)).unwrap();
        }
        snapshot
            .insert_edge(LineageEdge::new("e1", "a", "b", "etl"))
            .unwrap();
        let idx = snapshot.remove_node("b").unwrap();
        assert_eq!(snapshot.attached_edges(idx), vec!["e1".to_string()]);
        snapshot.remove_edge("e1").unwrap();
        assert!(snapshot.attached_edges(idx).is_empty());
    }
}
