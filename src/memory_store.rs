//! In-process durable-store stand-in, used for embedding and tests.

use std::collections::BTreeMap;

use parking_lot::{Mutex, RwLock};

use crate::{
    errors::LineageError,
    graph::{
        delta::GraphChange,
        types::{AssetNode, EdgeRecord, LineageEdge, NodeRecord},
    },
    impact::ImpactRecord,
    loader::{LineageSink, LineageSource, RecordStream},
};

/// Where an injected read failure fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadFault {
    /// After the first node record.
    Nodes,
    /// After the first edge record.
    Edges,
}

#[derive(Default)]
pub struct MemoryLineageStore {
    nodes: RwLock<BTreeMap<String, AssetNode>>,
    edges: RwLock<BTreeMap<String, LineageEdge>>,
    impacts: RwLock<Vec<ImpactRecord>>,
    fault: Mutex<Option<ReadFault>>,
}

impl MemoryLineageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<N, E>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator<Item = AssetNode>,
        E: IntoIterator<Item = LineageEdge>,
    {
        let store = Self::new();
        for node in nodes {
            store.upsert_node(node);
        }
        for edge in edges {
            store.upsert_edge(edge);
        }
        store
    }

    pub fn upsert_node(&self, node: AssetNode) {
        self.nodes.write().insert(node.node_id.clone(), node);
    }

    pub fn upsert_edge(&self, edge: LineageEdge) {
        self.edges.write().insert(edge.edge_id.clone(), edge);
    }

    pub fn remove_node(&self, node_id: &str) -> Option<AssetNode> {
        self.nodes.write().remove(node_id)
    }

    pub fn remove_edge(&self, edge_id: &str) -> Option<LineageEdge> {
        self.edges.write().remove(edge_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    pub fn impact_history(&self) -> Vec<ImpactRecord> {
        self.impacts.read().clone()
    }

    /// Makes the next listing of the given kind fail part-way through.
    pub fn inject_read_fault(&self, fault: ReadFault) {
        *self.fault.lock() = Some(fault);
    }

    fn take_fault(&self, kind: ReadFault) -> bool {
        let mut fault = self.fault.lock();
        if *fault == Some(kind) {
            *fault = None;
            true
        } else {
            false
        }
    }
}

fn stream_with_fault<T: 'static>(records: Vec<T>, fail: bool, what: &'static str) -> RecordStream<'static, T> {
    let records = records.into_iter().map(Ok);
    if fail {
        let failure = std::iter::once(Err(LineageError::storage(format!(
            "injected failure while reading {what}"
        ))));
        Box::new(records.take(1).chain(failure))
    } else {
        Box::new(records)
    }
}

impl LineageSource for MemoryLineageStore {
    fn list_nodes(&self) -> Result<RecordStream<'_, NodeRecord>, LineageError> {
        let records: Vec<NodeRecord> = self.nodes.read().values().cloned().collect();
        Ok(stream_with_fault(records, self.take_fault(ReadFault::Nodes), "nodes"))
    }

    fn list_edges(&self) -> Result<RecordStream<'_, EdgeRecord>, LineageError> {
        let records: Vec<EdgeRecord> = self.edges.read().values().cloned().collect();
        Ok(stream_with_fault(records, self.take_fault(ReadFault::Edges), "edges"))
    }
}

impl LineageSink for MemoryLineageStore {
    fn persist_changes(&self, changes: &[GraphChange]) -> Result<(), LineageError> {
        let mut nodes = self.nodes.write();
        let mut edges = self.edges.write();
        for change in changes {
            match change {
                GraphChange::CreateNode(node) | GraphChange::UpdateNode(node) => {
                    nodes.insert(node.node_id.clone(), node.clone());
                }
                GraphChange::DeleteNode(id) => {
                    nodes.remove(id);
                }
                GraphChange::CreateEdge(edge) | GraphChange::UpdateEdge(edge) => {
                    edges.insert(edge.edge_id.clone(), edge.clone());
                }
                GraphChange::DeleteEdge(id) => {
                    edges.remove(id);
                }
            }
        }
        Ok(())
    }

    fn persist_impact_analysis(&self, record: &ImpactRecord) -> Result<(), LineageError> {
        self.impacts.write().push(record.clone());
        Ok(())
    }
}
