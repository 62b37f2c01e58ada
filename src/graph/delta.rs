use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    errors::LineageError,
    graph::{
        snapshot::{GraphSnapshot, NodeIdx},
        types::{AssetNode, LineageEdge, validate_edge, validate_node},
    },
};

/// A single create/update/delete against one node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum GraphChange {
    CreateNode(AssetNode),
    UpdateNode(AssetNode),
    DeleteNode(String),
    CreateEdge(LineageEdge),
    UpdateEdge(LineageEdge),
    DeleteEdge(String),
}

impl GraphChange {
    pub fn from_update(update_type: UpdateType, payload: UpdatePayload) -> Self {
        match (update_type, payload) {
            (UpdateType::Create, UpdatePayload::Node(node)) => GraphChange::CreateNode(node),
            (UpdateType::Update, UpdatePayload::Node(node)) => GraphChange::UpdateNode(node),
            (UpdateType::Delete, UpdatePayload::Node(node)) => GraphChange::DeleteNode(node.node_id),
            (UpdateType::Create, UpdatePayload::Edge(edge)) => GraphChange::CreateEdge(edge),
            (UpdateType::Update, UpdatePayload::Edge(edge)) => GraphChange::UpdateEdge(edge),
            (UpdateType::Delete, UpdatePayload::Edge(edge)) => GraphChange::DeleteEdge(edge.edge_id),
        }
    }

    pub fn update_type(&self) -> UpdateType {
        match self {
            GraphChange::CreateNode(_) | GraphChange::CreateEdge(_) => UpdateType::Create,
            GraphChange::UpdateNode(_) | GraphChange::UpdateEdge(_) => UpdateType::Update,
            GraphChange::DeleteNode(_) | GraphChange::DeleteEdge(_) => UpdateType::Delete,
        }
    }

    /// Stable key of the entity this change targets, used for sequencing.
    pub fn entity_key(&self) -> String {
        match self {
            GraphChange::CreateNode(node) | GraphChange::UpdateNode(node) => {
                format!("node:{}", node.node_id)
            }
            GraphChange::DeleteNode(id) => format!("node:{id}"),
            GraphChange::CreateEdge(edge) | GraphChange::UpdateEdge(edge) => {
                format!("edge:{}", edge.edge_id)
            }
            GraphChange::DeleteEdge(id) => format!("edge:{id}"),
        }
    }

    /// Checks that need no graph state: ids present, scores in range, no self loops.
    pub fn validate_shape(&self) -> Result<(), LineageError> {
        match self {
            GraphChange::CreateNode(node) | GraphChange::UpdateNode(node) => validate_node(node),
            GraphChange::CreateEdge(edge) | GraphChange::UpdateEdge(edge) => validate_edge(edge),
            GraphChange::DeleteNode(id) | GraphChange::DeleteEdge(id) => {
                if id.trim().is_empty() {
                    Err(LineageError::validation("delete requires an id"))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateType::Create => "create",
            UpdateType::Update => "update",
            UpdateType::Delete => "delete",
        };
        f.write_str(label)
    }
}

impl FromStr for UpdateType {
    type Err = LineageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(UpdateType::Create),
            "update" | "modify" => Ok(UpdateType::Update),
            "delete" | "remove" => Ok(UpdateType::Delete),
            other => Err(LineageError::invalid_input(format!(
                "unknown update type {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum UpdatePayload {
    Node(AssetNode),
    Edge(LineageEdge),
}

/// An ordered set of changes applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDelta {
    pub changes: Vec<GraphChange>,
    /// Caller-side logical clock. Must be newer than the last sequence applied
    /// to every entity the delta touches; the store assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl GraphDelta {
    pub fn new(changes: Vec<GraphChange>) -> Self {
        Self {
            changes,
            sequence: None,
        }
    }

    pub fn single(change: GraphChange) -> Self {
        Self::new(vec![change])
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn push(&mut self, change: GraphChange) {
        self.changes.push(change);
    }

    pub fn validate_shape(&self) -> Result<(), LineageError> {
        if self.changes.is_empty() {
            return Err(LineageError::validation("delta contains no changes"));
        }
        self.changes.iter().try_for_each(GraphChange::validate_shape)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct DeltaOutcome {
    pub changed: bool,
    pub touched_nodes: BTreeSet<String>,
    pub orphaned: Vec<String>,
}

/// Applies `changes` in order to a working copy. On error the copy must be
/// discarded; the caller never publishes a partially applied delta.
pub(crate) fn apply_changes(
    snapshot: &mut GraphSnapshot,
    changes: &[GraphChange],
) -> Result<DeltaOutcome, LineageError> {
    let mut outcome = DeltaOutcome::default();
    let mut removed: Vec<(String, NodeIdx)> = Vec::new();
    let mut written_nodes: Vec<String> = Vec::new();

    for change in changes {
        match change {
            GraphChange::CreateNode(node) => {
                if snapshot.insert_node(node.clone())? {
                    outcome.changed = true;
                    outcome.touched_nodes.insert(node.node_id.clone());
                    written_nodes.push(node.node_id.clone());
                }
            }
            GraphChange::UpdateNode(node) => {
                if snapshot.update_node(node.clone())? {
                    outcome.changed = true;
                    touch_with_neighbors(snapshot, &node.node_id, &mut outcome.touched_nodes);
                    written_nodes.push(node.node_id.clone());
                }
            }
            GraphChange::DeleteNode(node_id) => {
                touch_with_neighbors(snapshot, node_id, &mut outcome.touched_nodes);
                let idx = snapshot.remove_node(node_id)?;
                removed.push((node_id.clone(), idx));
                outcome.changed = true;
            }
            GraphChange::CreateEdge(edge) => {
                if snapshot.insert_edge(edge.clone())? {
                    outcome.changed = true;
                    touch_endpoints(edge, &mut outcome.touched_nodes);
                }
            }
            GraphChange::UpdateEdge(edge) => {
                let previous = snapshot.edge(&edge.edge_id).cloned();
                if snapshot.update_edge(edge.clone())? {
                    outcome.changed = true;
                    touch_endpoints(edge, &mut outcome.touched_nodes);
                    if let Some(previous) = previous {
                        touch_endpoints(&previous, &mut outcome.touched_nodes);
                    }
                }
            }
            GraphChange::DeleteEdge(edge_id) => {
                let previous = snapshot
                    .edge(edge_id)
                    .cloned()
                    .ok_or_else(|| LineageError::edge_not_found(edge_id.clone()))?;
                snapshot.remove_edge(edge_id)?;
                outcome.changed = true;
                touch_endpoints(&previous, &mut outcome.touched_nodes);
            }
        }
    }

    for (node_id, idx) in &removed {
        let attached = snapshot.attached_edges(*idx);
        if !attached.is_empty() {
            return Err(LineageError::validation(format!(
                "node {node_id} still has lineage edges [{}]; delete or reassign them in the same delta",
                attached.join(", ")
            )));
        }
    }

    outcome.orphaned = find_orphans(snapshot, &written_nodes, &removed);
    Ok(outcome)
}

fn touch_endpoints(edge: &LineageEdge, touched: &mut BTreeSet<String>) {
    touched.insert(edge.source_node_id.clone());
    touched.insert(edge.target_node_id.clone());
}

fn touch_with_neighbors(snapshot: &GraphSnapshot, node_id: &str, touched: &mut BTreeSet<String>) {
    touched.insert(node_id.to_string());
    if let Some(idx) = snapshot.node_idx(node_id) {
        touched.extend(snapshot.adjacent_node_ids(idx));
    }
}

fn find_orphans(
    snapshot: &GraphSnapshot,
    written: &[String],
    removed: &[(String, NodeIdx)],
) -> Vec<String> {
    let mut orphans = BTreeSet::new();
    for node_id in written {
        if let Some(node) = snapshot.node(node_id) {
            if let Some(parent) = node.parent_node_id.as_deref() {
                if !snapshot.contains_node(parent) {
                    orphans.insert(node_id.clone());
                }
            }
        }
    }
    if !removed.is_empty() {
        let gone: HashSet<&str> = removed.iter().map(|(id, _)| id.as_str()).collect();
        for node in snapshot.nodes() {
            if node
                .parent_node_id
                .as_deref()
                .is_some_and(|parent| gone.contains(parent))
            {
                orphans.insert(node.node_id.clone());
            }
        }
    }
    orphans.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_payload_maps_to_change() {
        let node = AssetNode::new("orders", "table", "orders");
        let change = GraphChange::from_update(UpdateType::Delete, UpdatePayload::Node(node));
        assert_eq!(change, GraphChange::DeleteNode("orders".into()));
        assert_eq!(change.entity_key(), "node:orders");
    }

    #[test]
    fn test_update_type_parses_aliases() {
        assert_eq!("INSERT".parse::<UpdateType>().unwrap(), UpdateType::Create);
        assert_eq!("remove".parse::<UpdateType>().unwrap(), UpdateType::Delete);
        assert!("merge".parse::<UpdateType>().is_err());
    }

    #[test]
    fn test_empty_delta_fails_shape_check() {
        assert!(GraphDelta::default().validate_shape().is_err());
    }
}
