use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::LineageError;

/// Record shape read from a durable store.
pub type NodeRecord = AssetNode;
/// Record shape read from a durable store.
pub type EdgeRecord = LineageEdge;

/// A cataloged data asset (table, column, view, report, model, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetNode {
    pub node_id: String,
    pub asset_type: String,
    pub asset_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<String>,
    #[serde(default = "default_importance")]
    pub business_importance: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl AssetNode {
    pub fn new(
        node_id: impl Into<String>,
        asset_type: impl Into<String>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            asset_type: asset_type.into(),
            asset_name: asset_name.into(),
            schema_name: None,
            database_name: None,
            parent_node_id: None,
            business_importance: 0.5,
            metadata: BTreeMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.business_importance = importance;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_node_id = Some(parent.into());
        self
    }

    pub fn with_schema(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.database_name = Some(database.into());
        self.schema_name = Some(schema.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Reports and dashboards are read directly by people.
    pub fn is_user_facing(&self) -> bool {
        matches_kind(&self.asset_type, &["report", "dashboard"])
    }

    /// Models and pipelines compute further assets from their inputs.
    pub fn is_processing(&self) -> bool {
        matches_kind(&self.asset_type, &["model", "pipeline"])
    }
}

/// A directed lineage relationship between two assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageEdge {
    pub edge_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub lineage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_type: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl LineageEdge {
    pub fn new(
        edge_id: impl Into<String>,
        source_node_id: impl Into<String>,
        target_node_id: impl Into<String>,
        lineage_type: impl Into<String>,
    ) -> Self {
        Self {
            edge_id: edge_id.into(),
            source_node_id: source_node_id.into(),
            target_node_id: target_node_id.into(),
            lineage_type: lineage_type.into(),
            transformation_type: None,
            confidence: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_transformation(mut self, transformation: impl Into<String>) -> Self {
        self.transformation_type = Some(transformation.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

fn default_confidence() -> f64 {
    1.0
}

fn default_importance() -> f64 {
    0.5
}

fn matches_kind(kind: &str, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|candidate| kind.eq_ignore_ascii_case(candidate))
}

pub fn validate_node(node: &AssetNode) -> Result<(), LineageError> {
    if node.node_id.trim().is_empty() {
        return Err(LineageError::validation("node_id must be set"));
    }
    if node.asset_type.trim().is_empty() {
        return Err(LineageError::validation(format!(
            "node {} has no asset_type",
            node.node_id
        )));
    }
    if node.asset_name.trim().is_empty() {
        return Err(LineageError::validation(format!(
            "node {} has no asset_name",
            node.node_id
        )));
    }
    if !unit_interval(node.business_importance) {
        return Err(LineageError::validation(format!(
            "node {} business_importance {} outside [0, 1]",
            node.node_id, node.business_importance
        )));
    }
    if node.parent_node_id.as_deref() == Some(node.node_id.as_str()) {
        return Err(LineageError::validation(format!(
            "node {} cannot be its own parent",
            node.node_id
        )));
    }
    Ok(())
}

pub fn validate_edge(edge: &LineageEdge) -> Result<(), LineageError> {
    if edge.edge_id.trim().is_empty() {
        return Err(LineageError::validation("edge_id must be set"));
    }
    if edge.lineage_type.trim().is_empty() {
        return Err(LineageError::validation(format!(
            "edge {} has no lineage_type",
            edge.edge_id
        )));
    }
    if edge.source_node_id.trim().is_empty() || edge.target_node_id.trim().is_empty() {
        return Err(LineageError::validation(format!(
            "edge {} endpoints must be set",
            edge.edge_id
        )));
    }
    if edge.source_node_id == edge.target_node_id {
        return Err(LineageError::validation(format!(
            "edge {} is a self loop on {}",
            edge.edge_id, edge.source_node_id
        )));
    }
    if !unit_interval(edge.confidence) {
        return Err(LineageError::validation(format!(
            "edge {} confidence {} outside [0, 1]",
            edge.edge_id, edge.confidence
        )));
    }
    Ok(())
}

pub(crate) fn unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_helpers() {
        assert!(AssetNode::new("r", "Report", "revenue").is_user_facing());
        assert!(AssetNode::new("d", "dashboard", "ops").is_user_facing());
        assert!(AssetNode::new("m", "MODEL", "churn").is_processing());
        assert!(!AssetNode::new("t", "table", "orders").is_user_facing());
    }

    #[test]
    fn test_validate_edge_rejects_self_loop_and_bad_confidence() {
        let looped = LineageEdge::new("e1", "a", "a", "table_to_table");
        assert!(validate_edge(&looped).is_err());
        let shaky = LineageEdge::new("e2", "a", "b", "table_to_table").with_confidence(1.5);
        assert!(validate_edge(&shaky).is_err());
        let nan = LineageEdge::new("e3", "a", "b", "table_to_table").with_confidence(f64::NAN);
        assert!(validate_edge(&nan).is_err());
    }

    #[test]
    fn test_edge_confidence_defaults_to_one_when_missing() {
        let edge: LineageEdge = serde_json::from_str(
            r#"{"edge_id":"e","source_node_id":"a","target_node_id":"b","lineage_type":"etl"}"#,
        )
        .expect("edge json");
        assert_eq!(edge.confidence, 1.0);
    }
}
