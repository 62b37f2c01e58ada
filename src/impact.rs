//! Downstream impact scoring.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{ImpactConfig, TraversalConfig},
    errors::LineageError,
    graph::{snapshot::GraphSnapshot, types::AssetNode},
    query::{LineageGraph, LineageQuery, TraversalAlgorithm},
    traversal::traverse_with_config,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Deletion,
    SchemaChange,
    QualityIssue,
    DataUpdate,
    Other,
}

impl ChangeType {
    /// Deletions and schema changes break consumers outright.
    pub fn is_breaking(&self) -> bool {
        matches!(self, ChangeType::Deletion | ChangeType::SchemaChange)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Deletion => "deletion",
            ChangeType::SchemaChange => "schema_change",
            ChangeType::QualityIssue => "quality_issue",
            ChangeType::DataUpdate => "data_update",
            ChangeType::Other => "other",
        })
    }
}

impl FromStr for ChangeType {
    type Err = LineageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "deletion" | "delete" => Ok(ChangeType::Deletion),
            "schema_change" | "schema" => Ok(ChangeType::SchemaChange),
            "quality_issue" | "quality" => Ok(ChangeType::QualityIssue),
            "data_update" | "update" => Ok(ChangeType::DataUpdate),
            "other" => Ok(ChangeType::Other),
            other => Err(LineageError::invalid_input(format!(
                "unknown change type {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl ImpactLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ImpactLevel::Critical
        } else if score >= 0.6 {
            ImpactLevel::High
        } else if score >= 0.4 {
            ImpactLevel::Medium
        } else if score >= 0.2 {
            ImpactLevel::Low
        } else {
            ImpactLevel::Minimal
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImpactLevel::Minimal => "minimal",
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
            ImpactLevel::Critical => "critical",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactRequest {
    pub source_asset_id: String,
    pub change_type: ChangeType,
    #[serde(default = "default_true")]
    pub include_recommendations: bool,
    /// Overrides `impact.max_depth` for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl ImpactRequest {
    pub fn new(source_asset_id: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            source_asset_id: source_asset_id.into(),
            change_type,
            include_recommendations: true,
            max_depth: None,
        }
    }

    pub fn without_recommendations(mut self) -> Self {
        self.include_recommendations = false;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactedAsset {
    pub node_id: String,
    pub asset_name: String,
    pub asset_type: String,
    pub impact_score: f64,
    pub distance: u32,
    pub impact_level: ImpactLevel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactResult {
    pub source_asset: String,
    pub source_found: bool,
    pub change_type: ChangeType,
    /// Ranked by score (desc), then distance (asc), then node id.
    pub impacted_assets: Vec<ImpactedAsset>,
    pub overall_impact_score: f64,
    pub overall_impact_level: ImpactLevel,
    pub critical_path: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub snapshot_version: u64,
    pub truncated: bool,
}

impl ImpactResult {
    pub fn level_counts(&self) -> BTreeMap<ImpactLevel, usize> {
        let mut counts = BTreeMap::new();
        for asset in &self.impacted_assets {
            *counts.entry(asset.impact_level).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_at(&self, level: ImpactLevel) -> usize {
        self.impacted_assets
            .iter()
            .filter(|asset| asset.impact_level == level)
            .count()
    }
}

/// Audit row handed to the sink after an analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpactRecord {
    pub source_asset: String,
    pub change_type: ChangeType,
    pub overall_impact_score: f64,
    pub overall_impact_level: ImpactLevel,
    pub impacted_count: usize,
    pub level_counts: BTreeMap<ImpactLevel, usize>,
    pub critical_path: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub snapshot_version: u64,
    pub analyzed_at: u64,
}

impl ImpactRecord {
    pub fn from_result(result: &ImpactResult) -> Self {
        Self {
            source_asset: result.source_asset.clone(),
            change_type: result.change_type,
            overall_impact_score: result.overall_impact_score,
            overall_impact_level: result.overall_impact_level,
            impacted_count: result.impacted_assets.len(),
            level_counts: result.level_counts(),
            critical_path: result.critical_path.clone(),
            recommended_actions: result.recommended_actions.clone(),
            snapshot_version: result.snapshot_version,
            analyzed_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default(),
        }
    }
}

/// Heuristic severity of `change_type` at `source` for a downstream `asset`
/// `distance` hops away, in [0, 1].
pub fn score_asset(asset: &AssetNode, distance: u32, change_type: ChangeType) -> f64 {
    let mut score = 0.5;
    if asset.is_user_facing() {
        score += 0.3;
    }
    if asset.is_processing() {
        score += 0.2;
    }
    if distance <= 2 {
        score += 0.2;
    }
    if distance > 5 {
        score -= 0.1;
    }
    if change_type.is_breaking() {
        score += 0.3;
    }
    if change_type == ChangeType::QualityIssue {
        score += 0.1;
    }
    score *= 0.5 + 0.5 * asset.business_importance;
    score.clamp(0.0, 1.0)
}

pub struct ImpactAnalyzer {
    config: ImpactConfig,
    traversal: TraversalConfig,
}

impl ImpactAnalyzer {
    pub fn new(config: ImpactConfig, traversal: TraversalConfig) -> Self {
        Self { config, traversal }
    }

    /// Positional form of [`ImpactAnalyzer::analyze`].
    pub fn analyze_impact(
        &self,
        snapshot: &GraphSnapshot,
        source_asset_id: &str,
        change_type: ChangeType,
        include_recommendations: bool,
    ) -> Result<ImpactResult, LineageError> {
        let mut request = ImpactRequest::new(source_asset_id, change_type);
        request.include_recommendations = include_recommendations;
        self.analyze(snapshot, &request)
    }

    pub fn analyze(
        &self,
        snapshot: &GraphSnapshot,
        request: &ImpactRequest,
    ) -> Result<ImpactResult, LineageError> {
        let query = self.downstream_query(request)?;
        let graph = traverse_with_config(snapshot, &query, &self.traversal);
        Ok(self.score_graph(&graph, request))
    }

    /// The downstream shortest-path traversal an impact request runs over.
    /// Callers holding a result cache look it up under this query.
    pub fn downstream_query(&self, request: &ImpactRequest) -> Result<LineageQuery, LineageError> {
        let query = LineageQuery::downstream(request.source_asset_id.clone())
            .max_depth(request.max_depth.unwrap_or(self.config.max_depth))
            .min_confidence(self.config.min_confidence)
            .algorithm(TraversalAlgorithm::ShortestPath);
        query.validate(&self.traversal)?;
        Ok(query)
    }

    /// Scores a graph produced by [`ImpactAnalyzer::downstream_query`].
    pub fn score_graph(&self, graph: &LineageGraph, request: &ImpactRequest) -> ImpactResult {
        if !graph.metadata.root_found {
            return ImpactResult {
                source_asset: request.source_asset_id.clone(),
                source_found: false,
                change_type: request.change_type,
                impacted_assets: Vec::new(),
                overall_impact_score: 0.0,
                overall_impact_level: ImpactLevel::Minimal,
                critical_path: Vec::new(),
                recommended_actions: vec![format!(
                    "Source asset {} not found in the lineage graph",
                    request.source_asset_id
                )],
                snapshot_version: graph.metadata.snapshot_version,
                truncated: false,
            };
        }

        let mut impacted: Vec<ImpactedAsset> = graph
            .nodes
            .iter()
            .filter(|node| node.node_id != request.source_asset_id)
            .map(|node| {
                let distance = graph.distances.get(&node.node_id).copied().unwrap_or(0);
                let impact_score = score_asset(node, distance, request.change_type);
                ImpactedAsset {
                    node_id: node.node_id.clone(),
                    asset_name: node.asset_name.clone(),
                    asset_type: node.asset_type.clone(),
                    impact_score,
                    distance,
                    impact_level: ImpactLevel::from_score(impact_score),
                }
            })
            .collect();
        impacted.sort_by(|a, b| {
            b.impact_score
                .total_cmp(&a.impact_score)
                .then_with(|| a.distance.cmp(&b.distance))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });

        let overall_impact_score = if impacted.is_empty() {
            0.0
        } else {
            impacted.iter().map(|asset| asset.impact_score).sum::<f64>() / impacted.len() as f64
        };

        let mut result = ImpactResult {
            source_asset: request.source_asset_id.clone(),
            source_found: true,
            change_type: request.change_type,
            impacted_assets: impacted,
            overall_impact_score,
            overall_impact_level: ImpactLevel::from_score(overall_impact_score),
            critical_path: critical_path(graph, &request.source_asset_id),
            recommended_actions: Vec::new(),
            snapshot_version: graph.metadata.snapshot_version,
            truncated: graph.metadata.truncated,
        };
        if request.include_recommendations {
            result.recommended_actions = recommendations(&result, graph);
        }
        debug!(
            source = %result.source_asset,
            change = %result.change_type,
            impacted = result.impacted_assets.len(),
            overall = result.overall_impact_score,
            "impact analyzed"
        );
        result
    }
}

/// Shortest path from the source to its most business-important reachable
/// node (ties: nearer first, then smaller id). The traversal graph holds a
/// shortest-path tree, so each non-root node has exactly one incoming edge.
fn critical_path(graph: &LineageGraph, source: &str) -> Vec<String> {
    let target = graph
        .nodes
        .iter()
        .filter(|node| node.node_id != source)
        .min_by(|a, b| {
            b.business_importance
                .total_cmp(&a.business_importance)
                .then_with(|| graph.distances.get(&a.node_id).cmp(&graph.distances.get(&b.node_id)))
                .then_with(|| a.node_id.cmp(&b.node_id))
        });
    let Some(target) = target else {
        return Vec::new();
    };

    let parents: HashMap<&str, &str> = graph
        .edges
        .iter()
        .map(|edge| (edge.target_node_id.as_str(), edge.source_node_id.as_str()))
        .collect();
    let mut path = vec![target.node_id.clone()];
    let mut current = target.node_id.as_str();
    while current != source {
        let Some(&parent) = parents.get(current) else {
            break;
        };
        path.push(parent.to_string());
        current = parent;
        if path.len() > graph.nodes.len() {
            break;
        }
    }
    path.reverse();
    path
}

fn recommendations(result: &ImpactResult, graph: &LineageGraph) -> Vec<String> {
    let mut actions = Vec::new();
    if result.impacted_assets.is_empty() {
        actions.push("No downstream assets are affected; the change can proceed".to_string());
        return actions;
    }

    let critical = result.count_at(ImpactLevel::Critical);
    let high = result.count_at(ImpactLevel::High);
    if critical > 0 {
        actions.push(format!(
            "Notify owners of {critical} critically impacted assets before proceeding"
        ));
    }
    if high > 0 {
        actions.push(format!("Review {high} high-impact downstream assets"));
    }
    let user_facing = graph
        .nodes
        .iter()
        .filter(|node| node.node_id != result.source_asset && node.is_user_facing())
        .count();
    if user_facing > 0 {
        actions.push(format!(
            "Alert consumers of {user_facing} affected reports and dashboards"
        ));
    }

    match result.change_type {
        ChangeType::Deletion => {
            actions.push("Confirm no active consumers remain before deleting the asset".to_string());
            actions.push("Plan replacement sources for dependent pipelines".to_string());
        }
        ChangeType::SchemaChange => {
            actions.push(
                "Coordinate the schema change with downstream transformations and update column mappings"
                    .to_string(),
            );
        }
        ChangeType::QualityIssue => {
            actions.push("Run data quality checks on downstream assets".to_string());
            actions.push("Flag affected reports until the issue is resolved".to_string());
        }
        ChangeType::DataUpdate => {
            actions.push("Schedule a refresh of downstream assets after the update".to_string());
        }
        ChangeType::Other => {}
    }

    if result.overall_impact_level >= ImpactLevel::High {
        actions.push("Stage the change in a non-production environment first".to_string());
    }
    if result.truncated {
        actions.push("Impact analysis hit a traversal cap; results may be incomplete".to_string());
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_formula() {
        let report = AssetNode::new("r", "report", "revenue").with_importance(1.0);
        // 0.5 + 0.3 + 0.2 + 0.3 = 1.3, times 1.0, clamped
        assert_eq!(score_asset(&report, 1, ChangeType::Deletion), 1.0);

        let table = AssetNode::new("t", "table", "orders").with_importance(0.0);
        // (0.5 - 0.1) * 0.5
        let score = score_asset(&table, 6, ChangeType::Other);
        assert!((score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_level_buckets() {
        assert_eq!(ImpactLevel::from_score(0.8), ImpactLevel::Critical);
        assert_eq!(ImpactLevel::from_score(0.79), ImpactLevel::High);
        assert_eq!(ImpactLevel::from_score(0.4), ImpactLevel::Medium);
        assert_eq!(ImpactLevel::from_score(0.2), ImpactLevel::Low);
        assert_eq!(ImpactLevel::from_score(0.19), ImpactLevel::Minimal);
        assert!(ImpactLevel::Critical > ImpactLevel::High);
    }

    #[test]
    fn test_change_type_parsing() {
        assert_eq!("schema-change".parse::<ChangeType>().unwrap(), ChangeType::SchemaChange);
        assert!(ChangeType::Deletion.is_breaking());
        assert!(!ChangeType::QualityIssue.is_breaking());
    }
}
