//! Traversal requests and results.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    config::TraversalConfig,
    errors::LineageError,
    graph::types::{AssetNode, LineageEdge, unit_interval},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    /// Follow edges backwards, towards the sources feeding the root.
    Upstream,
    /// Follow edges forwards, towards everything derived from the root.
    #[default]
    Downstream,
    Bidirectional,
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TraversalDirection::Upstream => "upstream",
            TraversalDirection::Downstream => "downstream",
            TraversalDirection::Bidirectional => "bidirectional",
        })
    }
}

impl FromStr for TraversalDirection {
    type Err = LineageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upstream" | "up" => Ok(TraversalDirection::Upstream),
            "downstream" | "down" => Ok(TraversalDirection::Downstream),
            "bidirectional" | "both" => Ok(TraversalDirection::Bidirectional),
            other => Err(LineageError::invalid_input(format!(
                "unknown traversal direction {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalAlgorithm {
    #[default]
    #[serde(rename = "bfs")]
    BreadthFirst,
    #[serde(rename = "dfs")]
    DepthFirst,
    ShortestPath,
    AllPaths,
    CriticalPath,
}

impl TraversalAlgorithm {
    pub const ALL: [TraversalAlgorithm; 5] = [
        TraversalAlgorithm::BreadthFirst,
        TraversalAlgorithm::DepthFirst,
        TraversalAlgorithm::ShortestPath,
        TraversalAlgorithm::AllPaths,
        TraversalAlgorithm::CriticalPath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TraversalAlgorithm::BreadthFirst => "bfs",
            TraversalAlgorithm::DepthFirst => "dfs",
            TraversalAlgorithm::ShortestPath => "shortest_path",
            TraversalAlgorithm::AllPaths => "all_paths",
            TraversalAlgorithm::CriticalPath => "critical_path",
        }
    }
}

impl fmt::Display for TraversalAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraversalAlgorithm {
    type Err = LineageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "bfs" | "breadth_first" => Ok(TraversalAlgorithm::BreadthFirst),
            "dfs" | "depth_first" => Ok(TraversalAlgorithm::DepthFirst),
            "shortest_path" | "shortest" => Ok(TraversalAlgorithm::ShortestPath),
            "all_paths" => Ok(TraversalAlgorithm::AllPaths),
            "critical_path" | "critical" => Ok(TraversalAlgorithm::CriticalPath),
            other => Err(LineageError::invalid_input(format!(
                "unknown traversal algorithm {other}"
            ))),
        }
    }
}

/// Edge cost used by the shortest-path strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathWeighting {
    /// Every edge costs 1.
    #[default]
    Hops,
    /// Every edge costs `1 - confidence`; paths still respect `max_depth` hops.
    Certainty,
}

impl FromStr for PathWeighting {
    type Err = LineageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hops" => Ok(PathWeighting::Hops),
            "certainty" | "confidence" => Ok(PathWeighting::Certainty),
            other => Err(LineageError::invalid_input(format!(
                "unknown path weighting {other}"
            ))),
        }
    }
}

/// A traversal request. Built per call and never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageQuery {
    pub asset_id: String,
    #[serde(default)]
    pub direction: TraversalDirection,
    #[serde(default = "default_depth")]
    pub max_depth: u32,
    /// Minimum edge confidence an edge needs to be followed.
    #[serde(default)]
    pub confidence_filter: f64,
    /// Allow-list of asset types. The root is always kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type_filter: Option<BTreeSet<String>>,
    #[serde(default)]
    pub algorithm: TraversalAlgorithm,
    #[serde(default)]
    pub weighting: PathWeighting,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_depth() -> u32 {
    3
}

impl LineageQuery {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            direction: TraversalDirection::Downstream,
            max_depth: default_depth(),
            confidence_filter: 0.0,
            asset_type_filter: None,
            algorithm: TraversalAlgorithm::BreadthFirst,
            weighting: PathWeighting::Hops,
            timeout_ms: None,
        }
    }

    pub fn downstream(asset_id: impl Into<String>) -> Self {
        Self::new(asset_id)
    }

    pub fn upstream(asset_id: impl Into<String>) -> Self {
        Self::new(asset_id).direction(TraversalDirection::Upstream)
    }

    pub fn bidirectional(asset_id: impl Into<String>) -> Self {
        Self::new(asset_id).direction(TraversalDirection::Bidirectional)
    }

    pub fn direction(mut self, direction: TraversalDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn min_confidence(mut self, confidence: f64) -> Self {
        self.confidence_filter = confidence;
        self
    }

    pub fn asset_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asset_type_filter = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn algorithm(mut self, algorithm: TraversalAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn weighting(mut self, weighting: PathWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self, config: &TraversalConfig) -> Result<(), LineageError> {
        if self.asset_id.trim().is_empty() {
            return Err(LineageError::validation("query asset_id must be set"));
        }
        if self.max_depth > config.max_depth_limit {
            return Err(LineageError::validation(format!(
                "max_depth {} exceeds limit {}",
                self.max_depth, config.max_depth_limit
            )));
        }
        if !unit_interval(self.confidence_filter) {
            return Err(LineageError::validation(format!(
                "confidence_filter {} outside [0, 1]",
                self.confidence_filter
            )));
        }
        if let Some(types) = &self.asset_type_filter {
            if types.iter().any(|kind| kind.trim().is_empty()) {
                return Err(LineageError::validation("asset_type_filter has an empty entry"));
            }
        }
        Ok(())
    }
}

/// Why a traversal stopped before exhausting its depth bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    NodeLimit,
    PathLimit,
    Deadline,
    CentralityLimit,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalMetadata {
    pub root: String,
    pub root_found: bool,
    pub direction: TraversalDirection,
    pub algorithm: TraversalAlgorithm,
    pub max_depth: u32,
    pub confidence_filter: f64,
    pub snapshot_version: u64,
    pub visited_nodes: usize,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_reason: Option<TruncationReason>,
}

/// One root-anchored path, as node ids and the edge ids joining them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineagePath {
    pub nodes: Vec<String>,
    pub edges: Vec<String>,
    /// Product of edge confidences along the path.
    pub confidence: f64,
}

impl LineagePath {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn target(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRanking {
    pub node_id: String,
    pub score: f64,
    pub business_importance: f64,
    pub betweenness: f64,
    pub closeness: f64,
}

/// Subgraph produced by a traversal, in discovery order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub nodes: Vec<AssetNode>,
    pub edges: Vec<LineageEdge>,
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Hop distance from the root for every returned node.
    pub distances: BTreeMap<String, u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<LineagePath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rankings: Vec<NodeRanking>,
    pub metadata: TraversalMetadata,
}

impl LineageGraph {
    /// Result for a root that is not in the snapshot.
    pub fn empty(query: &LineageQuery, snapshot_version: u64) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            total_nodes: 0,
            total_edges: 0,
            distances: BTreeMap::new(),
            paths: Vec::new(),
            rankings: Vec::new(),
            metadata: TraversalMetadata {
                root: query.asset_id.clone(),
                root_found: false,
                direction: query.direction,
                algorithm: query.algorithm,
                max_depth: query.max_depth,
                confidence_filter: query.confidence_filter,
                snapshot_version,
                visited_nodes: 0,
                truncated: false,
                truncation_reason: None,
            },
        }
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.distances.contains_key(node_id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.node_id.as_str()).collect()
    }

    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|edge| edge.edge_id.as_str()).collect()
    }

    pub fn is_truncated(&self) -> bool {
        self.metadata.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names_round_trip_through_display() {
        for algorithm in TraversalAlgorithm::ALL {
            let parsed: TraversalAlgorithm = algorithm.to_string().parse().unwrap();
            assert_eq!(parsed, algorithm);
        }
        assert_eq!(
            "critical-path".parse::<TraversalAlgorithm>().unwrap(),
            TraversalAlgorithm::CriticalPath
        );
    }

    #[test]
    fn test_algorithm_serializes_with_short_names() {
        let json = serde_json::to_string(&TraversalAlgorithm::BreadthFirst).unwrap();
        assert_eq!(json, "\"bfs\"");
        let json = serde_json::to_string(&TraversalAlgorithm::AllPaths).unwrap();
        assert_eq!(json, "\"all_paths\"");
    }

    #[test]
    fn test_validate_rejects_depth_over_limit_and_nan_confidence() {
        let config = TraversalConfig::default();
        assert!(LineageQuery::new("a").max_depth(21).validate(&config).is_err());
        assert!(
            LineageQuery::new("a")
                .min_confidence(f64::NAN)
                .validate(&config)
                .is_err()
        );
        assert!(LineageQuery::new(" ").validate(&config).is_err());
        LineageQuery::new("a").max_depth(20).validate(&config).unwrap();
    }
}
