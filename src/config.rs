//! Engine configuration.
//!
//! Every section has defaults, so an empty JSON object (`{}`) is a valid
//! configuration. Load with [`EngineConfig::from_path`] or
//! [`EngineConfig::from_json_str`]; both run [`EngineConfig::validate`].
//!
//! ```rust
//! use lineagegraph::EngineConfig;
//! let config = EngineConfig::from_json_str(r#"{"cache": {"ttl_secs": 60}}"#).unwrap();
//! assert_eq!(config.cache.ttl_secs, 60);
//! assert_eq!(config.traversal.max_nodes, 100_000);
//! ```

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::errors::LineageError;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub traversal: TraversalConfig,
    pub impact: ImpactConfig,
    pub cache: CacheConfig,
    pub loader: LoaderConfig,
    pub events: EventConfig,
}

/// Caps and weights applied to every traversal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Hard cap on visited nodes per traversal.
    pub max_nodes: usize,
    /// Cap on paths explored by the all-paths search.
    pub max_paths: usize,
    /// Largest `max_depth` a query may ask for.
    pub max_depth_limit: u32,
    /// Wall-clock budget for queries that do not set their own.
    pub default_timeout_ms: Option<u64>,
    /// Largest region the centrality pass will score.
    pub centrality_node_limit: usize,
    pub critical_top_n: usize,
    pub business_weight: f64,
    pub centrality_weight: f64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_nodes: 100_000,
            max_paths: 10_000,
            max_depth_limit: 20,
            default_timeout_ms: None,
            centrality_node_limit: 5_000,
            critical_top_n: 5,
            business_weight: 0.6,
            centrality_weight: 0.4,
        }
    }
}

impl TraversalConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub max_depth: u32,
    pub min_confidence: f64,
    /// Forward each analysis to the sink for audit history.
    pub persist_results: bool,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_confidence: 0.0,
            persist_results: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationPolicy {
    /// Drop only entries whose footprint contains a touched node.
    #[default]
    Targeted,
    /// Drop everything on any structural delta.
    Full,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub invalidation: InvalidationPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3_600,
            max_entries: 10_000,
            invalidation: InvalidationPolicy::Targeted,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub staleness_secs: u64,
    pub refresh_check_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 3_600,
            refresh_check_secs: 60,
        }
    }
}

impl LoaderConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_check_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub channel_capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LineageError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LineageError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            LineageError::invalid_input(format!("cannot read config {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), LineageError> {
        let traversal = &self.traversal;
        if traversal.max_nodes == 0 {
            return Err(LineageError::invalid_input("traversal.max_nodes must be > 0"));
        }
        if traversal.max_paths == 0 {
            return Err(LineageError::invalid_input("traversal.max_paths must be > 0"));
        }
        if traversal.max_depth_limit == 0 {
            return Err(LineageError::invalid_input(
                "traversal.max_depth_limit must be > 0",
            ));
        }
        if traversal.centrality_node_limit == 0 {
            return Err(LineageError::invalid_input(
                "traversal.centrality_node_limit must be > 0",
            ));
        }
        let weights = [traversal.business_weight, traversal.centrality_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
            return Err(LineageError::invalid_input(
                "traversal weights must be non-negative and not both zero",
            ));
        }
        if self.impact.max_depth == 0 || self.impact.max_depth > traversal.max_depth_limit {
            return Err(LineageError::invalid_input(format!(
                "impact.max_depth must be within 1..={}",
                traversal.max_depth_limit
            )));
        }
        if !(0.0..=1.0).contains(&self.impact.min_confidence) {
            return Err(LineageError::invalid_input(
                "impact.min_confidence must be within [0, 1]",
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(LineageError::invalid_input("cache.max_entries must be > 0"));
        }
        if self.loader.refresh_check_secs == 0 {
            return Err(LineageError::invalid_input(
                "loader.refresh_check_secs must be > 0",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(LineageError::invalid_input(
                "events.channel_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        EngineConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            EngineConfig::from_json_str(r#"{"cache": {"invalidation": "full"}}"#).expect("config");
        assert_eq!(config.cache.invalidation, InvalidationPolicy::Full);
        assert_eq!(config.cache.ttl_secs, 3_600);
        assert_eq!(config.impact.max_depth, 10);
    }

    #[test]
    fn test_impact_depth_over_limit_rejected() {
        let err = EngineConfig::from_json_str(r#"{"impact": {"max_depth": 50}}"#).unwrap_err();
        assert!(matches!(err, LineageError::InvalidInput(_)));
    }
}
