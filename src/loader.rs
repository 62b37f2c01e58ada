//! Bulk (re)loading of the graph store from a durable source.
//!
//! Nodes are read completely before any edge, since edges validate their
//! endpoints. The new snapshot is built off to the side and swapped in only
//! after both phases succeed; any read failure leaves the previous snapshot
//! authoritative.

use std::{
    sync::Arc,
    time::{Instant, SystemTime},
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::LoaderConfig,
    errors::LineageError,
    graph::{
        delta::GraphChange,
        snapshot::GraphSnapshot,
        types::{EdgeRecord, NodeRecord, validate_edge, validate_node},
    },
    impact::ImpactRecord,
    store::GraphStore,
};

/// A stream of records from a durable store. Each item may fail on its own.
pub type RecordStream<'a, T> = Box<dyn Iterator<Item = Result<T, LineageError>> + 'a>;

/// Source of truth the loader reads from.
pub trait LineageSource: Send + Sync {
    fn list_nodes(&self) -> Result<RecordStream<'_, NodeRecord>, LineageError>;
    fn list_edges(&self) -> Result<RecordStream<'_, EdgeRecord>, LineageError>;
}

/// Write-behind target for applied changes and impact history.
pub trait LineageSink: Send + Sync {
    fn persist_changes(&self, changes: &[GraphChange]) -> Result<(), LineageError>;
    fn persist_impact_analysis(&self, record: &ImpactRecord) -> Result<(), LineageError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub nodes_loaded: usize,
    pub edges_loaded: usize,
    /// Exact repeats of a record already loaded.
    pub duplicates: usize,
    pub skipped_nodes: Vec<SkippedRecord>,
    pub skipped_edges: Vec<SkippedRecord>,
    pub orphaned_nodes: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_nodes.is_empty() && self.skipped_edges.is_empty() && self.orphaned_nodes.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct RefreshOutcome {
    pub snapshot: Arc<GraphSnapshot>,
    pub report: LoadReport,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub last_attempt: Option<SystemTime>,
    pub last_success: Option<SystemTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_report: Option<LoadReport>,
    pub loaded_version: Option<u64>,
}

/// Reads a complete snapshot from `source`.
///
/// Read errors and conflicting duplicates abort. Invalid records and edges
/// with missing endpoints are skipped and listed in the report.
pub fn build_snapshot(source: &dyn LineageSource) -> Result<(GraphSnapshot, LoadReport), LineageError> {
    let mut snapshot = GraphSnapshot::empty();
    let mut report = LoadReport::default();

    let nodes = source
        .list_nodes()
        .map_err(|err| LineageError::load(format!("listing nodes: {err}")))?;
    for record in nodes {
        let node = record.map_err(|err| LineageError::load(format!("reading nodes: {err}")))?;
        if let Err(err) = validate_node(&node) {
            report.skipped_nodes.push(SkippedRecord {
                id: node.node_id.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        match snapshot.insert_node(node) {
            Ok(true) => report.nodes_loaded += 1,
            Ok(false) => report.duplicates += 1,
            Err(err) => return Err(LineageError::load(err.to_string())),
        }
    }
    debug!(nodes = report.nodes_loaded, "node phase complete");

    let edges = source
        .list_edges()
        .map_err(|err| LineageError::load(format!("listing edges: {err}")))?;
    for record in edges {
        let edge = record.map_err(|err| LineageError::load(format!("reading edges: {err}")))?;
        if let Err(err) = validate_edge(&edge) {
            report.skipped_edges.push(SkippedRecord {
                id: edge.edge_id.clone(),
                reason: err.to_string(),
            });
            continue;
        }
        let id_taken = snapshot.contains_edge(&edge.edge_id);
        let edge_id = edge.edge_id.clone();
        match snapshot.insert_edge(edge) {
            Ok(true) => report.edges_loaded += 1,
            Ok(false) => report.duplicates += 1,
            Err(err @ LineageError::Conflict(_)) if id_taken => {
                return Err(LineageError::load(err.to_string()));
            }
            Err(err) => report.skipped_edges.push(SkippedRecord {
                id: edge_id,
                reason: err.to_string(),
            }),
        }
    }

    report.orphaned_nodes = snapshot
        .nodes()
        .into_iter()
        .filter(|node| {
            node.parent_node_id
                .as_deref()
                .is_some_and(|parent| !snapshot.contains_node(parent))
        })
        .map(|node| node.node_id.clone())
        .collect();
    for skipped in report.skipped_nodes.iter().chain(&report.skipped_edges) {
        warn!(id = %skipped.id, reason = %skipped.reason, "skipped record during load");
    }
    if !report.orphaned_nodes.is_empty() {
        warn!(count = report.orphaned_nodes.len(), "orphaned nodes in load");
    }
    Ok((snapshot, report))
}

pub struct GraphLoader {
    source: Arc<dyn LineageSource>,
    config: LoaderConfig,
    status: Mutex<RefreshStatus>,
    last_success_at: Mutex<Option<Instant>>,
    refreshing: Mutex<()>,
}

impl GraphLoader {
    pub fn new(source: Arc<dyn LineageSource>, config: LoaderConfig) -> Self {
        Self {
            source,
            config,
            status: Mutex::new(RefreshStatus::default()),
            last_success_at: Mutex::new(None),
            refreshing: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &Arc<dyn LineageSource> {
        &self.source
    }

    /// Loads a fresh snapshot and swaps it into `store`.
    ///
    /// Deltas applied to `store` while the source is being read are replaced
    /// by the refreshed snapshot; the durable store is the source of truth.
    pub fn refresh(&self, store: &GraphStore) -> Result<RefreshOutcome, LineageError> {
        let _running = self.refreshing.lock();
        let started = Instant::now();
        self.status.lock().last_attempt = Some(SystemTime::now());

        match build_snapshot(self.source.as_ref()) {
            Ok((snapshot, report)) => {
                let published = store.replace_snapshot(snapshot);
                info!(
                    version = published.version(),
                    nodes = report.nodes_loaded,
                    edges = report.edges_loaded,
                    skipped = report.skipped_nodes.len() + report.skipped_edges.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "lineage graph refreshed"
                );
                *self.last_success_at.lock() = Some(Instant::now());
                let mut status = self.status.lock();
                status.last_success = Some(SystemTime::now());
                status.last_error = None;
                status.consecutive_failures = 0;
                status.last_report = Some(report.clone());
                status.loaded_version = Some(published.version());
                Ok(RefreshOutcome {
                    snapshot: published,
                    report,
                })
            }
            Err(err) => {
                let mut status = self.status.lock();
                status.last_error = Some(err.to_string());
                status.consecutive_failures += 1;
                warn!(
                    error = %err,
                    failures = status.consecutive_failures,
                    version = store.version(),
                    "refresh failed; keeping previous snapshot"
                );
                Err(err)
            }
        }
    }

    /// True before the first successful load and once `staleness` has passed since.
    pub fn is_stale(&self) -> bool {
        let last_success = *self.last_success_at.lock();
        last_success.is_none_or(|at| at.elapsed() >= self.config.staleness())
    }

    pub fn refresh_if_stale(&self, store: &GraphStore) -> Result<Option<RefreshOutcome>, LineageError> {
        if !self.is_stale() {
            return Ok(None);
        }
        self.refresh(store).map(Some)
    }

    pub fn last_status(&self) -> RefreshStatus {
        self.status.lock().clone()
    }
}
