//! Versioned home of the live lineage graph.
//!
//! Readers take an `Arc<GraphSnapshot>` from an `ArcSwap` and never lock.
//! Writers are serialized by one mutex: each delta is applied to a private
//! copy of the current snapshot and the copy is swapped in only when every
//! change in the delta succeeded.

use std::sync::Arc;

use ahash::AHashMap;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    errors::LineageError,
    graph::{
        delta::{GraphDelta, apply_changes},
        snapshot::GraphSnapshot,
    },
};

/// Receives notifications after the writer lock has been released.
pub trait SnapshotObserver: Send + Sync {
    /// A whole new snapshot replaced the previous one (loader refresh).
    fn snapshot_replaced(&self, version: u64);

    /// A delta changed the graph and produced `applied.version`.
    fn delta_applied(&self, applied: &AppliedDelta);
}

/// Outcome of a successful `GraphStore::apply_delta`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDelta {
    pub version: u64,
    pub sequence: u64,
    /// False when every change was an identical re-create; the version is unchanged.
    pub changed: bool,
    /// Nodes whose lineage neighborhood changed, sorted.
    pub touched_nodes: Vec<String>,
    /// Nodes whose `parent_node_id` does not resolve after the delta.
    pub orphaned: Vec<String>,
}

#[derive(Debug, Default)]
struct WriterState {
    next_sequence: u64,
    last_applied: AHashMap<String, u64>,
}

impl WriterState {
    /// Returns the delta's sequence and the counter value that follows it.
    fn claim(&self, delta: &GraphDelta) -> Result<(u64, u64), LineageError> {
        let sequence = delta.sequence.unwrap_or(self.next_sequence.max(1));
        let following = sequence.checked_add(1).ok_or_else(|| {
            LineageError::invalid_input(format!("sequence {sequence} leaves no room for later deltas"))
        })?;
        if delta.sequence.is_none() {
            return Ok((sequence, following));
        }
        for change in &delta.changes {
            let key = change.entity_key();
            if let Some(&last) = self.last_applied.get(&key) {
                if sequence <= last {
                    return Err(LineageError::concurrency(format!(
                        "{key} already at sequence {last}, delta carries {sequence}"
                    )));
                }
            }
        }
        Ok((sequence, following))
    }

    fn record(&mut self, delta: &GraphDelta, sequence: u64, following: u64) {
        for change in &delta.changes {
            self.last_applied.insert(change.entity_key(), sequence);
        }
        self.next_sequence = self.next_sequence.max(following);
    }
}

pub struct GraphStore {
    current: ArcSwap<GraphSnapshot>,
    writer: Mutex<WriterState>,
    observers: RwLock<Vec<Arc<dyn SnapshotObserver>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_snapshot(GraphSnapshot::empty())
    }

    /// Starts the store from a prebuilt snapshot, published as version 1.
    pub fn with_snapshot(mut snapshot: GraphSnapshot) -> Self {
        snapshot.set_version(1);
        Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(WriterState {
                next_sequence: 1,
                last_applied: AHashMap::new(),
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Current snapshot handle. Never blocks, even while a writer is active.
    pub fn get_snapshot(&self) -> Arc<GraphSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    /// `(node_count, edge_count)` of the current snapshot.
    pub fn size(&self) -> (usize, usize) {
        let snapshot = self.current.load();
        (snapshot.node_count(), snapshot.edge_count())
    }

    pub fn register_observer(&self, observer: Arc<dyn SnapshotObserver>) {
        self.observers.write().push(observer);
    }

    /// Applies a delta all-or-nothing.
    ///
    /// Rejections (`NodeNotFound`, `Conflict`, `Validation`,
    /// `ConcurrencyConflict`, ...) leave the published snapshot untouched.
    pub fn apply_delta(&self, delta: &GraphDelta) -> Result<AppliedDelta, LineageError> {
        self.apply_delta_with(delta, |_| {})
    }

    /// Like [`GraphStore::apply_delta`], with `on_commit` run while the writer
    /// lock is still held. Successive commits therefore reach the hook in
    /// sequence order. The hook must not call back into this store.
    pub fn apply_delta_with<F>(&self, delta: &GraphDelta, on_commit: F) -> Result<AppliedDelta, LineageError>
    where
        F: FnOnce(&AppliedDelta),
    {
        delta.validate_shape()?;

        let applied = {
            let mut writer = self.writer.lock();
            let (sequence, following) = writer.claim(delta)?;
            let current = self.current.load_full();
            let mut working = GraphSnapshot::clone(&current);
            let outcome = match apply_changes(&mut working, &delta.changes) {
                Ok(outcome) => outcome,
                Err(err) => {
                    debug!(sequence, error = %err, "delta rejected");
                    return Err(err);
                }
            };
            writer.record(delta, sequence, following);

            let version = if outcome.changed {
                let version = current.version() + 1;
                working.set_version(version);
                self.current.store(Arc::new(working));
                version
            } else {
                current.version()
            };

            let applied = AppliedDelta {
                version,
                sequence,
                changed: outcome.changed,
                touched_nodes: outcome.touched_nodes.into_iter().collect(),
                orphaned: outcome.orphaned,
            };
            on_commit(&applied);
            applied
        };

        debug!(
            version = applied.version,
            sequence = applied.sequence,
            changed = applied.changed,
            touched = applied.touched_nodes.len(),
            "delta applied"
        );
        if applied.changed {
            for observer in self.observers.read().iter() {
                observer.delta_applied(&applied);
            }
        }
        Ok(applied)
    }

    /// Publishes a fully built snapshot as the next version.
    pub fn replace_snapshot(&self, mut snapshot: GraphSnapshot) -> Arc<GraphSnapshot> {
        let published = {
            let _writer = self.writer.lock();
            let version = self.current.load().version() + 1;
            snapshot.set_version(version);
            let published = Arc::new(snapshot);
            self.current.store(Arc::clone(&published));
            published
        };
        info!(
            version = published.version(),
            nodes = published.node_count(),
            edges = published.edge_count(),
            "snapshot replaced"
        );
        for observer in self.observers.read().iter() {
            observer.snapshot_replaced(published.version());
        }
        published
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
