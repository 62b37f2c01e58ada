//! Incremental updates to the live graph.
//!
//! Cheap checks (record shape, endpoint existence against the current
//! snapshot) run before the store's writer lock is taken, so malformed or
//! obviously dangling deltas never queue behind other writers. The store
//! repeats the authoritative checks under the lock.

use std::sync::Arc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    config::EventConfig,
    errors::LineageError,
    graph::{
        delta::{GraphChange, GraphDelta, UpdatePayload, UpdateType},
        snapshot::GraphSnapshot,
    },
    loader::LineageSink,
    store::{AppliedDelta, GraphStore},
};

/// Published to subscribers for every change in an applied delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphChangeEvent {
    pub sequence: u64,
    pub version: u64,
    pub change: GraphChange,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpdateAck {
    pub sequence: u64,
    pub version: u64,
    pub changed: bool,
    pub orphaned: Vec<String>,
}

pub struct RealTimeUpdater {
    store: Arc<GraphStore>,
    events: broadcast::Sender<GraphChangeEvent>,
    sink: Option<Arc<dyn LineageSink>>,
}

impl RealTimeUpdater {
    pub fn new(store: Arc<GraphStore>, config: &EventConfig) -> Self {
        let (events, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            store,
            events,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LineageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Receives every change applied after this call. Slow receivers see
    /// `RecvError::Lagged` rather than blocking writers.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphChangeEvent> {
        self.events.subscribe()
    }

    pub fn apply(&self, update_type: UpdateType, payload: UpdatePayload) -> Result<UpdateAck, LineageError> {
        self.apply_delta(&GraphDelta::single(GraphChange::from_update(update_type, payload)))
    }

    pub fn apply_delta(&self, delta: &GraphDelta) -> Result<UpdateAck, LineageError> {
        delta.validate_shape()?;
        precheck(&self.store.get_snapshot(), delta)?;

        // Publishing and write-behind run under the store's writer lock so
        // subscribers and the sink see deltas in sequence order.
        let applied = self.store.apply_delta_with(delta, |applied| {
            if applied.changed {
                self.publish(delta, applied);
            }
        })?;
        if !applied.orphaned.is_empty() {
            warn!(orphaned = ?applied.orphaned, "delta left nodes without their parent");
        }
        debug!(
            sequence = applied.sequence,
            version = applied.version,
            changes = delta.changes.len(),
            "update applied"
        );

        Ok(UpdateAck {
            sequence: applied.sequence,
            version: applied.version,
            changed: applied.changed,
            orphaned: applied.orphaned,
        })
    }

    fn publish(&self, delta: &GraphDelta, applied: &AppliedDelta) {
        for change in &delta.changes {
            // no subscribers is not an error
            let _ = self.events.send(GraphChangeEvent {
                sequence: applied.sequence,
                version: applied.version,
                change: change.clone(),
            });
        }
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.persist_changes(&delta.changes) {
                warn!(sequence = applied.sequence, error = %err, "write-behind persist failed");
            }
        }
    }
}

/// Referential checks against `snapshot` with the delta's own creates and
/// deletes overlaid in order.
fn precheck(snapshot: &GraphSnapshot, delta: &GraphDelta) -> Result<(), LineageError> {
    let mut created: AHashSet<&str> = AHashSet::new();
    let mut deleted: AHashSet<&str> = AHashSet::new();
    let exists = |id: &str, created: &AHashSet<&str>, deleted: &AHashSet<&str>| {
        !deleted.contains(id) && (created.contains(id) || snapshot.contains_node(id))
    };

    for change in &delta.changes {
        match change {
            GraphChange::CreateNode(node) => {
                deleted.remove(node.node_id.as_str());
                created.insert(&node.node_id);
            }
            GraphChange::UpdateNode(node) => {
                if !exists(&node.node_id, &created, &deleted) {
                    return Err(LineageError::node_not_found(node.node_id.clone()));
                }
            }
            GraphChange::DeleteNode(id) => {
                if !exists(id, &created, &deleted) {
                    return Err(LineageError::node_not_found(id.clone()));
                }
                created.remove(id.as_str());
                deleted.insert(id);
            }
            GraphChange::CreateEdge(edge) | GraphChange::UpdateEdge(edge) => {
                for endpoint in [&edge.source_node_id, &edge.target_node_id] {
                    if !exists(endpoint, &created, &deleted) {
                        return Err(LineageError::node_not_found(endpoint.clone()));
                    }
                }
            }
            GraphChange::DeleteEdge(_) => {}
        }
    }
    Ok(())
}
