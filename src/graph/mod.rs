//! Core lineage graph structure: typed records, deltas and the snapshot arena.

pub mod delta;
pub mod snapshot;
pub mod types;

pub use delta::{GraphChange, GraphDelta, UpdatePayload, UpdateType};
pub use snapshot::GraphSnapshot;
pub use types::{AssetNode, EdgeRecord, LineageEdge, NodeRecord, validate_edge, validate_node};
