//! In-memory lineage graph engine: versioned snapshots, traversal,
//! impact analysis and result caching over a durable lineage store.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod export;
pub mod graph;
pub mod impact;
pub mod loader;
pub mod memory_store;
pub mod query;
pub mod safety;
pub mod schema;
pub mod sqlite_store;
pub mod store;
pub mod synthetic;
pub mod traversal;
pub mod updater;

pub use crate::cache::{CacheKey, CacheStats, LineageCache};
pub use crate::config::{
    CacheConfig, EngineConfig, EventConfig, ImpactConfig, InvalidationPolicy, LoaderConfig,
    TraversalConfig,
};
pub use crate::engine::{EngineBuilder, HealthReport, LineageEngine, RefreshWorker};
pub use crate::errors::LineageError;
pub use crate::export::{JsonlSource, dump_snapshot_to_path, dump_snapshot_to_writer};
pub use crate::graph::{
    AssetNode, GraphChange, GraphDelta, GraphSnapshot, LineageEdge, UpdatePayload, UpdateType,
};
pub use crate::impact::{
    ChangeType, ImpactAnalyzer, ImpactLevel, ImpactRecord, ImpactRequest, ImpactResult,
    ImpactedAsset,
};
pub use crate::loader::{GraphLoader, LineageSink, LineageSource, LoadReport, RefreshStatus};
pub use crate::memory_store::MemoryLineageStore;
pub use crate::query::{
    LineageGraph, LineagePath, LineageQuery, PathWeighting, TraversalAlgorithm,
    TraversalDirection, TruncationReason,
};
pub use crate::safety::{IntegrityReport, check_integrity};
pub use crate::sqlite_store::SqliteLineageStore;
pub use crate::store::{AppliedDelta, GraphStore};
pub use crate::traversal::{traverse, traverse_with_config};
pub use crate::updater::{GraphChangeEvent, RealTimeUpdater, UpdateAck};
