//! The engine facade: one handle over the store, cache, updater, loader and
//! impact analyzer.

use std::{
    sync::{
        Arc,
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheKey, LineageCache},
    config::EngineConfig,
    errors::LineageError,
    graph::{
        delta::{GraphDelta, UpdatePayload, UpdateType},
        snapshot::GraphSnapshot,
    },
    impact::{ChangeType, ImpactAnalyzer, ImpactRecord, ImpactRequest, ImpactResult},
    loader::{GraphLoader, LineageSink, LineageSource, RefreshOutcome, RefreshStatus},
    query::{LineageGraph, LineageQuery, TruncationReason},
    store::GraphStore,
    traversal::traverse_tracked,
    updater::{GraphChangeEvent, RealTimeUpdater, UpdateAck},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthReport {
    pub node_count: usize,
    pub edge_count: usize,
    pub snapshot_version: u64,
    pub snapshot_age_secs: f64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    /// Unix seconds of the last successful refresh, if any.
    pub last_refresh: Option<u64>,
}

pub struct EngineBuilder {
    config: EngineConfig,
    snapshot: Option<GraphSnapshot>,
    source: Option<Arc<dyn LineageSource>>,
    sink: Option<Arc<dyn LineageSink>>,
}

impl EngineBuilder {
    /// Starts from a prebuilt snapshot instead of an empty graph.
    pub fn snapshot(mut self, snapshot: GraphSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn source(mut self, source: Arc<dyn LineageSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn LineageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates the configuration and, when a source is set, performs the
    /// initial load. A failed initial load fails the build.
    pub fn build(self) -> Result<LineageEngine, LineageError> {
        self.config.validate()?;
        let store = Arc::new(match self.snapshot {
            Some(snapshot) => GraphStore::with_snapshot(snapshot),
            None => GraphStore::new(),
        });
        let cache = Arc::new(LineageCache::new(self.config.cache.clone()));
        store.register_observer(cache.clone());

        let mut updater = RealTimeUpdater::new(Arc::clone(&store), &self.config.events);
        if let Some(sink) = &self.sink {
            updater = updater.with_sink(Arc::clone(sink));
        }
        let loader = self
            .source
            .map(|source| Arc::new(GraphLoader::new(source, self.config.loader.clone())));
        let analyzer = ImpactAnalyzer::new(self.config.impact.clone(), self.config.traversal.clone());

        let engine = LineageEngine {
            config: self.config,
            store,
            cache,
            updater,
            loader,
            analyzer,
            sink: self.sink,
        };
        if let Some(loader) = &engine.loader {
            loader.refresh(&engine.store)?;
        }
        Ok(engine)
    }
}

pub struct LineageEngine {
    config: EngineConfig,
    store: Arc<GraphStore>,
    cache: Arc<LineageCache>,
    updater: RealTimeUpdater,
    loader: Option<Arc<GraphLoader>>,
    analyzer: ImpactAnalyzer,
    sink: Option<Arc<dyn LineageSink>>,
}

impl LineageEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            snapshot: None,
            source: None,
            sink: None,
        }
    }

    /// An engine over an empty graph with default configuration.
    pub fn in_memory() -> Self {
        let config = EngineConfig::default();
        let store = Arc::new(GraphStore::new());
        let cache = Arc::new(LineageCache::new(config.cache.clone()));
        store.register_observer(cache.clone());
        Self {
            updater: RealTimeUpdater::new(Arc::clone(&store), &config.events),
            analyzer: ImpactAnalyzer::new(config.impact.clone(), config.traversal.clone()),
            loader: None,
            sink: None,
            config,
            store,
            cache,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn cache(&self) -> &LineageCache {
        &self.cache
    }

    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.store.get_snapshot()
    }

    pub fn query_lineage(&self, query: &LineageQuery) -> Result<Arc<LineageGraph>, LineageError> {
        query.validate(&self.config.traversal)?;
        let caching = self.config.cache.enabled;
        let key = CacheKey::from_query(query);
        if caching {
            if let Some(hit) = self.cache.get(&key) {
                return Ok(hit);
            }
        }

        let snapshot = self.store.get_snapshot();
        let tracked = traverse_tracked(&snapshot, query, &self.config.traversal);
        let deadline_hit = tracked.graph.metadata.truncation_reason == Some(TruncationReason::Deadline);
        if caching && !deadline_hit {
            self.cache
                .put_default(key, tracked.graph.clone(), tracked.footprint);
        }
        Ok(Arc::new(tracked.graph))
    }

    /// Runs independent queries in parallel. Results keep the input order.
    pub fn query_batch(&self, queries: &[LineageQuery]) -> Vec<Result<Arc<LineageGraph>, LineageError>> {
        queries.par_iter().map(|query| self.query_lineage(query)).collect()
    }

    pub fn analyze_impact(&self, request: &ImpactRequest) -> Result<ImpactResult, LineageError> {
        let query = self.analyzer.downstream_query(request)?;
        let graph = self.query_lineage(&query)?;
        let result = self.analyzer.score_graph(&graph, request);
        info!(
            source = %result.source_asset,
            change = %result.change_type,
            impacted = result.impacted_assets.len(),
            level = %result.overall_impact_level,
            "impact analyzed"
        );
        if result.source_found && self.config.impact.persist_results {
            if let Some(sink) = &self.sink {
                if let Err(err) = sink.persist_impact_analysis(&ImpactRecord::from_result(&result)) {
                    warn!(source = %result.source_asset, error = %err, "failed to persist impact analysis");
                }
            }
        }
        Ok(result)
    }

    /// Shorthand for `analyze_impact` with recommendations included.
    pub fn impact_of(&self, asset_id: &str, change_type: ChangeType) -> Result<ImpactResult, LineageError> {
        self.analyze_impact(&ImpactRequest::new(asset_id, change_type))
    }

    pub fn apply_update(&self, delta: &GraphDelta) -> Result<UpdateAck, LineageError> {
        self.updater.apply_delta(delta)
    }

    pub fn apply(&self, update_type: UpdateType, payload: UpdatePayload) -> Result<UpdateAck, LineageError> {
        self.updater.apply(update_type, payload)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphChangeEvent> {
        self.updater.subscribe()
    }

    pub fn refresh(&self) -> Result<RefreshOutcome, LineageError> {
        self.loader()?.refresh(&self.store)
    }

    pub fn refresh_if_stale(&self) -> Result<Option<RefreshOutcome>, LineageError> {
        self.loader()?.refresh_if_stale(&self.store)
    }

    pub fn refresh_status(&self) -> Option<RefreshStatus> {
        self.loader.as_ref().map(|loader| loader.last_status())
    }

    pub fn health(&self) -> HealthReport {
        let snapshot = self.store.get_snapshot();
        let stats = self.cache.stats();
        let last_refresh = self
            .loader
            .as_ref()
            .and_then(|loader| loader.last_status().last_success)
            .map(unix_secs);
        HealthReport {
            node_count: snapshot.node_count(),
            edge_count: snapshot.edge_count(),
            snapshot_version: snapshot.version(),
            snapshot_age_secs: snapshot.age().as_secs_f64(),
            cache_hit_rate: stats.hit_rate(),
            cache_entries: stats.entries,
            last_refresh,
        }
    }

    /// Starts a background thread that refreshes whenever the loaded graph
    /// goes stale, checking every `loader.refresh_check_secs`.
    pub fn spawn_refresh_worker(&self) -> Result<RefreshWorker, LineageError> {
        let loader = Arc::clone(self.loader()?);
        let store = Arc::clone(&self.store);
        let interval = self.config.loader.refresh_check_interval();
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("lineage-refresh".into())
            .spawn(move || refresh_loop(&loader, &store, interval, &stopped))
            .map_err(|e| LineageError::load(format!("spawning refresh worker: {e}")))?;
        Ok(RefreshWorker {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    fn loader(&self) -> Result<&Arc<GraphLoader>, LineageError> {
        self.loader
            .as_ref()
            .ok_or_else(|| LineageError::invalid_input("engine has no lineage source"))
    }
}

fn refresh_loop(loader: &GraphLoader, store: &GraphStore, interval: Duration, stopped: &mpsc::Receiver<()>) {
    loop {
        match stopped.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        debug!(version = store.version(), "refresh check");
        // failures are recorded in the loader status and logged there
        let _ = loader.refresh_if_stale(store);
    }
    debug!("refresh worker stopped");
}

/// Handle to the background refresh thread. Dropping it stops the thread.
pub struct RefreshWorker {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("refresh worker panicked");
            }
        }
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
