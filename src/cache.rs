//! Memoized traversal results.
//!
//! Each entry remembers the footprint of its traversal (every node id whose
//! change could alter the result). Targeted invalidation drops the entries
//! whose footprint contains a node touched by a delta; a loader refresh drops
//! everything. A result computed on an older snapshot is refused at `put`
//! time when a newer delta already touched its footprint.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::{
    config::{CacheConfig, InvalidationPolicy},
    query::{LineageGraph, LineageQuery, PathWeighting, TraversalAlgorithm, TraversalDirection},
    store::{AppliedDelta, SnapshotObserver},
};

/// Deltas remembered for the stale-put check.
const RECENT_DELTAS: usize = 256;

/// Deterministic composite of everything that shapes a traversal result.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub asset_id: String,
    pub direction: TraversalDirection,
    pub max_depth: u32,
    confidence_bits: u64,
    /// Sorted, deduplicated.
    pub asset_types: Vec<String>,
    pub algorithm: TraversalAlgorithm,
    pub weighting: PathWeighting,
}

impl CacheKey {
    pub fn from_query(query: &LineageQuery) -> Self {
        Self {
            asset_id: query.asset_id.clone(),
            direction: query.direction,
            max_depth: query.max_depth,
            // + 0.0 folds -0.0 into 0.0
            confidence_bits: (query.confidence_filter + 0.0).to_bits(),
            asset_types: query
                .asset_type_filter
                .as_ref()
                .map(|types| types.iter().cloned().collect())
                .unwrap_or_default(),
            algorithm: query.algorithm,
            weighting: query.weighting,
        }
    }

    pub fn confidence_filter(&self) -> f64 {
        f64::from_bits(self.confidence_bits)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct Entry {
    graph: Arc<LineageGraph>,
    footprint: Vec<String>,
    expires_at: Instant,
    stamp: u64,
}

#[derive(Default)]
struct Inner {
    entries: AHashMap<CacheKey, Entry>,
    next_stamp: u64,
    /// Results from snapshots older than this version are refused.
    floor: u64,
    recent: VecDeque<(u64, Vec<String>)>,
}

impl Inner {
    fn is_stale(&self, version: u64, footprint: &[String]) -> bool {
        if version < self.floor {
            return true;
        }
        self.recent
            .iter()
            .filter(|(applied, _)| *applied > version)
            .any(|(_, touched)| {
                touched
                    .iter()
                    .any(|id| footprint.binary_search(id).is_ok())
            })
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.stamp)
            .map(|(key, _)| key.clone());
        match oldest {
            Some(key) => self.entries.remove(&key).is_some(),
            None => false,
        }
    }
}

pub struct LineageCache {
    inner: RwLock<Inner>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl LineageCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<LineageGraph>> {
        let now = Instant::now();
        let found = {
            let inner = self.inner.read();
            inner
                .entries
                .get(key)
                .map(|entry| (entry.expires_at > now, Arc::clone(&entry.graph)))
        };
        match found {
            Some((true, graph)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(graph)
            }
            Some((false, _)) => {
                let mut inner = self.inner.write();
                if inner.entries.get(key).is_some_and(|entry| entry.expires_at <= now) {
                    inner.entries.remove(key);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `graph` under `key`. Returns false when the result was computed
    /// on a snapshot that a later delta or refresh already made stale.
    pub fn put(
        &self,
        key: CacheKey,
        graph: LineageGraph,
        mut footprint: Vec<String>,
        ttl: Duration,
    ) -> bool {
        footprint.sort();
        footprint.dedup();
        let version = graph.metadata.snapshot_version;
        let mut inner = self.inner.write();
        if inner.is_stale(version, &footprint) {
            debug!(asset = %key.asset_id, version, "refusing stale cache entry");
            return false;
        }
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_entries {
            if inner.evict_oldest() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.entries.insert(
            key,
            Entry {
                graph: Arc::new(graph),
                footprint,
                expires_at: Instant::now() + ttl,
                stamp,
            },
        );
        true
    }

    /// `put` with the configured TTL.
    pub fn put_default(&self, key: CacheKey, graph: LineageGraph, footprint: Vec<String>) -> bool {
        self.put(key, graph, footprint, self.config.ttl())
    }

    pub fn invalidate_all(&self) -> usize {
        let version = {
            let inner = self.inner.read();
            inner.floor
        };
        self.invalidate_through(version)
    }

    /// Drops every entry and refuses later puts computed before `version`.
    pub fn invalidate_through(&self, version: u64) -> usize {
        let mut inner = self.inner.write();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.recent.clear();
        inner.floor = inner.floor.max(version);
        self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
        debug!(dropped, floor = inner.floor, "cache cleared");
        dropped
    }

    pub fn invalidate_for_node(&self, node_id: &str) -> usize {
        self.invalidate_for_nodes(&[node_id.to_string()])
    }

    /// Drops entries whose footprint contains any of `node_ids`.
    pub fn invalidate_for_nodes(&self, node_ids: &[String]) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| {
            !node_ids
                .iter()
                .any(|id| entry.footprint.binary_search(id).is_ok())
        });
        let dropped = before - inner.entries.len();
        self.invalidations.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    fn record_delta(&self, applied: &AppliedDelta) -> usize {
        {
            let mut inner = self.inner.write();
            inner
                .recent
                .push_back((applied.version, applied.touched_nodes.clone()));
            while inner.recent.len() > RECENT_DELTAS {
                if let Some((version, _)) = inner.recent.pop_front() {
                    inner.floor = inner.floor.max(version);
                }
            }
        }
        self.invalidate_for_nodes(&applied.touched_nodes)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }
}

impl SnapshotObserver for LineageCache {
    fn snapshot_replaced(&self, version: u64) {
        self.invalidate_through(version);
    }

    fn delta_applied(&self, applied: &AppliedDelta) {
        let dropped = match self.config.invalidation {
            InvalidationPolicy::Targeted => self.record_delta(applied),
            InvalidationPolicy::Full => self.invalidate_through(applied.version),
        };
        debug!(
            version = applied.version,
            touched = applied.touched_nodes.len(),
            dropped,
            "cache invalidated for delta"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_filter_order_and_negative_zero() {
        let a = LineageQuery::new("x").asset_types(["view", "table"]).min_confidence(-0.0);
        let b = LineageQuery::new("x").asset_types(["table", "view", "table"]);
        assert_eq!(CacheKey::from_query(&a), CacheKey::from_query(&b));
    }

    #[test]
    fn test_hit_rate_with_no_lookups_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
