use std::sync::Arc;
use std::time::Duration;

use lineagegraph::{
    AssetNode, CacheConfig, CacheKey, GraphChange, GraphDelta, GraphSnapshot, GraphStore,
    InvalidationPolicy, LineageCache, LineageEdge, LineageQuery, TraversalConfig,
    traversal::traverse_tracked,
};

fn node(id: &str) -> AssetNode {
    AssetNode::new(id, "table", id)
}

fn two_chains() -> GraphSnapshot {
    GraphSnapshot::from_records(
        ["A", "B", "C", "X", "Y"].map(node),
        [
            LineageEdge::new("ab", "A", "B", "etl"),
            LineageEdge::new("bc", "B", "C", "etl"),
            LineageEdge::new("xy", "X", "Y", "etl"),
        ],
    )
    .expect("snapshot")
}

fn cached_store(policy: InvalidationPolicy) -> (GraphStore, Arc<LineageCache>) {
    let store = GraphStore::with_snapshot(two_chains());
    let cache = Arc::new(LineageCache::new(CacheConfig {
        invalidation: policy,
        ..CacheConfig::default()
    }));
    store.register_observer(cache.clone());
    (store, cache)
}

fn fill(store: &GraphStore, cache: &LineageCache, query: &LineageQuery) -> CacheKey {
    let tracked = traverse_tracked(&store.get_snapshot(), query, &TraversalConfig::default());
    let key = CacheKey::from_query(query);
    assert!(cache.put_default(key.clone(), tracked.graph, tracked.footprint));
    key
}

#[test]
fn test_get_after_put_counts_hits_and_misses() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let query = LineageQuery::downstream("A");
    let key = CacheKey::from_query(&query);
    assert!(cache.get(&key).is_none());
    fill(&store, &cache, &query);
    let hit = cache.get(&key).expect("cached");
    assert_eq!(hit.total_nodes, 3);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    assert_eq!(cache.hit_rate(), 0.5);
}

#[test]
fn test_expired_entry_is_a_miss() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let query = LineageQuery::downstream("A");
    let tracked = traverse_tracked(&store.get_snapshot(), &query, &TraversalConfig::default());
    let key = CacheKey::from_query(&query);
    cache.put(key.clone(), tracked.graph, tracked.footprint, Duration::ZERO);
    assert!(cache.get(&key).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_targeted_delta_keeps_unrelated_entries() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let abc = fill(&store, &cache, &LineageQuery::downstream("A"));
    let xy = fill(&store, &cache, &LineageQuery::downstream("X"));

    store
        .apply_delta(&GraphDelta::single(GraphChange::UpdateNode(
            node("C").with_importance(0.9),
        )))
        .expect("apply");

    assert!(cache.get(&abc).is_none());
    assert!(cache.get(&xy).is_some());
}

#[test]
fn test_new_edge_from_result_node_invalidates() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let key = fill(&store, &cache, &LineageQuery::downstream("A"));
    store
        .apply_delta(&GraphDelta::single(GraphChange::CreateEdge(LineageEdge::new(
            "cx", "C", "X", "etl",
        ))))
        .expect("apply");
    assert!(cache.get(&key).is_none());
}

#[test]
fn test_full_policy_clears_everything() {
    let (store, cache) = cached_store(InvalidationPolicy::Full);
    fill(&store, &cache, &LineageQuery::downstream("A"));
    let xy = fill(&store, &cache, &LineageQuery::downstream("X"));
    store
        .apply_delta(&GraphDelta::single(GraphChange::CreateNode(node("Z"))))
        .expect("apply");
    assert!(cache.get(&xy).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_stale_put_is_refused() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let query = LineageQuery::downstream("A");
    let old_snapshot = store.get_snapshot();
    store
        .apply_delta(&GraphDelta::single(GraphChange::DeleteEdge("bc".into())))
        .expect("apply");

    let tracked = traverse_tracked(&old_snapshot, &query, &TraversalConfig::default());
    let stored = cache.put_default(CacheKey::from_query(&query), tracked.graph, tracked.footprint);
    assert!(!stored);
    assert!(cache.is_empty());
}

#[test]
fn test_refresh_refuses_results_from_before_the_swap() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    let query = LineageQuery::downstream("X");
    let old_snapshot = store.get_snapshot();
    store.replace_snapshot(two_chains());

    let tracked = traverse_tracked(&old_snapshot, &query, &TraversalConfig::default());
    assert!(!cache.put_default(CacheKey::from_query(&query), tracked.graph, tracked.footprint));
}

#[test]
fn test_oldest_entry_evicted_at_capacity() {
    let store = GraphStore::with_snapshot(two_chains());
    let cache = LineageCache::new(CacheConfig {
        max_entries: 2,
        ..CacheConfig::default()
    });
    let a = fill(&store, &cache, &LineageQuery::downstream("A"));
    let b = fill(&store, &cache, &LineageQuery::downstream("B"));
    let x = fill(&store, &cache, &LineageQuery::downstream("X"));

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&a).is_none());
    assert!(cache.get(&b).is_some());
    assert!(cache.get(&x).is_some());
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn test_invalidate_for_node_and_all() {
    let (store, cache) = cached_store(InvalidationPolicy::Targeted);
    fill(&store, &cache, &LineageQuery::downstream("A"));
    fill(&store, &cache, &LineageQuery::upstream("C"));
    fill(&store, &cache, &LineageQuery::downstream("X"));

    assert_eq!(cache.invalidate_for_node("B"), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.invalidate_all(), 1);
    assert!(cache.is_empty());
}
