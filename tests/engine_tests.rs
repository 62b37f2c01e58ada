use std::sync::Arc;
use std::time::Duration;

use lineagegraph::{
    AssetNode, ChangeType, EngineConfig, GraphChange, GraphDelta, ImpactRequest, LineageEdge,
    LineageEngine, LineageError, LineageQuery, MemoryLineageStore, TraversalAlgorithm,
    UpdatePayload, UpdateType,
};

fn node(id: &str) -> AssetNode {
    AssetNode::new(id, "table", id)
}

fn edge(id: &str, from: &str, to: &str) -> LineageEdge {
    LineageEdge::new(id, from, to, "etl")
}

fn memory() -> Arc<MemoryLineageStore> {
    Arc::new(MemoryLineageStore::with_records(
        [
            node("A"),
            node("B").with_importance(0.9),
            node("C").with_importance(0.2),
        ],
        [edge("ab", "A", "B"), edge("bc", "B", "C")],
    ))
}

fn engine_with(memory: Arc<MemoryLineageStore>) -> LineageEngine {
    LineageEngine::builder(EngineConfig::default())
        .source(memory.clone())
        .sink(memory)
        .build()
        .expect("engine")
}

#[test]
fn test_build_loads_from_source() {
    let engine = engine_with(memory());
    let health = engine.health();
    assert_eq!((health.node_count, health.edge_count), (3, 2));
    assert_eq!(health.snapshot_version, 2);
    assert!(health.last_refresh.is_some());
}

#[test]
fn test_repeated_query_is_served_from_cache() {
    let engine = engine_with(memory());
    let query = LineageQuery::downstream("A").max_depth(2);
    let first = engine.query_lineage(&query).expect("first");
    let second = engine.query_lineage(&query).expect("second");
    assert_eq!(first, second);
    let stats = engine.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(engine.health().cache_hit_rate, 0.5);
}

#[test]
fn test_update_invalidates_cached_result() {
    let engine = engine_with(memory());
    let query = LineageQuery::downstream("A").max_depth(3);
    assert_eq!(engine.query_lineage(&query).expect("query").total_nodes, 3);

    engine
        .apply(UpdateType::Create, UpdatePayload::Node(node("D")))
        .expect("create node");
    engine
        .apply(UpdateType::Create, UpdatePayload::Edge(edge("cd", "C", "D")))
        .expect("create edge");

    let after = engine.query_lineage(&query).expect("query");
    assert_eq!(after.total_nodes, 4);
    assert_eq!(after.metadata.snapshot_version, 4);
}

#[test]
fn test_invalid_query_is_rejected() {
    let engine = engine_with(memory());
    let err = engine
        .query_lineage(&LineageQuery::downstream("A").max_depth(500))
        .unwrap_err();
    assert!(matches!(err, LineageError::Validation(_)));
    let err = engine
        .query_lineage(&LineageQuery::downstream("A").min_confidence(1.5))
        .unwrap_err();
    assert!(matches!(err, LineageError::Validation(_)));
}

#[test]
fn test_batch_preserves_order() {
    let engine = engine_with(memory());
    let queries = vec![
        LineageQuery::downstream("A"),
        LineageQuery::upstream("C").algorithm(TraversalAlgorithm::DepthFirst),
        LineageQuery::downstream("ghost"),
    ];
    let results = engine.query_batch(&queries);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().expect("a").metadata.root, "A");
    assert_eq!(results[1].as_ref().expect("c").total_nodes, 3);
    assert_eq!(results[2].as_ref().expect("ghost").total_nodes, 0);
}

#[test]
fn test_impact_is_persisted_to_sink() {
    let memory = memory();
    let engine = engine_with(memory.clone());
    let result = engine
        .analyze_impact(&ImpactRequest::new("A", ChangeType::Deletion))
        .expect("impact");
    assert_eq!(result.critical_path, vec!["A", "B"]);
    let history = memory.impact_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source_asset, "A");

    engine
        .impact_of("ghost", ChangeType::Deletion)
        .expect("missing source");
    assert_eq!(memory.impact_history().len(), 1);
}

#[test]
fn test_impact_traversal_goes_through_cache() {
    let engine = engine_with(memory());
    let request = ImpactRequest::new("A", ChangeType::SchemaChange);
    let first = engine.analyze_impact(&request).expect("first");
    let second = engine.analyze_impact(&request).expect("second");
    assert_eq!(first, second);
    assert_eq!(engine.cache().stats().hits, 1);

    engine
        .apply(
            UpdateType::Update,
            UpdatePayload::Node(node("C").with_importance(1.0)),
        )
        .expect("update");
    let after = engine.analyze_impact(&request).expect("after update");
    assert_eq!(engine.cache().stats().hits, 1);
    assert!(after.snapshot_version > first.snapshot_version);
    let score_of = |result: &lineagegraph::ImpactResult, id: &str| {
        result
            .impacted_assets
            .iter()
            .find(|asset| asset.node_id == id)
            .map(|asset| asset.impact_score)
            .expect("impacted")
    };
    assert!(score_of(&after, "C") > score_of(&first, "C"));
}

#[test]
fn test_impact_not_persisted_when_disabled() {
    let memory = memory();
    let mut config = EngineConfig::default();
    config.impact.persist_results = false;
    let engine = LineageEngine::builder(config)
        .source(memory.clone())
        .sink(memory.clone())
        .build()
        .expect("engine");
    engine.impact_of("A", ChangeType::QualityIssue).expect("impact");
    assert!(memory.impact_history().is_empty());
}

#[test]
fn test_updates_are_written_behind_and_survive_refresh() {
    let memory = memory();
    let engine = engine_with(memory.clone());
    engine
        .apply_update(&GraphDelta::new(vec![
            GraphChange::CreateNode(node("D")),
            GraphChange::CreateEdge(edge("cd", "C", "D")),
        ]))
        .expect("update");
    engine.refresh().expect("refresh");
    assert!(engine.snapshot().contains_edge("cd"));
}

#[test]
fn test_subscribe_through_engine() {
    let engine = engine_with(memory());
    let mut events = engine.subscribe();
    engine
        .apply(UpdateType::Update, UpdatePayload::Node(node("C").with_importance(1.0)))
        .expect("update");
    let event = events.try_recv().expect("event");
    assert!(matches!(event.change, GraphChange::UpdateNode(_)));
}

#[test]
fn test_engine_without_source_cannot_refresh() {
    let engine = LineageEngine::in_memory();
    assert!(matches!(engine.refresh(), Err(LineageError::InvalidInput(_))));
    assert!(engine.spawn_refresh_worker().is_err());
    assert!(engine.refresh_status().is_none());
}

#[test]
fn test_failed_initial_load_fails_build() {
    let memory = memory();
    memory.inject_read_fault(lineagegraph::memory_store::ReadFault::Nodes);
    let result = LineageEngine::builder(EngineConfig::default())
        .source(memory)
        .build();
    assert!(matches!(result, Err(LineageError::Load(_))));
}

#[test]
fn test_refresh_worker_reloads_stale_graph() {
    let memory = memory();
    let mut config = EngineConfig::default();
    config.loader.staleness_secs = 0;
    config.loader.refresh_check_secs = 1;
    let engine = LineageEngine::builder(config)
        .source(memory.clone())
        .build()
        .expect("engine");

    memory.upsert_node(node("late"));
    let worker = engine.spawn_refresh_worker().expect("worker");
    let mut seen = false;
    for _ in 0..500 {
        if engine.snapshot().contains_node("late") {
            seen = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    worker.shutdown();
    assert!(seen);
}
