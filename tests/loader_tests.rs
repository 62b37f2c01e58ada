use std::sync::Arc;

use lineagegraph::{
    AssetNode, GraphChange, GraphDelta, GraphLoader, GraphStore, LineageEdge, LineageError,
    LoaderConfig, MemoryLineageStore, loader::build_snapshot, memory_store::ReadFault,
};

fn node(id: &str) -> AssetNode {
    AssetNode::new(id, "table", id)
}

fn edge(id: &str, from: &str, to: &str) -> LineageEdge {
    LineageEdge::new(id, from, to, "etl")
}

fn source() -> Arc<MemoryLineageStore> {
    Arc::new(MemoryLineageStore::with_records(
        ["A", "B", "C"].map(node),
        [edge("ab", "A", "B"), edge("bc", "B", "C")],
    ))
}

#[test]
fn test_refresh_swaps_in_a_complete_snapshot() {
    let store = GraphStore::new();
    let loader = GraphLoader::new(source(), LoaderConfig::default());
    assert!(loader.is_stale());

    let outcome = loader.refresh(&store).expect("refresh");
    assert_eq!(outcome.snapshot.version(), 2);
    assert_eq!(store.size(), (3, 2));
    assert!(outcome.report.is_clean());
    assert!(!loader.is_stale());

    let status = loader.last_status();
    assert_eq!(status.loaded_version, Some(2));
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_success.is_some());
}

#[test]
fn test_read_failure_keeps_previous_snapshot() {
    let store = GraphStore::new();
    let memory = source();
    let loader = GraphLoader::new(memory.clone(), LoaderConfig::default());
    loader.refresh(&store).expect("first load");

    memory.upsert_node(node("D"));
    memory.inject_read_fault(ReadFault::Edges);
    let err = loader.refresh(&store).unwrap_err();
    assert!(matches!(err, LineageError::Load(_)));
    assert_eq!(store.size(), (3, 2));
    assert_eq!(store.version(), 2);

    let status = loader.last_status();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.is_some());

    loader.refresh(&store).expect("retry");
    assert_eq!(store.size(), (4, 2));
    assert_eq!(loader.last_status().consecutive_failures, 0);
}

#[test]
fn test_dangling_and_invalid_records_are_reported() {
    let memory = MemoryLineageStore::with_records(
        [node("A"), node("B"), AssetNode::new("bad", "table", "bad").with_importance(3.0)],
        [
            edge("ab", "A", "B"),
            edge("ax", "A", "X"),
            edge("loop", "A", "A"),
        ],
    );
    let (snapshot, report) = build_snapshot(&memory).expect("load");
    assert_eq!(snapshot.node_count(), 2);
    assert_eq!(snapshot.edge_count(), 1);
    assert_eq!(report.skipped_nodes.len(), 1);
    assert_eq!(report.skipped_nodes[0].id, "bad");
    let skipped: Vec<&str> = report.skipped_edges.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(skipped, vec!["ax", "loop"]);
    assert!(!report.is_clean());
}

#[test]
fn test_orphans_are_loaded_and_reported() {
    let memory = MemoryLineageStore::with_records(
        [node("A"), node("col").with_parent("missing")],
        Vec::new(),
    );
    let (snapshot, report) = build_snapshot(&memory).expect("load");
    assert!(snapshot.contains_node("col"));
    assert_eq!(report.orphaned_nodes, vec!["col".to_string()]);
}

#[test]
fn test_refresh_supersedes_live_deltas() {
    let store = GraphStore::new();
    let loader = GraphLoader::new(source(), LoaderConfig::default());
    loader.refresh(&store).expect("load");
    store
        .apply_delta(&GraphDelta::single(GraphChange::CreateNode(node("live"))))
        .expect("delta");
    assert_eq!(store.size(), (4, 2));

    loader.refresh(&store).expect("reload");
    assert!(!store.get_snapshot().contains_node("live"));
    assert_eq!(store.version(), 4);
}

#[test]
fn test_refresh_if_stale_skips_fresh_graph() {
    let store = GraphStore::new();
    let loader = GraphLoader::new(source(), LoaderConfig::default());
    assert!(loader.refresh_if_stale(&store).expect("first").is_some());
    assert!(loader.refresh_if_stale(&store).expect("second").is_none());

    let eager = GraphLoader::new(
        source(),
        LoaderConfig {
            staleness_secs: 0,
            ..LoaderConfig::default()
        },
    );
    eager.refresh(&store).expect("load");
    assert!(eager.is_stale());
}
