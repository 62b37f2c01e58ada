use std::io::BufReader;

use lineagegraph::{
    AssetNode, GraphLoader, GraphSnapshot, GraphStore, JsonlSource, LineageEdge, LoaderConfig,
    MemoryLineageStore, dump_snapshot_to_path, dump_snapshot_to_writer,
    export::read_records,
    loader::build_snapshot,
    synthetic::{LineageShape, generate_lineage},
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_export_then_reload_reproduces_graph() {
    let data = generate_lineage(LineageShape::LayeredDag { width: 8 }, 200, 42);
    let original = data.to_snapshot().expect("snapshot");

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lineage.jsonl");
    let summary = dump_snapshot_to_path(&original, &path).expect("dump");
    assert_eq!(summary.nodes, 200);
    assert_eq!(summary.edges, original.edge_count());

    let (reloaded, report) = build_snapshot(&JsonlSource::new(&path)).expect("reload");
    assert!(report.is_clean());
    assert_eq!(reloaded.nodes(), original.nodes());
    assert_eq!(reloaded.edges(), original.edges());
}

#[test]
fn test_dump_is_byte_stable() {
    let data = generate_lineage(LineageShape::RandomDag { parents: 2 }, 50, 9);
    let snapshot = data.to_snapshot().expect("snapshot");
    let mut first = Vec::new();
    let mut second = Vec::new();
    dump_snapshot_to_writer(&snapshot, &mut first).expect("dump");
    dump_snapshot_to_writer(&snapshot, &mut second).expect("dump");
    assert_eq!(first, second);
}

#[test]
fn test_metadata_and_tags_survive_export() {
    let memory = MemoryLineageStore::with_records(
        [
            AssetNode::new("orders", "table", "orders")
                .with_tag("finance")
                .with_metadata("rows", json!(1200)),
            AssetNode::new("kpi", "dashboard", "kpi"),
        ],
        [LineageEdge::new("e", "orders", "kpi", "select").with_metadata("sql", json!("select 1"))],
    );
    let (snapshot, _) = build_snapshot(&memory).expect("load");
    let mut buffer = Vec::new();
    dump_snapshot_to_writer(&snapshot, &mut buffer).expect("dump");

    let (nodes, edges) = read_records(BufReader::new(buffer.as_slice())).expect("read");
    assert_eq!(nodes.len(), 2);
    let orders = nodes.iter().find(|n| n.node_id == "orders").expect("orders");
    assert!(orders.tags.contains("finance"));
    assert_eq!(orders.metadata["rows"], json!(1200));
    assert_eq!(edges[0].metadata["sql"], json!("select 1"));
}

#[test]
fn test_jsonl_source_feeds_the_loader() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("seed.jsonl");
    std::fs::write(
        &path,
        concat!(
            "{\"type\":\"node\",\"node_id\":\"A\",\"asset_type\":\"table\",\"asset_name\":\"a\"}\n",
            "{\"type\":\"edge\",\"edge_id\":\"ab\",\"source_node_id\":\"A\",\"target_node_id\":\"B\",\"lineage_type\":\"etl\"}\n",
            "\n",
            "{\"type\":\"node\",\"node_id\":\"B\",\"asset_type\":\"view\",\"asset_name\":\"b\"}\n",
        ),
    )
    .expect("write");

    let store = GraphStore::new();
    let loader = GraphLoader::new(Arc::new(JsonlSource::new(&path)), LoaderConfig::default());
    loader.refresh(&store).expect("refresh");
    assert_eq!(store.size(), (2, 1));
    let b = store.get_snapshot().node("B").cloned().expect("B");
    assert_eq!(b.business_importance, 0.5);
}

#[test]
fn test_missing_file_is_a_load_error() {
    let source = JsonlSource::new("/definitely/not/here.jsonl");
    assert!(build_snapshot(&source).is_err());
}

proptest! {
    #[test]
    fn prop_dump_preserves_float_bits(
        importances in prop::collection::vec(0.0f64..=1.0, 2..40),
        confidence in 0.0f64..=1.0,
    ) {
        let nodes: Vec<AssetNode> = importances
            .iter()
            .enumerate()
            .map(|(i, &importance)| AssetNode::new(format!("n{i:03}"), "table", "t").with_importance(importance))
            .collect();
        let edges = vec![LineageEdge::new("e", "n000", "n001", "etl").with_confidence(confidence)];
        let snapshot = GraphSnapshot::from_records(nodes, edges).expect("snapshot");

        let mut buffer = Vec::new();
        dump_snapshot_to_writer(&snapshot, &mut buffer).expect("dump");
        let (reloaded_nodes, reloaded_edges) = read_records(BufReader::new(buffer.as_slice())).expect("read");

        prop_assert_eq!(reloaded_nodes.len(), importances.len());
        for (i, node) in reloaded_nodes.iter().enumerate() {
            prop_assert_eq!(node.business_importance.to_bits(), importances[i].to_bits());
        }
        prop_assert_eq!(reloaded_edges[0].confidence.to_bits(), confidence.to_bits());
    }
}
