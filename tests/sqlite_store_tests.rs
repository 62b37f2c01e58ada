use lineagegraph::{
    AssetNode, ChangeType, GraphChange, ImpactAnalyzer, ImpactConfig, ImpactRecord, LineageEdge,
    LineageSink, SqliteLineageStore, TraversalConfig, loader::build_snapshot,
    schema::{SCHEMA_VERSION, read_schema_version},
};
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn seeded(store: &SqliteLineageStore) {
    store
        .bulk_insert(
            &[
                AssetNode::new("A", "table", "raw")
                    .with_schema("warehouse", "staging")
                    .with_tag("pii")
                    .with_metadata("owner", json!("data-eng")),
                AssetNode::new("B", "view", "clean").with_importance(0.8),
            ],
            &[LineageEdge::new("ab", "A", "B", "etl")
                .with_confidence(0.75)
                .with_transformation("dbt")],
        )
        .expect("bulk insert");
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lineage.db");
    {
        let store = SqliteLineageStore::open(&path).expect("open");
        seeded(&store);
    }
    let store = SqliteLineageStore::open(&path).expect("reopen");
    assert_eq!(store.counts().expect("counts"), (2, 1));

    let (snapshot, report) = build_snapshot(&store).expect("load");
    assert!(report.is_clean());
    let a = snapshot.node("A").expect("A");
    assert_eq!(a.schema_name.as_deref(), Some("staging"));
    assert!(a.tags.contains("pii"));
    assert_eq!(a.metadata["owner"], json!("data-eng"));
    let ab = snapshot.edge("ab").expect("ab");
    assert_eq!(ab.confidence, 0.75);
    assert_eq!(ab.transformation_type.as_deref(), Some("dbt"));
}

#[test]
fn test_schema_version_is_recorded() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lineage.db");
    SqliteLineageStore::open(&path).expect("open");
    let conn = Connection::open(&path).expect("raw open");
    assert_eq!(read_schema_version(&conn).expect("version"), SCHEMA_VERSION);
}

#[test]
fn test_unknown_schema_version_is_refused() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lineage.db");
    SqliteLineageStore::open(&path).expect("open");
    {
        let conn = Connection::open(&path).expect("raw open");
        conn.execute(
            "UPDATE lineage_meta SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .expect("update");
    }
    assert!(SqliteLineageStore::open(&path).is_err());
}

#[test]
fn test_persist_changes_applies_in_one_transaction() {
    let store = SqliteLineageStore::open_in_memory().expect("open");
    seeded(&store);
    store
        .persist_changes(&[
            GraphChange::CreateNode(AssetNode::new("C", "report", "kpis")),
            GraphChange::CreateEdge(LineageEdge::new("bc", "B", "C", "etl")),
            GraphChange::DeleteEdge("ab".into()),
            GraphChange::DeleteNode("A".into()),
        ])
        .expect("persist");
    assert_eq!(store.counts().expect("counts"), (2, 1));
    assert!(store.delete_edge("bc").expect("delete"));
    assert!(!store.delete_edge("bc").expect("delete again"));
}

#[test]
fn test_impact_history_round_trips() {
    let store = SqliteLineageStore::open_in_memory().expect("open");
    seeded(&store);
    let (snapshot, _) = build_snapshot(&store).expect("load");
    let analyzer = ImpactAnalyzer::new(ImpactConfig::default(), TraversalConfig::default());
    let result = analyzer
        .analyze_impact(&snapshot, "A", ChangeType::SchemaChange, true)
        .expect("impact");
    let record = ImpactRecord::from_result(&result);
    store.persist_impact_analysis(&record).expect("persist");

    let history = store.impact_history(Some("A")).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].source_asset, "A");
    assert_eq!(history[0].change_type, ChangeType::SchemaChange);
    assert_eq!(history[0].impacted_count, record.impacted_count);
    assert_eq!(history[0].critical_path, vec!["A", "B"]);
    assert!(store.impact_history(Some("B")).expect("history").is_empty());
    assert_eq!(store.impact_history(None).expect("history").len(), 1);
}
