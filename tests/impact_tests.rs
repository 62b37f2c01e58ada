use lineagegraph::{
    AssetNode, ChangeType, GraphSnapshot, ImpactAnalyzer, ImpactConfig, ImpactLevel,
    ImpactRequest, LineageEdge, TraversalConfig,
};

fn analyzer() -> ImpactAnalyzer {
    ImpactAnalyzer::new(ImpactConfig::default(), TraversalConfig::default())
}

fn abc() -> GraphSnapshot {
    GraphSnapshot::from_records(
        [
            AssetNode::new("A", "table", "raw_orders"),
            AssetNode::new("B", "table", "orders").with_importance(0.9),
            AssetNode::new("C", "table", "orders_archive").with_importance(0.2),
        ],
        [
            LineageEdge::new("ab", "A", "B", "etl"),
            LineageEdge::new("bc", "B", "C", "etl"),
        ],
    )
    .expect("snapshot")
}

#[test]
fn test_deletion_ranks_important_asset_first() {
    let result = analyzer()
        .analyze_impact(&abc(), "A", ChangeType::Deletion, true)
        .expect("impact");

    let ids: Vec<&str> = result
        .impacted_assets
        .iter()
        .map(|asset| asset.node_id.as_str())
        .collect();
    assert_eq!(ids, vec!["B", "C"]);
    assert!(result.impacted_assets[0].impact_score > result.impacted_assets[1].impact_score);
    assert_eq!(result.critical_path, vec!["A", "B"]);
    assert!(result.source_found);
}

#[test]
fn test_scores_follow_documented_formula() {
    let result = analyzer()
        .analyze_impact(&abc(), "A", ChangeType::Deletion, false)
        .expect("impact");
    let b = &result.impacted_assets[0];
    let c = &result.impacted_assets[1];
    // (0.5 + 0.2 + 0.3) * (0.5 + 0.45)
    assert!((b.impact_score - 0.95).abs() < 1e-9);
    // (0.5 + 0.2 + 0.3) * (0.5 + 0.1)
    assert!((c.impact_score - 0.6).abs() < 1e-9);
    assert_eq!(b.impact_level, ImpactLevel::Critical);
    assert!((result.overall_impact_score - 0.775).abs() < 1e-9);
    assert_eq!(result.overall_impact_level, ImpactLevel::High);
    assert!(result.recommended_actions.is_empty());
}

#[test]
fn test_leaf_has_no_impact() {
    let result = analyzer()
        .analyze(&abc(), &ImpactRequest::new("C", ChangeType::SchemaChange))
        .expect("impact");
    assert!(result.impacted_assets.is_empty());
    assert_eq!(result.overall_impact_score, 0.0);
    assert_eq!(result.overall_impact_level, ImpactLevel::Minimal);
    assert!(result.critical_path.is_empty());
    assert_eq!(result.recommended_actions.len(), 1);
}

#[test]
fn test_missing_source_gives_not_found_recommendation() {
    let result = analyzer()
        .analyze(&abc(), &ImpactRequest::new("ghost", ChangeType::Deletion))
        .expect("impact");
    assert!(!result.source_found);
    assert_eq!(result.recommended_actions.len(), 1);
    assert!(result.recommended_actions[0].contains("not found"));
}

#[test]
fn test_breaking_change_recommendations() {
    let snapshot = GraphSnapshot::from_records(
        [
            AssetNode::new("src", "table", "src"),
            AssetNode::new("dash", "dashboard", "exec").with_importance(1.0),
        ],
        [LineageEdge::new("e", "src", "dash", "etl")],
    )
    .expect("snapshot");
    let result = analyzer()
        .analyze(&snapshot, &ImpactRequest::new("src", ChangeType::Deletion))
        .expect("impact");
    assert_eq!(result.count_at(ImpactLevel::Critical), 1);
    let actions = result.recommended_actions.join("\n");
    assert!(actions.contains("critically impacted"));
    assert!(actions.contains("reports and dashboards"));
    assert!(actions.contains("deleting"));
}

#[test]
fn test_request_depth_override_limits_reach() {
    let result = analyzer()
        .analyze(
            &abc(),
            &ImpactRequest::new("A", ChangeType::DataUpdate).max_depth(1),
        )
        .expect("impact");
    assert_eq!(result.impacted_assets.len(), 1);
    assert_eq!(result.impacted_assets[0].node_id, "B");
}
