use std::{collections::HashSet, fmt};

use serde::Serialize;

use crate::graph::snapshot::GraphSnapshot;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Edge ids whose source or target is not in the snapshot.
    pub dangling_edges: Vec<String>,
    /// Edge ids repeating an earlier (source, target, lineage_type) triple.
    pub duplicate_triples: Vec<String>,
    /// Node ids whose `parent_node_id` does not resolve.
    pub orphaned_nodes: Vec<String>,
}

impl IntegrityReport {
    pub fn merge(&mut self, other: &IntegrityReport) {
        self.total_nodes = self.total_nodes.max(other.total_nodes);
        self.total_edges = self.total_edges.max(other.total_edges);
        self.dangling_edges.extend(other.dangling_edges.iter().cloned());
        self.duplicate_triples
            .extend(other.duplicate_triples.iter().cloned());
        self.orphaned_nodes.extend(other.orphaned_nodes.iter().cloned());
    }

    /// Dangling edges and duplicate triples are violations. Orphans are
    /// reported but tolerated.
    pub fn has_issues(&self) -> bool {
        !self.dangling_edges.is_empty() || !self.duplicate_triples.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityError {
    pub report: IntegrityReport,
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "integrity violations detected: {} dangling edges, {} duplicate triples",
            self.report.dangling_edges.len(),
            self.report.duplicate_triples.len()
        )
    }
}

impl std::error::Error for IntegrityError {}

pub fn check_referential_integrity(snapshot: &GraphSnapshot) -> IntegrityReport {
    let mut report = base_report(snapshot);
    report.dangling_edges = snapshot
        .edges()
        .into_iter()
        .filter(|edge| {
            !snapshot.contains_node(&edge.source_node_id) || !snapshot.contains_node(&edge.target_node_id)
        })
        .map(|edge| edge.edge_id.clone())
        .collect();
    report
}

pub fn check_duplicate_triples(snapshot: &GraphSnapshot) -> IntegrityReport {
    let mut report = base_report(snapshot);
    let mut seen = HashSet::new();
    for edge in snapshot.edges() {
        let triple = (
            edge.source_node_id.as_str(),
            edge.target_node_id.as_str(),
            edge.lineage_type.as_str(),
        );
        if !seen.insert(triple) {
            report.duplicate_triples.push(edge.edge_id.clone());
        }
    }
    report
}

pub fn check_containment(snapshot: &GraphSnapshot) -> IntegrityReport {
    let mut report = base_report(snapshot);
    report.orphaned_nodes = snapshot
        .nodes()
        .into_iter()
        .filter(|node| {
            node.parent_node_id
                .as_deref()
                .is_some_and(|parent| !snapshot.contains_node(parent))
        })
        .map(|node| node.node_id.clone())
        .collect();
    report
}

pub fn check_integrity(snapshot: &GraphSnapshot) -> IntegrityReport {
    let mut report = IntegrityReport::default();
    report.merge(&check_referential_integrity(snapshot));
    report.merge(&check_duplicate_triples(snapshot));
    report.merge(&check_containment(snapshot));
    report
}

pub fn run_strict_checks(snapshot: &GraphSnapshot) -> Result<IntegrityReport, IntegrityError> {
    let report = check_integrity(snapshot);
    if report.has_issues() {
        Err(IntegrityError { report })
    } else {
        Ok(report)
    }
}

fn base_report(snapshot: &GraphSnapshot) -> IntegrityReport {
    IntegrityReport {
        total_nodes: snapshot.node_count(),
        total_edges: snapshot.edge_count(),
        ..IntegrityReport::default()
    }
}
