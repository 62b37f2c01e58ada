use ahash::AHashMap;

use super::{Ctx, Walk, bfs, centrality::compute_centrality};
use crate::{
    graph::snapshot::NodeIdx,
    query::{NodeRanking, TruncationReason},
};

/// Ranks the BFS region around the root by a blend of business importance
/// and centrality, then returns the shortest paths to the top-ranked nodes.
pub(super) fn run(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let config = ctx.config;
    let (limit, reason) = if config.centrality_node_limit < config.max_nodes {
        (config.centrality_node_limit, TruncationReason::CentralityLimit)
    } else {
        (config.max_nodes, TruncationReason::NodeLimit)
    };
    let tree = bfs::explore(ctx, root, limit, reason);
    let region = &tree.order;

    let local: AHashMap<NodeIdx, usize> = region
        .iter()
        .enumerate()
        .map(|(position, &idx)| (idx, position))
        .collect();
    let mut hops = Vec::new();
    let adjacency: Vec<Vec<usize>> = region
        .iter()
        .map(|&idx| {
            ctx.hops_into(idx, &mut hops);
            let mut targets: Vec<usize> = hops
                .iter()
                .filter_map(|hop| local.get(&hop.neighbor).copied())
                .collect();
            targets.sort_unstable();
            targets.dedup();
            targets
        })
        .collect();

    let mut walk = Walk::default();
    walk.truncated = tree.truncated;
    let scores = if ctx.expired() {
        walk.truncate(TruncationReason::Deadline);
        None
    } else {
        Some(compute_centrality(&adjacency))
    };

    let weight_total = config.business_weight + config.centrality_weight;
    let mut ranked: Vec<(NodeIdx, NodeRanking)> = region
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(position, &idx)| {
            let node = ctx.snapshot.node_at(idx)?;
            let (betweenness, closeness) = scores
                .as_ref()
                .map(|s| (s.betweenness[position], s.closeness[position]))
                .unwrap_or((0.0, 0.0));
            let centrality = (betweenness + closeness) / 2.0;
            let score = (config.business_weight * node.business_importance
                + config.centrality_weight * centrality)
                / weight_total;
            Some((
                idx,
                NodeRanking {
                    node_id: node.node_id.clone(),
                    score,
                    business_importance: node.business_importance,
                    betweenness,
                    closeness,
                },
            ))
        })
        .collect();
    ranked.sort_by(|(_, a), (_, b)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });

    walk.add_node(root, 0);
    for (idx, _) in ranked.iter().take(config.critical_top_n) {
        let Some((nodes, edges)) = tree.path_to(*idx) else {
            continue;
        };
        for &node in &nodes {
            walk.add_node(node, tree.depth[&node]);
        }
        for &edge in &edges {
            walk.add_edge(edge);
        }
        walk.paths.push(ctx.path_from(&nodes, &edges));
    }
    walk.rankings = ranked.into_iter().map(|(_, ranking)| ranking).collect();
    walk.region = tree.order;
    walk
}
