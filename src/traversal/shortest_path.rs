use std::{cmp::Ordering, collections::BinaryHeap};

use ahash::{AHashMap, AHashSet};

use super::{Ctx, Walk, bfs};
use crate::{
    graph::snapshot::{EdgeIdx, NodeIdx},
    query::{PathWeighting, TruncationReason},
};

pub(super) fn run(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    match ctx.weighting {
        PathWeighting::Hops => by_hops(ctx, root),
        PathWeighting::Certainty => by_certainty(ctx, root),
    }
}

/// Unweighted: the BFS parent tree is a shortest-path tree.
fn by_hops(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let tree = bfs::explore(ctx, root, ctx.config.max_nodes, TruncationReason::NodeLimit);
    let mut walk = Walk::default();
    for &idx in &tree.order {
        walk.add_node(idx, tree.depth[&idx]);
        if let Some(&(_, edge)) = tree.parent.get(&idx) {
            walk.add_edge(edge);
        }
    }
    walk.truncated = tree.truncated;
    walk
}

struct Frontier<'a> {
    cost: f64,
    hops: u32,
    node_id: &'a str,
    node: NodeIdx,
}

impl PartialEq for Frontier<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier<'_> {}

impl PartialOrd for Frontier<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier<'_> {
    // BinaryHeap is a max-heap; reverse so the cheapest entry pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node_id.cmp(self.node_id))
    }
}

/// Dijkstra on `1 - confidence`, never relaxing past `max_depth` hops. The hop
/// bound makes this an approximation: a cheaper route longer than the bound is
/// never considered, and a node settles on the cheapest route found within it.
fn by_certainty(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let mut best: AHashMap<NodeIdx, (f64, u32)> = AHashMap::from_iter([(root, (0.0, 0))]);
    let mut parent: AHashMap<NodeIdx, (NodeIdx, EdgeIdx)> = AHashMap::new();
    let mut settled: Vec<NodeIdx> = Vec::new();
    let mut done: AHashSet<NodeIdx> = AHashSet::new();
    let mut walk = Walk::default();
    let mut heap = BinaryHeap::from([Frontier {
        cost: 0.0,
        hops: 0,
        node_id: ctx.node_id(root),
        node: root,
    }]);
    let mut hops = Vec::new();

    while let Some(entry) = heap.pop() {
        let Some(&(cost, depth)) = best.get(&entry.node) else {
            continue;
        };
        if entry.cost > cost || done.contains(&entry.node) {
            continue;
        }
        if settled.len() >= ctx.config.max_nodes {
            walk.truncate(TruncationReason::NodeLimit);
            break;
        }
        settled.push(entry.node);
        done.insert(entry.node);
        if depth >= ctx.max_depth {
            continue;
        }
        if ctx.expired() {
            walk.truncate(TruncationReason::Deadline);
            break;
        }
        ctx.hops_into(entry.node, &mut hops);
        for hop in &hops {
            let next_cost = cost + (1.0 - hop.confidence);
            let improves = best
                .get(&hop.neighbor)
                .is_none_or(|&(known, _)| next_cost < known);
            if improves && !done.contains(&hop.neighbor) {
                best.insert(hop.neighbor, (next_cost, depth + 1));
                parent.insert(hop.neighbor, (entry.node, hop.edge));
                heap.push(Frontier {
                    cost: next_cost,
                    hops: depth + 1,
                    node_id: ctx.node_id(hop.neighbor),
                    node: hop.neighbor,
                });
            }
        }
    }

    for &idx in &settled {
        walk.add_node(idx, best[&idx].1);
        if let Some(&(_, edge)) = parent.get(&idx) {
            walk.add_edge(edge);
        }
    }
    walk
}
