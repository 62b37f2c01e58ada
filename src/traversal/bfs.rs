use std::collections::VecDeque;

use ahash::AHashMap;

use super::{Ctx, Walk};
use crate::{
    graph::snapshot::{EdgeIdx, NodeIdx},
    query::TruncationReason,
};

/// Level-order exploration shared by the BFS, shortest-path and
/// critical-path strategies.
pub(crate) struct BfsTree {
    /// Nodes in discovery order, root first.
    pub order: Vec<NodeIdx>,
    pub depth: AHashMap<NodeIdx, u32>,
    /// First-discovery parent of every non-root node.
    pub parent: AHashMap<NodeIdx, (NodeIdx, EdgeIdx)>,
    /// Every edge followed, including those reaching already-seen nodes.
    pub followed: Vec<EdgeIdx>,
    pub truncated: Option<TruncationReason>,
}

impl BfsTree {
    /// Node and edge sequence from the root to `target`.
    pub fn path_to(&self, target: NodeIdx) -> Option<(Vec<NodeIdx>, Vec<EdgeIdx>)> {
        if !self.depth.contains_key(&target) {
            return None;
        }
        let mut nodes = vec![target];
        let mut edges = Vec::new();
        let mut current = target;
        while let Some(&(parent, edge)) = self.parent.get(&current) {
            nodes.push(parent);
            edges.push(edge);
            current = parent;
        }
        nodes.reverse();
        edges.reverse();
        Some((nodes, edges))
    }
}

pub(crate) fn explore(ctx: &Ctx<'_>, root: NodeIdx, node_cap: usize, cap_reason: TruncationReason) -> BfsTree {
    let mut tree = BfsTree {
        order: vec![root],
        depth: AHashMap::from_iter([(root, 0)]),
        parent: AHashMap::new(),
        followed: Vec::new(),
        truncated: None,
    };
    let mut queue = VecDeque::from([(root, 0u32)]);
    let mut hops = Vec::new();

    'levels: while let Some((node, depth)) = queue.pop_front() {
        if depth >= ctx.max_depth {
            continue;
        }
        if ctx.expired() {
            tree.truncated = Some(TruncationReason::Deadline);
            break;
        }
        ctx.hops_into(node, &mut hops);
        for hop in &hops {
            if tree.depth.contains_key(&hop.neighbor) {
                tree.followed.push(hop.edge);
                continue;
            }
            if tree.order.len() >= node_cap {
                tree.truncated = Some(cap_reason);
                break 'levels;
            }
            tree.depth.insert(hop.neighbor, depth + 1);
            tree.parent.insert(hop.neighbor, (node, hop.edge));
            tree.order.push(hop.neighbor);
            tree.followed.push(hop.edge);
            queue.push_back((hop.neighbor, depth + 1));
        }
    }
    tree
}

pub(super) fn run(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let tree = explore(ctx, root, ctx.config.max_nodes, TruncationReason::NodeLimit);
    let mut walk = Walk::default();
    for &idx in &tree.order {
        walk.add_node(idx, tree.depth[&idx]);
    }
    for &edge in &tree.followed {
        walk.add_edge(edge);
    }
    walk.truncated = tree.truncated;
    walk
}
