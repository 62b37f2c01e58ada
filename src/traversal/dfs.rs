use ahash::AHashMap;

use super::{Ctx, Walk};
use crate::{
    graph::snapshot::{EdgeIdx, NodeIdx},
    query::TruncationReason,
};

struct Pending {
    node: NodeIdx,
    depth: u32,
    via: Option<EdgeIdx>,
}

/// Iterative depth-first search. A node is expanded again when it is reached
/// at a shallower depth, so everything within `max_depth` is covered even if
/// the first route to it was long.
pub(super) fn run(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let mut walk = Walk::default();
    let mut expanded_at: AHashMap<NodeIdx, u32> = AHashMap::new();
    let mut stack = vec![Pending {
        node: root,
        depth: 0,
        via: None,
    }];
    let mut hops = Vec::new();

    while let Some(Pending { node, depth, via }) = stack.pop() {
        if expanded_at.get(&node).is_some_and(|&seen| seen <= depth) {
            if let Some(edge) = via {
                walk.add_edge(edge);
            }
            continue;
        }
        if !walk.contains(node) && walk.node_count() >= ctx.config.max_nodes {
            walk.truncate(TruncationReason::NodeLimit);
            break;
        }
        expanded_at.insert(node, depth);
        walk.add_node(node, depth);
        if let Some(edge) = via {
            walk.add_edge(edge);
        }
        if depth >= ctx.max_depth {
            continue;
        }
        if ctx.expired() {
            walk.truncate(TruncationReason::Deadline);
            break;
        }
        ctx.hops_into(node, &mut hops);
        // reversed so the preferred hop is popped first
        for hop in hops.iter().rev() {
            stack.push(Pending {
                node: hop.neighbor,
                depth: depth + 1,
                via: Some(hop.edge),
            });
        }
    }
    walk
}
