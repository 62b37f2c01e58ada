use ahash::AHashSet;

use super::{Ctx, Hop, Walk};
use crate::{
    graph::snapshot::{EdgeIdx, NodeIdx},
    query::TruncationReason,
};

struct Frame {
    hops: Vec<Hop>,
    next: usize,
    extended: bool,
}

/// Enumerates cycle-free paths from the root up to `max_depth` edges with an
/// explicit frame stack. Each maximal path (one that cannot be extended
/// without repeating a node or exceeding the depth) is recorded. Every path
/// extension counts against `max_paths`.
pub(super) fn run(ctx: &Ctx<'_>, root: NodeIdx) -> Walk {
    let mut walk = Walk::default();
    walk.add_node(root, 0);

    let mut path_nodes: Vec<NodeIdx> = vec![root];
    let mut path_edges: Vec<EdgeIdx> = Vec::new();
    let mut on_path: AHashSet<NodeIdx> = AHashSet::from_iter([root]);
    let mut frames = vec![frame_for(ctx, root, 0)];
    let mut explored = 0usize;

    while let Some(frame) = frames.last_mut() {
        if frame.next >= frame.hops.len() {
            let extended = frame.extended;
            frames.pop();
            if !extended && !path_edges.is_empty() {
                walk.paths.push(ctx.path_from(&path_nodes, &path_edges));
            }
            if let Some(node) = path_nodes.pop() {
                on_path.remove(&node);
            }
            path_edges.pop();
            continue;
        }

        let hop = frame.hops[frame.next];
        frame.next += 1;
        if on_path.contains(&hop.neighbor) {
            continue;
        }
        frame.extended = true;

        explored += 1;
        if explored > ctx.config.max_paths {
            walk.truncate(TruncationReason::PathLimit);
            break;
        }
        if !walk.contains(hop.neighbor) && walk.node_count() >= ctx.config.max_nodes {
            walk.truncate(TruncationReason::NodeLimit);
            break;
        }
        if ctx.expired() {
            walk.truncate(TruncationReason::Deadline);
            break;
        }

        let depth = path_edges.len() as u32 + 1;
        walk.add_node(hop.neighbor, depth);
        walk.add_edge(hop.edge);
        path_nodes.push(hop.neighbor);
        path_edges.push(hop.edge);
        on_path.insert(hop.neighbor);
        frames.push(frame_for(ctx, hop.neighbor, depth));
    }

    // keep the partial path in hand when a cap ends the search
    if walk.truncated.is_some() && !path_edges.is_empty() {
        walk.paths.push(ctx.path_from(&path_nodes, &path_edges));
    }
    walk
}

fn frame_for(ctx: &Ctx<'_>, node: NodeIdx, depth: u32) -> Frame {
    let hops = if depth < ctx.max_depth {
        ctx.hops(node)
    } else {
        Vec::new()
    };
    Frame {
        hops,
        next: 0,
        extended: false,
    }
}
