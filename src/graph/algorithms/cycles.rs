//! Cycle detection and reachability.
//!
//! Building blocks for the loop extractor: finding a node that can reach
//! itself, recovering one concrete cycle through it, and computing forward and
//! backward reachability sets.

use std::collections::HashSet;

use crate::graph::{
    traits::{Predecessors, Successors},
    NodeId,
};

/// DFS coloring for cycle search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Finds one cycle reachable from `start`.
///
/// # Returns
///
/// The cycle's nodes in path order, starting at the node the back edge closes
/// on, or `None` if no cycle is reachable from `start`.
///
/// # Examples
///
/// ```rust
/// use flowforge::graph::{algorithms::find_cycle, DirectedGraph};
///
/// let mut graph: DirectedGraph<char, ()> = DirectedGraph::new();
/// let a = graph.add_node('A');
/// let b = graph.add_node('B');
/// let c = graph.add_node('C');
/// graph.add_edge(a, b, ()).unwrap();
/// graph.add_edge(b, c, ()).unwrap();
/// graph.add_edge(c, a, ()).unwrap();
///
/// let cycle = find_cycle(&graph, a).unwrap();
/// assert_eq!(cycle, vec![a, b, c]);
/// ```
#[must_use]
pub fn find_cycle<G: Successors>(graph: &G, start: NodeId) -> Option<Vec<NodeId>> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return None;
    }
    let mut color = vec![Color::White; node_count];
    let mut path: Vec<NodeId> = vec![start];
    // frame: (node, successors, next successor position)
    let mut frames: Vec<(NodeId, Vec<NodeId>, usize)> =
        vec![(start, graph.successors(start).collect(), 0)];
    color[start.index()] = Color::Gray;

    while let Some(frame) = frames.last_mut() {
        if frame.2 < frame.1.len() {
            let next = frame.1[frame.2];
            frame.2 += 1;
            match color[next.index()] {
                Color::White => {
                    color[next.index()] = Color::Gray;
                    path.push(next);
                    frames.push((next, graph.successors(next).collect(), 0));
                }
                Color::Gray => {
                    let position = path
                        .iter()
                        .position(|&node| node == next)
                        .expect("gray nodes are on the current path");
                    return Some(path[position..].to_vec());
                }
                Color::Black => {}
            }
        } else {
            color[frame.0.index()] = Color::Black;
            path.pop();
            frames.pop();
        }
    }
    None
}

/// Returns `true` if any cycle is reachable from `start`.
#[must_use]
pub fn has_cycle<G: Successors>(graph: &G, start: NodeId) -> bool {
    find_cycle(graph, start).is_some()
}

/// Returns the set of nodes reachable from `start` by following edges
/// forward, `start` included.
#[must_use]
pub fn reachable_from<G: Successors>(graph: &G, start: NodeId) -> HashSet<NodeId> {
    walk(graph.node_count(), start, |node| {
        graph.successors(node).collect()
    })
}

/// Returns the set of nodes that can reach `target` by following edges
/// forward, `target` included.
#[must_use]
pub fn reaching<G: Predecessors>(graph: &G, target: NodeId) -> HashSet<NodeId> {
    walk(graph.node_count(), target, |node| {
        graph.predecessors(node).collect()
    })
}

/// Shared worklist walk over a neighbor function.
fn walk<F>(node_count: usize, start: NodeId, neighbors: F) -> HashSet<NodeId>
where
    F: Fn(NodeId) -> Vec<NodeId>,
{
    let mut seen = HashSet::new();
    if start.index() >= node_count {
        return seen;
    }
    let mut stack = vec![start];
    seen.insert(start);
    while let Some(node) = stack.pop() {
        for next in neighbors(node) {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen
}
