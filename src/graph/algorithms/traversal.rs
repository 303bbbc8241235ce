//! Graph traversal algorithms.
//!
//! Depth-first and breadth-first traversal plus topological ordering. The
//! iterative DFS avoids recursion so deep dependency chains cannot overflow
//! the stack.

use std::collections::VecDeque;

use crate::graph::{traits::Successors, NodeId};

/// Iterative depth-first pre-order iterator.
///
/// Visits each node reachable from the start exactly once, a node before its
/// descendants.
pub struct DfsIterator<'g, G: Successors> {
    graph: &'g G,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<'g, G: Successors> DfsIterator<'g, G> {
    fn new(graph: &'g G, start: NodeId) -> Self {
        let node_count = graph.node_count();
        if start.index() >= node_count {
            return DfsIterator {
                graph,
                stack: Vec::new(),
                visited: Vec::new(),
            };
        }
        let mut visited = vec![false; node_count];
        visited[start.index()] = true;
        DfsIterator {
            graph,
            stack: vec![start],
            visited,
        }
    }
}

impl<G: Successors> Iterator for DfsIterator<'_, G> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // push successors in reverse so they pop in declaration order
        let successors: Vec<NodeId> = self.graph.successors(node).collect();
        for &succ in successors.iter().rev() {
            if !self.visited[succ.index()] {
                self.visited[succ.index()] = true;
                self.stack.push(succ);
            }
        }
        Some(node)
    }
}

/// Returns a depth-first pre-order iterator starting at `start`.
///
/// Nodes unreachable from `start` are not visited; an out-of-range start
/// yields an empty iterator.
///
/// # Examples
///
/// ```rust
/// use flowforge::graph::{algorithms::dfs, DirectedGraph, NodeId};
///
/// let mut graph: DirectedGraph<char, ()> = DirectedGraph::new();
/// let a = graph.add_node('A');
/// let b = graph.add_node('B');
/// let c = graph.add_node('C');
/// graph.add_edge(a, b, ()).unwrap();
/// graph.add_edge(a, c, ()).unwrap();
///
/// let visited: Vec<NodeId> = dfs(&graph, a).collect();
/// assert_eq!(visited.len(), 3);
/// assert_eq!(visited[0], a);
/// ```
pub fn dfs<G: Successors>(graph: &G, start: NodeId) -> DfsIterator<'_, G> {
    DfsIterator::new(graph, start)
}

/// Returns the nodes reachable from `start` in breadth-first order.
#[must_use]
pub fn bfs<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }
    let mut visited = vec![false; node_count];
    visited[start.index()] = true;
    let mut queue = VecDeque::from([start]);
    let mut order = Vec::new();
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for succ in graph.successors(node) {
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                queue.push_back(succ);
            }
        }
    }
    order
}

/// Returns the nodes reachable from `start` in depth-first post-order
/// (a node after all of its descendants).
#[must_use]
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }
    let mut visited = vec![false; node_count];
    visited[start.index()] = true;
    let mut order = Vec::new();
    // frame: (node, successors, next successor index)
    let mut frames: Vec<(NodeId, Vec<NodeId>, usize)> =
        vec![(start, graph.successors(start).collect(), 0)];
    while let Some(frame) = frames.last_mut() {
        if frame.2 < frame.1.len() {
            let next = frame.1[frame.2];
            frame.2 += 1;
            if !visited[next.index()] {
                visited[next.index()] = true;
                frames.push((next, graph.successors(next).collect(), 0));
            }
        } else {
            order.push(frame.0);
            frames.pop();
        }
    }
    order
}

/// Returns the reverse post-order of the nodes reachable from `start`.
#[must_use]
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut order = postorder(graph, start);
    order.reverse();
    order
}

/// Computes a topological ordering of the whole graph.
///
/// # Returns
///
/// `Some(order)` if the graph is acyclic, `None` if it contains a cycle.
#[must_use]
pub fn topological_sort<G: Successors>(graph: &G) -> Option<Vec<NodeId>> {
    let node_count = graph.node_count();
    let mut in_degree = vec![0usize; node_count];
    for node in graph.node_ids() {
        for succ in graph.successors(node) {
            in_degree[succ.index()] += 1;
        }
    }

    let mut queue: VecDeque<NodeId> = graph
        .node_ids()
        .filter(|node| in_degree[node.index()] == 0)
        .collect();
    let mut order = Vec::with_capacity(node_count);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for succ in graph.successors(node) {
            in_degree[succ.index()] -= 1;
            if in_degree[succ.index()] == 0 {
                queue.push_back(succ);
            }
        }
    }

    (order.len() == node_count).then_some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DirectedGraph;

    fn diamond() -> (DirectedGraph<(), ()>, [NodeId; 4]) {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let c = graph.add_node(());
        let d = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(a, c, ()).unwrap();
        graph.add_edge(b, d, ()).unwrap();
        graph.add_edge(c, d, ()).unwrap();
        (graph, [a, b, c, d])
    }

    #[test]
    fn test_dfs_visits_each_once() {
        let (graph, [a, ..]) = diamond();
        let visited: Vec<NodeId> = dfs(&graph, a).collect();
        assert_eq!(visited.len(), 4);
        assert_eq!(visited[0], a);
    }

    #[test]
    fn test_dfs_out_of_range_start() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert_eq!(dfs(&graph, NodeId::new(5)).count(), 0);
    }

    #[test]
    fn test_bfs_level_order() {
        let (graph, [a, b, c, d]) = diamond();
        let order = bfs(&graph, a);
        assert_eq!(order, vec![a, b, c, d]);
    }

    #[test]
    fn test_postorder_children_first() {
        let (graph, [a, _, _, d]) = diamond();
        let order = postorder(&graph, a);
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], d);
        assert_eq!(*order.last().unwrap(), a);
    }

    #[test]
    fn test_reverse_postorder_root_first() {
        let (graph, [a, ..]) = diamond();
        let order = reverse_postorder(&graph, a);
        assert_eq!(order[0], a);
    }

    #[test]
    fn test_topological_sort_respects_edges() {
        let (graph, [a, b, c, d]) = diamond();
        let order = topological_sort(&graph).unwrap();
        let pos = |n: NodeId| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_topological_sort_detects_cycle() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, a, ()).unwrap();
        assert!(topological_sort(&graph).is_none());
    }

    #[test]
    fn test_dfs_with_cycle_terminates() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(b, a, ()).unwrap();
        assert_eq!(dfs(&graph, a).count(), 2);
    }
}
