//! Core directed graph implementation.
//!
//! [`DirectedGraph`] is the arena-indexed graph behind the task dependency
//! graph and the generated flow graph. Nodes and edges carry typed data; both
//! adjacency directions are kept as edge-id lists so forward and backward
//! traversal are equally cheap.

use crate::graph::{
    traits::{GraphBase, Predecessors, Successors},
    EdgeId, NodeId,
};
use crate::{Error, Result};

/// Internal storage for edge data and endpoints.
#[derive(Debug, Clone)]
struct EdgeData<E> {
    /// Source node of the edge
    source: NodeId,
    /// Target node of the edge
    target: NodeId,
    /// User-provided edge data
    data: E,
}

/// A directed graph with typed node and edge data.
///
/// Multiple edges between the same pair of nodes are allowed; deduplication,
/// where wanted, is the caller's concern (see
/// [`TaskGraph`](crate::graph::TaskGraph)).
///
/// # Examples
///
/// ```rust
/// use flowforge::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// let c = graph.add_node("C");
///
/// graph.add_edge(a, b, ()).unwrap();
/// graph.add_edge(a, c, ()).unwrap();
///
/// assert_eq!(graph.node_count(), 3);
/// assert_eq!(graph.successors(a).count(), 2);
/// assert_eq!(graph.predecessors(b).collect::<Vec<_>>(), vec![a]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectedGraph<N, E> {
    /// Node data, indexed by `NodeId`
    nodes: Vec<N>,
    /// Edge data, indexed by `EdgeId`
    edges: Vec<EdgeData<E>>,
    /// Outgoing edge ids per node
    outgoing: Vec<Vec<EdgeId>>,
    /// Incoming edge ids per node
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates a new graph with pre-allocated node and edge capacity.
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node; returns its sequentially assigned id.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds a directed edge; returns its sequentially assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        if source.index() >= self.nodes.len() {
            return Err(Error::GraphError(format!(
                "source node {source} does not exist in graph with {} nodes",
                self.nodes.len()
            )));
        }
        if target.index() >= self.nodes.len() {
            return Err(Error::GraphError(format!(
                "target node {target} does not exist in graph with {} nodes",
                self.nodes.len()
            )));
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(EdgeData {
            source,
            target,
            data,
        });
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        Ok(id)
    }

    /// Returns the data of `node`, if it exists.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index())
    }

    /// Returns the data of `node` mutably, if it exists.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(node.index())
    }

    /// Returns the data of `edge`, if it exists.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges.get(edge.index()).map(|e| &e.data)
    }

    /// Returns `(source, target)` of `edge`, if it exists.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(edge.index()).map(|e| (e.source, e.target))
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `node` addresses an existing node.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    /// Iterates over all node ids, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Iterates over `(id, data)` for every node.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, data)| (NodeId::new(i), data))
    }

    /// Iterates over `(id, data)` for every edge.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &E)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (EdgeId::new(i), &e.data))
    }

    /// Iterates over the successors of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing[node.index()]
            .iter()
            .map(|&edge| self.edges[edge.index()].target)
    }

    /// Iterates over the predecessors of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming[node.index()]
            .iter()
            .map(|&edge| self.edges[edge.index()].source)
    }

    /// Iterates over `(EdgeId, &E)` for edges leaving `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &E)> + '_ {
        self.outgoing[node.index()]
            .iter()
            .map(|&edge| (edge, &self.edges[edge.index()].data))
    }

    /// Iterates over `(EdgeId, &E)` for edges entering `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, &E)> + '_ {
        self.incoming[node.index()]
            .iter()
            .map(|&edge| (edge, &self.edges[edge.index()].data))
    }

    /// Returns the number of edges leaving `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing[node.index()].len()
    }

    /// Returns the number of edges entering `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` does not exist.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming[node.index()].len()
    }

    /// Iterates over the nodes with no incoming edges.
    pub fn entry_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(|&node| self.in_degree(node) == 0)
    }

    /// Iterates over the nodes with no outgoing edges.
    pub fn exit_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(|&node| self.out_degree(node) == 0)
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId::new)
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.outgoing[node.index()]
            .iter()
            .map(|&edge| self.edges[edge.index()].target)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.incoming[node.index()]
            .iter()
            .map(|&edge| self.edges[edge.index()].source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A -> B, A -> C, B -> D, C -> D
    fn diamond() -> DirectedGraph<&'static str, ()> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b, ()).unwrap();
        graph.add_edge(a, c, ()).unwrap();
        graph.add_edge(b, d, ()).unwrap();
        graph.add_edge(c, d, ()).unwrap();
        graph
    }

    #[test]
    fn test_empty_graph() {
        let graph: DirectedGraph<(), ()> = DirectedGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_node_sequential_ids() {
        let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
        assert_eq!(graph.add_node("A"), NodeId::new(0));
        assert_eq!(graph.add_node("B"), NodeId::new(1));
        assert_eq!(graph.node(NodeId::new(0)), Some(&"A"));
        assert_eq!(graph.node(NodeId::new(99)), None);
    }

    #[test]
    fn test_add_edge_and_endpoints() {
        let mut graph: DirectedGraph<(), i32> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        let e = graph.add_edge(a, b, 42).unwrap();
        assert_eq!(graph.edge(e), Some(&42));
        assert_eq!(graph.edge_endpoints(e), Some((a, b)));
    }

    #[test]
    fn test_add_edge_invalid_endpoint() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(graph.add_edge(a, NodeId::new(9), ()).is_err());
        assert!(graph.add_edge(NodeId::new(9), a, ()).is_err());
    }

    #[test]
    fn test_adjacency() {
        let graph = diamond();
        let a = NodeId::new(0);
        let d = NodeId::new(3);

        let successors: Vec<NodeId> = graph.successors(a).collect();
        assert_eq!(successors.len(), 2);
        let predecessors: Vec<NodeId> = graph.predecessors(d).collect();
        assert_eq!(predecessors.len(), 2);

        assert_eq!(graph.out_degree(a), 2);
        assert_eq!(graph.in_degree(a), 0);
        assert_eq!(graph.in_degree(d), 2);
    }

    #[test]
    fn test_entry_and_exit_nodes() {
        let graph = diamond();
        assert_eq!(graph.entry_nodes().collect::<Vec<_>>(), vec![NodeId::new(0)]);
        assert_eq!(graph.exit_nodes().collect::<Vec<_>>(), vec![NodeId::new(3)]);
    }

    #[test]
    fn test_multigraph_edges_allowed() {
        let mut graph: DirectedGraph<(), i32> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, b, 1).unwrap();
        graph.add_edge(a, b, 2).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.out_degree(a), 2);
    }

    #[test]
    fn test_self_loop() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        graph.add_edge(a, a, ()).unwrap();
        assert_eq!(graph.out_degree(a), 1);
        assert_eq!(graph.in_degree(a), 1);
    }

    #[test]
    fn test_trait_object_style_access() {
        fn count<G: GraphBase>(graph: &G) -> usize {
            graph.node_count()
        }
        assert_eq!(count(&diamond()), 4);
    }
}
