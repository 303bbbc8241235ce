//! Task dependency graph.
//!
//! [`TaskGraph`] wraps [`DirectedGraph`] with task-name keys: domain code adds
//! dependencies between names, algorithms run on `NodeId`s, and results map
//! back to names automatically. The synthesis driver builds one from the
//! `Before` constraints and hands it to the loop extractor.

use std::collections::HashMap;

use crate::constraint::{ConstraintSet, Relation};
use crate::graph::{algorithms, DirectedGraph, NodeId};
use crate::Result;

/// A directed graph over task names.
///
/// Node insertion is idempotent and duplicate edges are suppressed, so a
/// constraint set can be poured in without pre-filtering.
///
/// # Examples
///
/// ```rust
/// use flowforge::graph::TaskGraph;
///
/// let mut graph = TaskGraph::new();
/// graph.add_dependency("A", "B").unwrap();
/// graph.add_dependency("B", "C").unwrap();
/// graph.add_dependency("C", "A").unwrap(); // cycle
///
/// assert!(graph.find_cycle_from("A").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    /// Underlying graph; node data is the task name
    graph: DirectedGraph<String, ()>,
    /// Name -> node id
    name_to_node: HashMap<String, NodeId>,
}

impl TaskGraph {
    /// Creates an empty task graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the dependency graph of a constraint set: one node per task
    /// name, one edge per `Before` constraint.
    ///
    /// `Parallel` and `Exclusive` constraints contribute their task names as
    /// isolated nodes but no edges.
    #[must_use]
    pub fn from_constraints(constraints: &ConstraintSet) -> Self {
        let mut graph = Self::new();
        for name in constraints.task_names() {
            graph.add_task(&name);
        }
        for constraint in constraints.iter() {
            if constraint.relation() == Relation::Before {
                graph
                    .add_dependency(constraint.left(), constraint.right())
                    .expect("nodes were just added");
            }
        }
        graph
    }

    /// Adds a task node, or returns the existing id for the name.
    pub fn add_task(&mut self, name: &str) -> NodeId {
        if let Some(&node) = self.name_to_node.get(name) {
            return node;
        }
        let node = self.graph.add_node(name.to_string());
        self.name_to_node.insert(name.to_string(), node);
        node
    }

    /// Adds a dependency edge `from -> to`, creating missing nodes.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if a new edge was added, `Ok(false)` if it already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying edge insertion fails.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<bool> {
        let source = self.add_task(from);
        let target = self.add_task(to);
        if self.graph.successors(source).any(|succ| succ == target) {
            return Ok(false);
        }
        self.graph.add_edge(source, target, ())?;
        Ok(true)
    }

    /// Returns the node id for a task name.
    #[must_use]
    pub fn node_of(&self, name: &str) -> Option<NodeId> {
        self.name_to_node.get(name).copied()
    }

    /// Returns the task name of a node id.
    #[must_use]
    pub fn name_of(&self, node: NodeId) -> Option<&str> {
        self.graph.node(node).map(String::as_str)
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of dependency edges.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns `true` if the graph holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Returns the underlying `DirectedGraph` for algorithm use.
    #[must_use]
    pub fn inner(&self) -> &DirectedGraph<String, ()> {
        &self.graph
    }

    /// Maps node ids back to task names, skipping unknown ids.
    #[must_use]
    pub fn names(&self, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .filter_map(|&node| self.graph.node(node).cloned())
            .collect()
    }

    /// Finds one cycle through the given task, as names.
    #[must_use]
    pub fn find_cycle_from(&self, name: &str) -> Option<Vec<String>> {
        let start = self.node_of(name)?;
        let cycle = algorithms::find_cycle(&self.graph, start)?;
        Some(self.names(&cycle))
    }

    /// Computes the strongly connected components, as name groups, in reverse
    /// topological order.
    #[must_use]
    pub fn strongly_connected_components(&self) -> Vec<Vec<String>> {
        algorithms::strongly_connected_components(&self.graph)
            .iter()
            .map(|scc| self.names(scc))
            .collect()
    }

    /// Computes a topological ordering of the task names.
    ///
    /// # Returns
    ///
    /// `Some(order)` for an acyclic graph, `None` when cycles remain.
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let order = algorithms::topological_sort(&self.graph)?;
        Some(self.names(&order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;

    #[test]
    fn test_idempotent_task_insertion() {
        let mut graph = TaskGraph::new();
        let first = graph.add_task("A");
        let second = graph.add_task("A");
        assert_eq!(first, second);
        assert_eq!(graph.task_count(), 1);
    }

    #[test]
    fn test_duplicate_edges_suppressed() {
        let mut graph = TaskGraph::new();
        assert!(graph.add_dependency("A", "B").unwrap());
        assert!(!graph.add_dependency("A", "B").unwrap());
        assert_eq!(graph.dependency_count(), 1);
    }

    #[test]
    fn test_name_mapping_roundtrip() {
        let mut graph = TaskGraph::new();
        let a = graph.add_task("A");
        assert_eq!(graph.node_of("A"), Some(a));
        assert_eq!(graph.name_of(a), Some("A"));
        assert_eq!(graph.node_of("missing"), None);
    }

    #[test]
    fn test_from_constraints() {
        let constraints: ConstraintSet = [
            Constraint::new(Relation::Before, "A", "B"),
            Constraint::new(Relation::Before, "B", "C"),
            Constraint::new(Relation::Parallel, "C", "D"),
        ]
        .into_iter()
        .collect();

        let graph = TaskGraph::from_constraints(&constraints);
        assert_eq!(graph.task_count(), 4);
        // only Before constraints create edges
        assert_eq!(graph.dependency_count(), 2);
    }

    #[test]
    fn test_cycle_through_names() {
        let mut graph = TaskGraph::new();
        graph.add_dependency("A", "B").unwrap();
        graph.add_dependency("B", "C").unwrap();
        graph.add_dependency("C", "A").unwrap();

        let cycle = graph.find_cycle_from("A").unwrap();
        assert_eq!(cycle, vec!["A", "B", "C"]);
        assert!(graph.find_cycle_from("missing").is_none());
    }

    #[test]
    fn test_sccs_as_names() {
        let mut graph = TaskGraph::new();
        graph.add_dependency("A", "B").unwrap();
        graph.add_dependency("B", "A").unwrap();
        graph.add_dependency("B", "C").unwrap();

        let sccs = graph.strongly_connected_components();
        assert_eq!(sccs.len(), 2);
        let mut sizes: Vec<usize> = sccs.iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_topological_order() {
        let mut graph = TaskGraph::new();
        graph.add_dependency("A", "B").unwrap();
        graph.add_dependency("A", "C").unwrap();
        graph.add_dependency("B", "D").unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|x| x == name).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("D"));

        graph.add_dependency("D", "A").unwrap();
        assert!(graph.topological_order().is_none());
    }
}
