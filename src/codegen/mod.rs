//! Flow-graph generation.
//!
//! The downstream consumer of the pipeline: lowers a finished process tree
//! into a directed flow graph of events, tasks and gateways, by a structural
//! recursion that mirrors the tree shape:
//!
//! - `Task` → a task node
//! - `Sequence` → the children's blocks chained with sequence-flow edges
//! - `Parallel` → a parallel split gateway fanning out to the children and a
//!   join gateway collecting them
//! - `Choice` → the same with exclusive gateways
//! - `Loop` → an exclusive join (iteration entry) before the mandatory block
//!   and an exclusive split (iteration exit) after it, with the back edge
//!   running through the optional block when there is one
//!
//! A final cleanup pass collapses every gateway left with a single incoming
//! and single outgoing edge. The result keeps explicit start and end event
//! handles and renders to GraphViz DOT for diagnostics.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::graph::{DirectedGraph, NodeId};
use crate::model::{NodeId as TreeNodeId, Operator, ProcessTree};
use crate::{Error, Result};

/// Whether a gateway opens or closes a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRole {
    /// Fans one incoming flow out to several branches.
    Split,
    /// Collects several branches into one outgoing flow.
    Join,
}

/// A node of the generated flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowNode {
    /// The unique start event.
    StartEvent,
    /// The unique end event.
    EndEvent,
    /// An executable task, carrying its display name.
    Task(String),
    /// A parallel (AND) gateway.
    ParallelGateway(GatewayRole),
    /// An exclusive (XOR) gateway.
    ExclusiveGateway(GatewayRole),
}

impl FlowNode {
    /// Returns `true` for the two gateway variants.
    #[must_use]
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            FlowNode::ParallelGateway(_) | FlowNode::ExclusiveGateway(_)
        )
    }
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowNode::StartEvent => write!(f, "start"),
            FlowNode::EndEvent => write!(f, "end"),
            FlowNode::Task(name) => write!(f, "{name}"),
            FlowNode::ParallelGateway(GatewayRole::Split) => write!(f, "AND-split"),
            FlowNode::ParallelGateway(GatewayRole::Join) => write!(f, "AND-join"),
            FlowNode::ExclusiveGateway(GatewayRole::Split) => write!(f, "XOR-split"),
            FlowNode::ExclusiveGateway(GatewayRole::Join) => write!(f, "XOR-join"),
        }
    }
}

/// The generated flow graph with its event handles.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// Nodes and sequence-flow edges.
    pub graph: DirectedGraph<FlowNode, ()>,
    /// The start event node.
    pub start: NodeId,
    /// The end event node.
    pub end: NodeId,
}

impl FlowGraph {
    /// Renders the graph in GraphViz DOT form, for diagnostics.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph flow {\n");
        for (id, node) in self.graph.nodes() {
            let shape = match node {
                FlowNode::StartEvent | FlowNode::EndEvent => "circle",
                FlowNode::Task(_) => "box",
                _ => "diamond",
            };
            dot.push_str(&format!(
                "    {} [label=\"{}\", shape={}];\n",
                id.index(),
                node,
                shape
            ));
        }
        for (edge, ()) in self.graph.edges() {
            let (source, target) = self
                .graph
                .edge_endpoints(edge)
                .expect("edge ids come from the same graph");
            dot.push_str(&format!("    {} -> {};\n", source.index(), target.index()));
        }
        dot.push_str("}\n");
        dot
    }

    /// Counts the nodes matching a predicate.
    #[must_use]
    pub fn count_nodes<F: Fn(&FlowNode) -> bool>(&self, predicate: F) -> usize {
        self.graph.nodes().filter(|(_, node)| predicate(node)).count()
    }
}

/// Lowers a finished tree into a flow graph.
///
/// `display_names` maps task labels to their original display names; unmapped
/// labels pass through unchanged. The input tree is expected to be
/// [normalized](crate::reduce::normalize).
///
/// # Errors
///
/// Returns [`Error::GraphError`] for malformed input: an operator node with no
/// children, or a `Loop` without a `LoopMandatory` child.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashMap;
///
/// use flowforge::codegen::generate;
/// use flowforge::{Constraint, Relation, Synthesizer};
///
/// let tree = Synthesizer::default()
///     .synthesize(
///         vec![Constraint::new(Relation::Before, "A", "B")],
///         Vec::new(),
///     )
///     .unwrap();
/// let flow = generate(&tree, &HashMap::new()).unwrap();
/// assert!(flow.to_dot().contains("digraph"));
/// ```
pub fn generate(tree: &ProcessTree, display_names: &HashMap<String, String>) -> Result<FlowGraph> {
    let mut graph: DirectedGraph<FlowNode, ()> = DirectedGraph::new();
    let start = graph.add_node(FlowNode::StartEvent);
    let end = graph.add_node(FlowNode::EndEvent);

    match tree.root() {
        None => {
            graph.add_edge(start, end, ())?;
        }
        Some(root) => {
            let block = lower(tree, root, display_names, &mut graph)?;
            graph.add_edge(start, block.entry, ())?;
            graph.add_edge(block.exit, end, ())?;
        }
    }

    let flow = FlowGraph { graph, start, end };
    Ok(collapse_trivial_gateways(&flow))
}

/// Entry and exit handles of one lowered block.
#[derive(Debug, Clone, Copy)]
struct Block {
    entry: NodeId,
    exit: NodeId,
}

/// Structural recursion over the tree.
fn lower(
    tree: &ProcessTree,
    node: TreeNodeId,
    display_names: &HashMap<String, String>,
    graph: &mut DirectedGraph<FlowNode, ()>,
) -> Result<Block> {
    match tree.op(node) {
        Operator::Task => {
            let label = tree.label(node).unwrap_or_default();
            let display = display_names
                .get(label)
                .cloned()
                .unwrap_or_else(|| label.to_string());
            let task = graph.add_node(FlowNode::Task(display));
            Ok(Block {
                entry: task,
                exit: task,
            })
        }
        Operator::Sequence | Operator::LoopMandatory | Operator::LoopOptional => {
            chain(tree, tree.children(node), display_names, graph).ok_or_else(|| {
                Error::GraphError(format!("operator node {node} has no children"))
            })?
        }
        Operator::Parallel => {
            branch_block(tree, node, display_names, graph, FlowNode::ParallelGateway)
        }
        Operator::Choice => {
            branch_block(tree, node, display_names, graph, FlowNode::ExclusiveGateway)
        }
        Operator::Loop => {
            let children = tree.children(node);
            let mandatory = children
                .iter()
                .copied()
                .find(|&child| tree.op(child) == Operator::LoopMandatory)
                .ok_or_else(|| {
                    Error::GraphError(format!("loop node {node} has no mandatory body"))
                })?;
            let optional = children
                .iter()
                .copied()
                .find(|&child| tree.op(child) == Operator::LoopOptional);

            let join = graph.add_node(FlowNode::ExclusiveGateway(GatewayRole::Join));
            let split = graph.add_node(FlowNode::ExclusiveGateway(GatewayRole::Split));
            let body = lower(tree, mandatory, display_names, graph)?;
            graph.add_edge(join, body.entry, ())?;
            graph.add_edge(body.exit, split, ())?;

            match optional {
                Some(optional) => {
                    let tail = lower(tree, optional, display_names, graph)?;
                    graph.add_edge(split, tail.entry, ())?;
                    graph.add_edge(tail.exit, join, ())?;
                }
                None => {
                    graph.add_edge(split, join, ())?;
                }
            }
            Ok(Block {
                entry: join,
                exit: split,
            })
        }
    }
}

/// Chains the children of a sequence-like node; `None` for no children.
fn chain(
    tree: &ProcessTree,
    children: &[TreeNodeId],
    display_names: &HashMap<String, String>,
    graph: &mut DirectedGraph<FlowNode, ()>,
) -> Option<Result<Block>> {
    let mut blocks = Vec::with_capacity(children.len());
    for &child in children {
        match lower(tree, child, display_names, graph) {
            Ok(block) => blocks.push(block),
            Err(error) => return Some(Err(error)),
        }
    }
    let (&first, rest) = blocks.split_first()?;
    let mut exit = first.exit;
    for block in rest {
        if let Err(error) = graph.add_edge(exit, block.entry, ()) {
            return Some(Err(error));
        }
        exit = block.exit;
    }
    Some(Ok(Block {
        entry: first.entry,
        exit,
    }))
}

/// Split/join gateways around the branches of a parallel or choice node.
fn branch_block(
    tree: &ProcessTree,
    node: TreeNodeId,
    display_names: &HashMap<String, String>,
    graph: &mut DirectedGraph<FlowNode, ()>,
    gateway: fn(GatewayRole) -> FlowNode,
) -> Result<Block> {
    let children = tree.children(node).to_vec();
    if children.is_empty() {
        return Err(Error::GraphError(format!(
            "operator node {node} has no children"
        )));
    }
    let split = graph.add_node(gateway(GatewayRole::Split));
    let join = graph.add_node(gateway(GatewayRole::Join));
    for child in children {
        let block = lower(tree, child, display_names, graph)?;
        graph.add_edge(split, block.entry, ())?;
        graph.add_edge(block.exit, join, ())?;
    }
    Ok(Block {
        entry: split,
        exit: join,
    })
}

/// Cleanup: collapses every gateway with exactly one incoming and one
/// outgoing edge, rewiring its neighbors directly.
fn collapse_trivial_gateways(flow: &FlowGraph) -> FlowGraph {
    let graph = &flow.graph;
    let trivial: HashSet<NodeId> = graph
        .node_ids()
        .filter(|&node| {
            graph
                .node(node)
                .is_some_and(FlowNode::is_gateway)
                && graph.in_degree(node) == 1
                && graph.out_degree(node) == 1
        })
        .collect();
    if trivial.is_empty() {
        return flow.clone();
    }

    // resolve a node through chains of collapsed gateways
    let resolve = |mut node: NodeId| {
        while trivial.contains(&node) {
            node = graph
                .successors(node)
                .next()
                .expect("trivial gateways have one successor");
        }
        node
    };

    let mut rebuilt: DirectedGraph<FlowNode, ()> = DirectedGraph::new();
    let mut mapping: HashMap<NodeId, NodeId> = HashMap::new();
    for (id, node) in graph.nodes() {
        if !trivial.contains(&id) {
            mapping.insert(id, rebuilt.add_node(node.clone()));
        }
    }

    let mut seen_edges: HashSet<(NodeId, NodeId)> = HashSet::new();
    for edge in graph.nodes().flat_map(|(id, _)| {
        graph
            .successors(id)
            .map(move |succ| (id, succ))
            .collect::<Vec<_>>()
    }) {
        let (source, target) = edge;
        if trivial.contains(&source) {
            continue;
        }
        let target = resolve(target);
        let source = mapping[&source];
        let target = mapping[&target];
        if source != target && seen_edges.insert((source, target)) {
            rebuilt
                .add_edge(source, target, ())
                .expect("both endpoints were re-added");
        }
    }

    FlowGraph {
        start: mapping[&flow.start],
        end: mapping[&flow.end],
        graph: rebuilt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_names() -> HashMap<String, String> {
        HashMap::new()
    }

    fn count_tasks(flow: &FlowGraph) -> usize {
        flow.count_nodes(|node| matches!(node, FlowNode::Task(_)))
    }

    #[test]
    fn test_empty_tree_start_to_end() {
        let tree = ProcessTree::new();
        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(flow.graph.node_count(), 2);
        assert_eq!(flow.graph.edge_count(), 1);
        assert_eq!(
            flow.graph.successors(flow.start).collect::<Vec<_>>(),
            vec![flow.end]
        );
    }

    #[test]
    fn test_single_task() {
        let tree = ProcessTree::with_task("A");
        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(count_tasks(&flow), 1);
        // start -> A -> end
        assert_eq!(flow.graph.edge_count(), 2);
    }

    #[test]
    fn test_display_name_mapping() {
        let tree = ProcessTree::with_task("t1");
        let names: HashMap<String, String> =
            [("t1".to_string(), "check invoice".to_string())].into();
        let flow = generate(&tree, &names).unwrap();
        assert_eq!(
            flow.count_nodes(|node| matches!(node, FlowNode::Task(name) if name == "check invoice")),
            1
        );
    }

    #[test]
    fn test_sequence_chains() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, b, c]);
        tree.set_root(seq);

        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(count_tasks(&flow), 3);
        // start -> A -> B -> C -> end, no gateways
        assert_eq!(flow.count_nodes(FlowNode::is_gateway), 0);
        assert_eq!(flow.graph.edge_count(), 4);
    }

    #[test]
    fn test_parallel_gateways() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let par = tree.add_operator_with_children(Operator::Parallel, vec![a, b]);
        tree.set_root(par);

        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(
            flow.count_nodes(|node| matches!(node, FlowNode::ParallelGateway(_))),
            2
        );
        // start -> split -> {A, B} -> join -> end
        assert_eq!(flow.graph.edge_count(), 6);
    }

    #[test]
    fn test_choice_gateways() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let choice = tree.add_operator_with_children(Operator::Choice, vec![a, b]);
        tree.set_root(choice);

        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(
            flow.count_nodes(|node| matches!(node, FlowNode::ExclusiveGateway(_))),
            2
        );
    }

    #[test]
    fn test_loop_back_edge() {
        // Loop(LoopMandatory(A)): start -> join -> A -> split -> join (back)
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let mandatory = tree.add_operator_with_children(Operator::LoopMandatory, vec![a]);
        let lp = tree.add_operator_with_children(Operator::Loop, vec![mandatory]);
        tree.set_root(lp);

        let flow = generate(&tree, &no_names()).unwrap();
        let gateways = flow.count_nodes(|node| matches!(node, FlowNode::ExclusiveGateway(_)));
        assert_eq!(gateways, 2);

        // some gateway has two outgoing edges: exit and back edge
        let split = flow
            .graph
            .node_ids()
            .find(|&node| {
                matches!(
                    flow.graph.node(node),
                    Some(FlowNode::ExclusiveGateway(GatewayRole::Split))
                )
            })
            .unwrap();
        assert_eq!(flow.graph.out_degree(split), 2);
    }

    #[test]
    fn test_loop_with_optional_tail() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let mandatory = tree.add_operator_with_children(Operator::LoopMandatory, vec![a]);
        let optional = tree.add_operator_with_children(Operator::LoopOptional, vec![b]);
        let lp = tree.add_operator_with_children(Operator::Loop, vec![mandatory, optional]);
        tree.set_root(lp);

        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(count_tasks(&flow), 2);
        // the back path runs through B
        let b_node = flow
            .graph
            .node_ids()
            .find(|&node| matches!(flow.graph.node(node), Some(FlowNode::Task(name)) if name == "B"))
            .unwrap();
        assert_eq!(flow.graph.out_degree(b_node), 1);
        let back_target = flow.graph.successors(b_node).next().unwrap();
        assert!(matches!(
            flow.graph.node(back_target),
            Some(FlowNode::ExclusiveGateway(GatewayRole::Join))
        ));
    }

    #[test]
    fn test_trivial_gateway_collapsed() {
        // a hand-built flow with a pointless 1-in-1-out gateway
        let mut graph: DirectedGraph<FlowNode, ()> = DirectedGraph::new();
        let start = graph.add_node(FlowNode::StartEvent);
        let end = graph.add_node(FlowNode::EndEvent);
        let gateway = graph.add_node(FlowNode::ExclusiveGateway(GatewayRole::Split));
        let task = graph.add_node(FlowNode::Task("A".to_string()));
        graph.add_edge(start, gateway, ()).unwrap();
        graph.add_edge(gateway, task, ()).unwrap();
        graph.add_edge(task, end, ()).unwrap();

        let flow = FlowGraph { graph, start, end };
        let cleaned = collapse_trivial_gateways(&flow);
        assert_eq!(cleaned.count_nodes(FlowNode::is_gateway), 0);
        assert_eq!(cleaned.graph.node_count(), 3);
        assert_eq!(cleaned.graph.edge_count(), 2);
    }

    #[test]
    fn test_nested_structure_counts() {
        // SEQ(A, PAR(B, C), D)
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let d = tree.add_task("D");
        let par = tree.add_operator_with_children(Operator::Parallel, vec![b, c]);
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, par, d]);
        tree.set_root(seq);

        let flow = generate(&tree, &no_names()).unwrap();
        assert_eq!(count_tasks(&flow), 4);
        assert_eq!(
            flow.count_nodes(|node| matches!(node, FlowNode::ParallelGateway(_))),
            2
        );
    }

    #[test]
    fn test_dot_rendering() {
        let tree = ProcessTree::with_task("A");
        let flow = generate(&tree, &no_names()).unwrap();
        let dot = flow.to_dot();
        assert!(dot.starts_with("digraph flow {"));
        assert!(dot.contains("label=\"A\""));
        assert!(dot.contains("label=\"start\""));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_malformed_operator_rejected() {
        let mut tree = ProcessTree::new();
        let empty = tree.add_operator(Operator::Sequence);
        tree.set_root(empty);
        assert!(matches!(
            generate(&tree, &no_names()),
            Err(Error::GraphError(_))
        ));
    }
}
