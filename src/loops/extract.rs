//! Loop extraction from the task dependency graph.
//!
//! A repeatable region shows up in the dependency graph as a cycle: a task
//! reachable from itself. The extractor finds every such region as a
//! non-trivial strongly connected component, picks its unique entry and exit,
//! partitions the members into a mandatory core and an optional tail, and
//! reports the back edges so the driver can build the acyclic skeleton without
//! them.
//!
//! # Classification
//!
//! With the back edges into the entry removed, the region becomes acyclic:
//!
//! - **mandatory** - members reachable from the entry that still reach an
//!   exit; they run once per iteration and on the way out
//! - **optional** - the remaining members: they sit after the exit, on the
//!   path that jumps back to the entry, and may run zero or more times
//!
//! Explicitly [declared](crate::loops::LoopDeclaration) loops merge into
//! detected shapes when their member sets overlap (mandatory wins over
//! optional); declarations with no structural counterpart become shapes of
//! their own.

use std::collections::{BTreeSet, HashSet};

use crate::graph::{algorithms, NodeId, TaskGraph};
use crate::loops::{LoopDeclaration, LoopShape};

/// The extractor's result: the loop shapes plus the back edges that close
/// their cycles, as `(from, to)` name pairs.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// One shape per repeatable region, deterministic order (by entry name).
    pub shapes: Vec<LoopShape>,
    /// Dependency edges that close a cycle; the skeleton is built without
    /// them.
    pub back_edges: Vec<(String, String)>,
}

/// Extracts every repeatable region from the dependency graph and merges the
/// declared loops in.
///
/// # Examples
///
/// ```rust
/// use flowforge::graph::TaskGraph;
/// use flowforge::loops::extract;
///
/// // A -> B -> C -> A, with C -> D leaving the loop
/// let mut graph = TaskGraph::new();
/// graph.add_dependency("A", "B").unwrap();
/// graph.add_dependency("B", "C").unwrap();
/// graph.add_dependency("C", "A").unwrap();
/// graph.add_dependency("C", "D").unwrap();
///
/// let extraction = extract(&graph, &[]);
/// assert_eq!(extraction.shapes.len(), 1);
/// let shape = &extraction.shapes[0];
/// assert_eq!(shape.entry, "A");
/// assert_eq!(shape.exits, vec!["C"]);
/// assert!(shape.optional.is_empty());
/// assert_eq!(extraction.back_edges, vec![("C".to_string(), "A".to_string())]);
/// ```
#[must_use]
pub fn extract(graph: &TaskGraph, declared: &[LoopDeclaration]) -> Extraction {
    let mut shapes: Vec<LoopShape> = Vec::new();
    let mut back_edges: Vec<(String, String)> = Vec::new();

    for component in algorithms::strongly_connected_components(graph.inner()) {
        if !is_cyclic(graph, &component) {
            continue;
        }
        let members: HashSet<NodeId> = component.iter().copied().collect();
        let shape = classify(graph, &members, &mut back_edges);
        tracing::debug!(entry = %shape.entry, members = members.len(), "loop region detected");
        shapes.push(shape);
    }

    merge_declarations(&mut shapes, declared);
    shapes.sort_by(|a, b| a.entry.cmp(&b.entry));
    back_edges.sort();
    Extraction { shapes, back_edges }
}

/// A component is a repeatable region if it has more than one node or a
/// self-edge.
fn is_cyclic(graph: &TaskGraph, component: &[NodeId]) -> bool {
    component.len() > 1
        || component
            .first()
            .is_some_and(|&node| graph.inner().successors(node).any(|succ| succ == node))
}

/// Picks entry and exit, partitions members, and records the back edges.
fn classify(
    graph: &TaskGraph,
    members: &HashSet<NodeId>,
    back_edges: &mut Vec<(String, String)>,
) -> LoopShape {
    let name = |node: NodeId| {
        graph
            .name_of(node)
            .expect("member node exists in the graph")
            .to_string()
    };

    // entry: member with a predecessor outside the region; smallest name as
    // the deterministic stand-in for a synthetic merged entry
    let entry = members
        .iter()
        .filter(|&&node| {
            graph
                .inner()
                .predecessors(node)
                .any(|pred| !members.contains(&pred))
        })
        .map(|&node| name(node))
        .min()
        .unwrap_or_else(|| {
            members
                .iter()
                .map(|&node| name(node))
                .min()
                .expect("cyclic components are non-empty")
        });
    let entry_node = graph.node_of(&entry).expect("entry is a member");

    // exits: members with a successor outside the region
    let mut exits: Vec<String> = members
        .iter()
        .filter(|&&node| {
            graph
                .inner()
                .successors(node)
                .any(|succ| !members.contains(&succ))
        })
        .map(|&node| name(node))
        .collect();
    exits.sort();
    if exits.is_empty() {
        // an isolated cycle: the node that jumps back to the entry is the
        // natural last stop
        exits = members
            .iter()
            .filter(|&&node| graph.inner().successors(node).any(|succ| succ == entry_node))
            .map(|&node| name(node))
            .min()
            .into_iter()
            .collect();
    }

    // the back edges close the cycle on the entry
    for &node in members {
        if graph.inner().successors(node).any(|succ| succ == entry_node) {
            back_edges.push((name(node), entry.clone()));
        }
    }

    // forward/backward reachability inside the region, with edges into the
    // entry ignored
    let forward = region_walk(members, entry_node, |node| {
        graph
            .inner()
            .successors(node)
            .filter(|&succ| succ != entry_node)
            .collect()
    });
    let exit_nodes: Vec<NodeId> = exits
        .iter()
        .filter_map(|exit| graph.node_of(exit))
        .collect();
    let mut backward: HashSet<NodeId> = HashSet::new();
    for &exit_node in &exit_nodes {
        backward.extend(region_walk(members, exit_node, |node| {
            // edges into the entry are the back edges; never walk them
            if node == entry_node {
                Vec::new()
            } else {
                graph.inner().predecessors(node).collect()
            }
        }));
    }

    let mandatory: BTreeSet<String> = members
        .iter()
        .filter(|node| forward.contains(node) && backward.contains(node))
        .map(|&node| name(node))
        .collect();
    let optional: BTreeSet<String> = members
        .iter()
        .map(|&node| name(node))
        .filter(|task| !mandatory.contains(task))
        .collect();

    LoopShape {
        entry,
        exits,
        mandatory,
        optional,
    }
}

/// Worklist walk restricted to region members.
fn region_walk<F>(members: &HashSet<NodeId>, start: NodeId, neighbors: F) -> HashSet<NodeId>
where
    F: Fn(NodeId) -> Vec<NodeId>,
{
    let mut seen = HashSet::new();
    seen.insert(start);
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        for next in neighbors(node) {
            if members.contains(&next) && seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen
}

/// Folds declarations into overlapping shapes; the rest become shapes of
/// their own.
fn merge_declarations(shapes: &mut Vec<LoopShape>, declared: &[LoopDeclaration]) {
    for declaration in declared {
        let members = declaration.members();
        if members.is_empty() {
            continue;
        }
        if let Some(shape) = shapes.iter_mut().find(|shape| shape.overlaps(&members)) {
            shape.absorb(declaration);
            continue;
        }
        let mut mandatory = declaration.mandatory.clone();
        let mut optional = declaration.optional.clone();
        if mandatory.is_empty() {
            // a loop body must run at least once; promote the declared
            // optionals
            std::mem::swap(&mut mandatory, &mut optional);
        }
        let entry = mandatory
            .iter()
            .next()
            .expect("non-empty declaration")
            .clone();
        shapes.push(LoopShape {
            entry,
            exits: Vec::new(),
            mandatory,
            optional,
        });
    }
}
