//! Loop regeneration into the built tree.
//!
//! The skeleton is built acyclically (the extractor removed the back edges);
//! regeneration re-expresses each repeatable region as a
//! `Loop(LoopMandatory, LoopOptional)` construct. The easy case is an
//! ancestor that covers exactly the loop members: it is wrapped in place. An
//! ancestor that also covers unrelated tasks is decomposed: its children are
//! partitioned into mandatory / optional / unrelated groups and, for a
//! sequence ancestor, three canonical orderings are tried — unrelated first,
//! loop first, loop in place over the contiguous member run — each with the
//! copy-and-verify protocol against the full constraint set.
//!
//! When no ordering verifies, the behavior is configuration-dependent: the
//! lossy fallback folds everything under the ancestor into the mandatory body
//! (safe, but it over-approximates the repeatable region), otherwise
//! regeneration fails with `Contradictory`.

use std::collections::BTreeSet;

use crate::constraint::ConstraintSet;
use crate::loops::LoopShape;
use crate::model::{NodeId, Operator, ProcessTree};
use crate::reduce::trial;
use crate::Result;

/// Rewrites the subtree covering `shape`'s members into a loop construct.
///
/// Members that never made it into the tree are ignored; if none are present
/// the call is a no-op.
///
/// # Errors
///
/// Returns [`Error::Contradictory`](crate::Error::Contradictory) when the
/// members cannot be geometrically isolated from non-members and the lossy
/// fallback is disabled (or itself fails verification).
pub fn regenerate(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    shape: &LoopShape,
    lossy: bool,
) -> Result<()> {
    let member_nodes: Vec<NodeId> = shape
        .members()
        .iter()
        .filter_map(|name| tree.find_task(name))
        .collect();
    if member_nodes.is_empty() {
        return Ok(());
    }
    let present: BTreeSet<String> = member_nodes
        .iter()
        .filter_map(|&node| tree.label(node).map(str::to_string))
        .collect();
    let lca = tree
        .least_common_ancestor(&member_nodes)
        .expect("placed tasks share the root");

    tracing::debug!(entry = %shape.entry, lca = %lca, "regenerating loop");
    if tree.task_labels_under(lca) == present {
        wrap_region(tree, constraints, shape, lca, lossy)
    } else {
        decompose(tree, constraints, shape, lca, lossy)
    }
}

/// The ancestor covers exactly the loop members: wrap it in place.
fn wrap_region(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    shape: &LoopShape,
    lca: NodeId,
    lossy: bool,
) -> Result<()> {
    let optional_present: BTreeSet<String> = tree
        .task_labels_under(lca)
        .intersection(&shape.optional)
        .cloned()
        .collect();

    if optional_present.is_empty() {
        let committed = trial(tree, constraints, |candidate| {
            let mandatory = candidate.wrap(lca, Operator::LoopMandatory);
            candidate.wrap(mandatory, Operator::Loop);
        });
        if committed {
            return Ok(());
        }
        return fold_or_fail(tree, constraints, shape, lca, lossy);
    }

    // both parts present under an unordered ancestor: split by membership
    if tree.op(lca) == Operator::Parallel {
        let children = tree.children(lca).to_vec();
        let clean = children.iter().all(|&child| {
            let tasks = tree.task_labels_under(child);
            !tasks.is_empty()
                && (tasks.iter().all(|task| shape.mandatory.contains(task))
                    || tasks.iter().all(|task| shape.optional.contains(task)))
        });
        let any_mandatory = children.iter().any(|&child| {
            tree.task_labels_under(child)
                .iter()
                .all(|task| shape.mandatory.contains(task))
        });
        if clean && any_mandatory {
            let committed = trial(tree, constraints, |candidate| {
                let children = candidate.children(lca).to_vec();
                let mut mandatory_children = Vec::new();
                let mut optional_children = Vec::new();
                for &child in &children {
                    let tasks = candidate.task_labels_under(child);
                    candidate.detach(child);
                    if tasks.iter().all(|task| shape.mandatory.contains(task)) {
                        mandatory_children.push(child);
                    } else {
                        optional_children.push(child);
                    }
                }
                let loop_node = build_loop(
                    candidate,
                    mandatory_children,
                    optional_children,
                    Operator::Parallel,
                );
                candidate.replace(lca, loop_node);
            });
            if committed {
                return Ok(());
            }
        }
    }

    // both parts present: a sequence ancestor can split at the
    // mandatory/optional boundary
    if tree.op(lca) == Operator::Sequence {
        if let Some(split) = split_index(tree, shape, lca) {
            let committed = trial(tree, constraints, |candidate| {
                let children = candidate.children(lca).to_vec();
                for &child in &children {
                    candidate.detach(child);
                }
                let loop_node = build_loop(
                    candidate,
                    children[..split].to_vec(),
                    children[split..].to_vec(),
                    Operator::Sequence,
                );
                candidate.replace(lca, loop_node);
            });
            if committed {
                return Ok(());
            }
        }
    }

    fold_or_fail(tree, constraints, shape, lca, lossy)
}

/// The first child index where the mandatory prefix ends and the optional
/// suffix begins, if the children split that cleanly.
fn split_index(tree: &ProcessTree, shape: &LoopShape, lca: NodeId) -> Option<usize> {
    let children = tree.children(lca);
    (1..children.len()).find(|&index| {
        let prefix_mandatory = children[..index].iter().all(|&child| {
            tree.task_labels_under(child)
                .iter()
                .all(|task| shape.mandatory.contains(task))
        });
        let suffix_optional = children[index..].iter().all(|&child| {
            tree.task_labels_under(child)
                .iter()
                .all(|task| shape.optional.contains(task))
        });
        prefix_mandatory && suffix_optional
    })
}

/// The ancestor also covers unrelated tasks: split its children out.
fn decompose(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    shape: &LoopShape,
    lca: NodeId,
    lossy: bool,
) -> Result<()> {
    let children = tree.children(lca).to_vec();
    let mut mandatory_children: Vec<NodeId> = Vec::new();
    let mut optional_children: Vec<NodeId> = Vec::new();

    for &child in &children {
        let tasks = tree.task_labels_under(child);
        if tasks.iter().all(|task| shape.mandatory.contains(task)) && !tasks.is_empty() {
            mandatory_children.push(child);
        } else if tasks.iter().all(|task| shape.optional.contains(task)) && !tasks.is_empty() {
            optional_children.push(child);
        } else if tasks.iter().any(|task| shape.contains(task)) {
            // a child straddling the loop boundary cannot be split out
            return fold_or_fail(tree, constraints, shape, lca, lossy);
        }
    }
    if mandatory_children.is_empty() {
        return fold_or_fail(tree, constraints, shape, lca, lossy);
    }

    let group_op = tree.op(lca);
    let loop_children: Vec<NodeId> = children
        .iter()
        .copied()
        .filter(|child| {
            mandatory_children.contains(child) || optional_children.contains(child)
        })
        .collect();

    if group_op == Operator::Sequence {
        let anchor = loop_children
            .iter()
            .filter_map(|&child| tree.child_index(lca, child))
            .min()
            .expect("loop children are children of the LCA");

        // unrelated first, then loop first, then loop in place
        let placements: [Placement; 3] = [Placement::Last, Placement::First, Placement::At(anchor)];
        for placement in placements {
            let committed = trial(tree, constraints, |candidate| {
                for &child in &loop_children {
                    candidate.detach(child);
                }
                let loop_node = build_loop(
                    candidate,
                    mandatory_children.clone(),
                    optional_children.clone(),
                    Operator::Sequence,
                );
                let index = match placement {
                    Placement::First => 0,
                    Placement::Last => candidate.children(lca).len(),
                    Placement::At(index) => index.min(candidate.children(lca).len()),
                };
                candidate.insert_child(lca, index, loop_node);
            });
            if committed {
                return Ok(());
            }
        }
    } else {
        // an unordered ancestor: the loop joins as one more branch
        let committed = trial(tree, constraints, |candidate| {
            for &child in &loop_children {
                candidate.detach(child);
            }
            let loop_node = build_loop(
                candidate,
                mandatory_children.clone(),
                optional_children.clone(),
                group_op,
            );
            candidate.attach(lca, loop_node);
        });
        if committed {
            return Ok(());
        }
    }

    fold_or_fail(tree, constraints, shape, lca, lossy)
}

/// Where the loop node lands among the ancestor's remaining children.
#[derive(Debug, Clone, Copy)]
enum Placement {
    First,
    Last,
    At(usize),
}

/// Materializes `Loop(LoopMandatory(...), LoopOptional(...))` from detached
/// children.
///
/// # Panics
///
/// Panics if `mandatory` is empty — a loop body must run at least once, and
/// the callers guarantee a non-empty mandatory group.
fn build_loop(
    tree: &mut ProcessTree,
    mandatory: Vec<NodeId>,
    optional: Vec<NodeId>,
    group_op: Operator,
) -> NodeId {
    assert!(!mandatory.is_empty(), "a loop body must have a mandatory part");
    let mandatory_body = group(tree, mandatory, group_op);
    let mandatory_node =
        tree.add_operator_with_children(Operator::LoopMandatory, vec![mandatory_body]);
    let mut loop_children = vec![mandatory_node];
    if !optional.is_empty() {
        let optional_body = group(tree, optional, group_op);
        loop_children.push(
            tree.add_operator_with_children(Operator::LoopOptional, vec![optional_body]),
        );
    }
    tree.add_operator_with_children(Operator::Loop, loop_children)
}

/// Wraps several nodes under one operator, or passes a single node through.
fn group(tree: &mut ProcessTree, nodes: Vec<NodeId>, op: Operator) -> NodeId {
    if nodes.len() == 1 {
        nodes[0]
    } else {
        tree.add_operator_with_children(op, nodes)
    }
}

/// Last resort: fold everything under the ancestor into the mandatory body,
/// or fail.
fn fold_or_fail(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    shape: &LoopShape,
    lca: NodeId,
    lossy: bool,
) -> Result<()> {
    if lossy {
        let committed = trial(tree, constraints, |candidate| {
            let mandatory = candidate.wrap(lca, Operator::LoopMandatory);
            candidate.wrap(mandatory, Operator::Loop);
        });
        if committed {
            tracing::warn!(
                entry = %shape.entry,
                "loop region folded entirely into the mandatory body"
            );
            return Ok(());
        }
    }
    Err(contradiction!(
        "loop region entered at {} cannot be isolated in {tree}",
        shape.entry
    ))
}
