//! Sequence relaxation.
//!
//! Direct placement tends to over-sequence: splicing a new task next to its
//! anchor inside a `Sequence` orders it against every other sibling, even the
//! ones no constraint mentions. The sequence reducer relaxes that — it moves a
//! node among its sequence siblings or merges it into a `Parallel` with the
//! siblings nothing orders it against — without ever violating a constraint
//! that already holds.
//!
//! Two passes share the machinery:
//!
//! - [`reduce_local`] runs right after a single insertion and only considers
//!   the newly placed node;
//! - [`reduce_global`] runs the same relaxation over every sequence in the
//!   tree, bottom-up, to a fixpoint.
//!
//! Both use the trial protocol: copy the tree, apply one candidate edit,
//! normalize, run the [oracle](crate::oracle) over the full constraint set,
//! and commit the copy only if nothing is problematic. Candidates are tried in
//! a fixed priority order — single mergeable sibling, then the contiguous
//! mergeable run on each side, then the largest mergeable run around the node
//! — so the result is deterministic.

use std::collections::BTreeSet;

use crate::constraint::ConstraintSet;
use crate::model::{NodeId, Operator, ProcessTree};
use crate::oracle;
use crate::reduce::trial_improving;

/// Relaxes the position of one freshly placed node within its sequence.
///
/// If the tree is currently inconsistent, position moves are tried first —
/// the naive splice may simply have put the node on the wrong side of a
/// sibling. Parallel merges follow, in priority order. The first candidate
/// that leaves the whole constraint set satisfied is committed.
///
/// # Returns
///
/// `true` if a candidate was committed, `false` if the tree is unchanged
/// (including when `node` is not directly under a `Sequence`).
pub fn reduce_local(tree: &mut ProcessTree, constraints: &ConstraintSet, node: NodeId) -> bool {
    let Some(seq) = tree.parent(node) else {
        return false;
    };
    if tree.op(seq) != Operator::Sequence {
        return false;
    }

    let consistent = oracle::is_consistent(tree, constraints);

    if !consistent && try_moves(tree, constraints, seq, node) {
        return true;
    }
    if try_parallel_merges(tree, constraints, seq, node) {
        return true;
    }
    // a move can also repair an inconsistent placement when no merge does
    if !consistent && try_moves(tree, constraints, seq, node) {
        return true;
    }
    false
}

/// Runs sequence relaxation over every sequence node, bottom-up, to a
/// fixpoint.
///
/// Each sweep tries, for every sequence: pulling a free task into an adjacent
/// non-task sibling structure, and merging consecutive siblings into a
/// `Parallel` when no constraint orders or excludes their task sets. Sweeps
/// repeat until one commits nothing.
///
/// # Returns
///
/// `true` if any sweep committed a change.
pub fn reduce_global(tree: &mut ProcessTree, constraints: &ConstraintSet) -> bool {
    let mut changed = false;
    while sweep(tree, constraints) {
        changed = true;
    }
    changed
}

/// One global sweep; returns `true` if any candidate committed.
fn sweep(tree: &mut ProcessTree, constraints: &ConstraintSet) -> bool {
    let sequences: Vec<NodeId> = tree
        .dfs()
        .filter(|&id| tree.op(id) == Operator::Sequence)
        .collect();

    for seq in sequences.into_iter().rev() {
        // the sweep mutates as it goes; re-check the snapshot entry
        if tree.parent(seq).is_none() && tree.root() != Some(seq) {
            continue;
        }
        if tree.op(seq) != Operator::Sequence {
            continue;
        }
        if absorb_free_task(tree, constraints, seq) {
            return true;
        }
        if merge_consecutive(tree, constraints, seq) {
            return true;
        }
    }
    false
}

/// Tries to pull a free task under `seq` into an adjacent sibling structure.
fn absorb_free_task(tree: &mut ProcessTree, constraints: &ConstraintSet, seq: NodeId) -> bool {
    let children: Vec<NodeId> = tree.children(seq).to_vec();
    for (position, &child) in children.iter().enumerate() {
        if tree.op(child) != Operator::Task {
            continue;
        }
        let child_tasks = tree.task_labels_under(child);
        let mut neighbors = Vec::new();
        if position > 0 {
            neighbors.push(children[position - 1]);
        }
        if position + 1 < children.len() {
            neighbors.push(children[position + 1]);
        }
        for neighbor in neighbors {
            let accepts = match tree.op(neighbor) {
                Operator::Parallel => {
                    let neighbor_tasks = tree.task_labels_under(neighbor);
                    !constraints.orders_across(&child_tasks, &neighbor_tasks)
                        && !constraints.excludes_across(&child_tasks, &neighbor_tasks)
                }
                // a task may only join a choice as a genuine alternative:
                // some constraint must make it exclusive with the branches
                Operator::Choice => {
                    let neighbor_tasks = tree.task_labels_under(neighbor);
                    constraints.excludes_across(&child_tasks, &neighbor_tasks)
                        && !constraints.orders_across(&child_tasks, &neighbor_tasks)
                }
                _ => false,
            };
            if !accepts {
                continue;
            }
            let committed = trial_improving(tree, constraints, |candidate| {
                candidate.detach(child);
                candidate.attach(neighbor, child);
            });
            if committed {
                return true;
            }
        }
    }
    false
}

/// Tries to merge consecutive siblings of `seq` into a `Parallel`.
fn merge_consecutive(tree: &mut ProcessTree, constraints: &ConstraintSet, seq: NodeId) -> bool {
    let children: Vec<NodeId> = tree.children(seq).to_vec();
    for window in children.windows(2) {
        let (first, second) = (window[0], window[1]);
        let first_tasks = tree.task_labels_under(first);
        let second_tasks = tree.task_labels_under(second);
        if constraints.orders_across(&first_tasks, &second_tasks)
            || constraints.excludes_across(&first_tasks, &second_tasks)
        {
            continue;
        }
        let committed = trial_improving(tree, constraints, |candidate| {
            let index = candidate
                .child_index(seq, first)
                .expect("sibling still attached");
            candidate.detach(first);
            candidate.detach(second);
            let parallel =
                candidate.add_operator_with_children(Operator::Parallel, vec![first, second]);
            candidate.insert_child(seq, index, parallel);
        });
        if committed {
            return true;
        }
    }
    false
}

/// Tries every other position for `node` within `seq`, in order.
fn try_moves(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    seq: NodeId,
    node: NodeId,
) -> bool {
    let len = tree.children(seq).len();
    let current = tree
        .child_index(seq, node)
        .expect("node is a child of seq");
    for target in 0..len {
        if target == current {
            continue;
        }
        let committed = trial_improving(tree, constraints, |candidate| {
            candidate.detach(node);
            candidate.insert_child(seq, target, node);
        });
        if committed {
            return true;
        }
    }
    false
}

/// Tries to merge `node` into a `Parallel` with mergeable sequence siblings.
///
/// Priority: single adjacent sibling (left, then right), then the contiguous
/// mergeable run on one side, then the full run around the node.
fn try_parallel_merges(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    seq: NodeId,
    node: NodeId,
) -> bool {
    let children: Vec<NodeId> = tree.children(seq).to_vec();
    let position = children
        .iter()
        .position(|&c| c == node)
        .expect("node is a child of seq");
    let node_tasks = tree.task_labels_under(node);

    let mergeable = |sibling: NodeId, tree: &ProcessTree, node_tasks: &BTreeSet<String>| {
        let sibling_tasks = tree.task_labels_under(sibling);
        !constraints.orders_across(node_tasks, &sibling_tasks)
            && !constraints.excludes_across(node_tasks, &sibling_tasks)
    };

    // contiguous mergeable runs to either side of the node
    let mut left_run: Vec<NodeId> = Vec::new();
    for &sibling in children[..position].iter().rev() {
        if mergeable(sibling, tree, &node_tasks) {
            left_run.insert(0, sibling);
        } else {
            break;
        }
    }
    let mut right_run: Vec<NodeId> = Vec::new();
    for &sibling in &children[position + 1..] {
        if mergeable(sibling, tree, &node_tasks) {
            right_run.push(sibling);
        } else {
            break;
        }
    }

    let mut candidates: Vec<Vec<NodeId>> = Vec::new();
    if let Some(&left) = left_run.last() {
        candidates.push(vec![left]);
    }
    if let Some(&right) = right_run.first() {
        candidates.push(vec![right]);
    }
    if left_run.len() > 1 {
        candidates.push(left_run.clone());
    }
    if right_run.len() > 1 {
        candidates.push(right_run.clone());
    }
    if !left_run.is_empty() && !right_run.is_empty() {
        let mut both = left_run.clone();
        both.extend(&right_run);
        candidates.push(both);
    }

    for group in candidates {
        let committed = trial_improving(tree, constraints, |candidate| {
            let anchor = group
                .iter()
                .chain(std::iter::once(&node))
                .filter_map(|&member| candidate.child_index(seq, member))
                .min()
                .expect("group members are children of seq");
            // keep the original sibling order inside the new parallel
            let mut members: Vec<NodeId> = group.clone();
            members.push(node);
            members.sort_by_key(|&member| candidate.child_index(seq, member));
            for &member in &members {
                candidate.detach(member);
            }
            let parallel = candidate.add_operator_with_children(Operator::Parallel, members);
            candidate.insert_child(seq, anchor, parallel);
        });
        if committed {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{Constraint, Relation};

    fn before(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Before, l, r)
    }

    fn par(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Parallel, l, r)
    }

    /// SEQ(A, C, B) where only A>B and A>C are required: C and B should merge.
    #[test]
    fn test_local_merges_unordered_tail() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let c = tree.add_task("C");
        let b = tree.add_task("B");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, c, b]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "B"), before("A", "C")]
            .into_iter()
            .collect();

        assert!(reduce_local(&mut tree, &constraints, c));
        assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C))");
    }

    /// An ordered sibling must not be merged over.
    #[test]
    fn test_local_respects_ordering() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let c = tree.add_task("C");
        let b = tree.add_task("B");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, c, b]);
        tree.set_root(seq);

        let constraints: ConstraintSet =
            [before("A", "B"), before("A", "C"), before("C", "B")]
                .into_iter()
                .collect();

        assert!(!reduce_local(&mut tree, &constraints, c));
        assert_eq!(tree.structural_hash(), "SEQ(A,C,B)");
    }

    /// A move repairs a placement that landed on the wrong side.
    #[test]
    fn test_local_move_repairs_order() {
        // SEQ(B, A) violates A>B; moving A first repairs it
        let mut tree = ProcessTree::new();
        let b = tree.add_task("B");
        let a = tree.add_task("A");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![b, a]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "B")].into_iter().collect();

        assert!(reduce_local(&mut tree, &constraints, a));
        assert_eq!(tree.structural_hash(), "SEQ(A,B)");
    }

    #[test]
    fn test_local_noop_outside_sequence() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let parallel = tree.add_operator_with_children(Operator::Parallel, vec![a, b]);
        tree.set_root(parallel);

        let constraints = ConstraintSet::new();
        assert!(!reduce_local(&mut tree, &constraints, a));
    }

    #[test]
    fn test_local_contiguous_run() {
        // SEQ(A, D, B, C): D unordered against B and C -> PAR(B,C,D)
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let d = tree.add_task("D");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, d, b, c]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [
            before("A", "B"),
            before("A", "C"),
            before("A", "D"),
            par("B", "C"),
        ]
        .into_iter()
        .collect();

        assert!(reduce_local(&mut tree, &constraints, d));
        assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C,D))");
    }

    #[test]
    fn test_global_merges_consecutive() {
        // SEQ(A, B, C) with only A>B required: B and C merge
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, b, c]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "B")].into_iter().collect();

        assert!(reduce_global(&mut tree, &constraints));
        assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C))");
    }

    #[test]
    fn test_global_absorbs_free_task_into_parallel() {
        // SEQ(A, PAR(B, C), D): D unordered against everything joins the parallel
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let d = tree.add_task("D");
        let parallel = tree.add_operator_with_children(Operator::Parallel, vec![b, c]);
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, parallel, d]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "B"), before("A", "D")]
            .into_iter()
            .collect();

        assert!(reduce_global(&mut tree, &constraints));
        assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C,D))");
    }

    #[test]
    fn test_global_fixpoint_stable() {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, b]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "B")].into_iter().collect();

        assert!(!reduce_global(&mut tree, &constraints));
        assert_eq!(tree.structural_hash(), "SEQ(A,B)");
    }

    #[test]
    fn test_global_nested_sequences() {
        // SEQ(A, XOR(SEQ(X, Y), Z)) with no constraint ordering X and Y:
        // the inner sequence relaxes to a parallel
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let x = tree.add_task("X");
        let y = tree.add_task("Y");
        let z = tree.add_task("Z");
        let inner = tree.add_operator_with_children(Operator::Sequence, vec![x, y]);
        let choice = tree.add_operator_with_children(Operator::Choice, vec![inner, z]);
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, choice]);
        tree.set_root(seq);

        let constraints: ConstraintSet = [before("A", "X"), before("A", "Z")]
            .into_iter()
            .collect();

        assert!(reduce_global(&mut tree, &constraints));
        assert_eq!(tree.structural_hash(), "SEQ(A,XOR(PAR(X,Y),Z))");
    }
}
