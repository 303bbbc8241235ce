//! Incremental constraint merging.
//!
//! The merge engine folds one binary [`Constraint`] into the growing main
//! tree. The case analysis follows endpoint presence:
//!
//! - **neither endpoint placed** - the constraint's two-task shape joins the
//!   tree as a new `Parallel` sibling of the whole current tree (it cannot
//!   conflict with anything yet);
//! - **exactly one endpoint placed** - the new task is spliced in at the
//!   present occurrence: the occurrence is wrapped in the constraint's
//!   operator and the new task becomes its sibling. If that violates another
//!   constraint, the engine re-splices at the earliest violated constraint's
//!   conflict anchor, and finally lets the relaxation passes rearrange the
//!   placement;
//! - **both endpoints placed** - the relation entailed by their least common
//!   ancestor decides: already entailed means no-op; a non-`Parallel` LCA that
//!   entails something else is a genuine contradiction; a `Parallel` LCA is
//!   rewritten by retyping the two endpoint branches under the constraint's
//!   operator, re-planting a free endpoint next to a constrained one, or
//!   splitting both branches out and delegating to the reducers.
//!
//! Every branch ends the same way: normalize, run the
//! [oracle](crate::oracle) over the *entire* working set, and commit the
//! trial copy only when nothing is problematic — otherwise the committed tree
//! stays untouched and the merge fails with [`Error::Contradictory`].
//! A successful merge additionally asserts that the root has no parent and
//! that every parent/child link is intact; a violation there is engine
//! corruption, not bad input, and panics.
//!
//! [`Error::Contradictory`]: crate::Error::Contradictory

use crate::constraint::{Constraint, ConstraintSet, Relation};
use crate::model::{NodeId, Operator, ProcessTree};
use crate::oracle;
use crate::reduce::{choice, normalize, sequence, trial};
use crate::Result;

/// Which side of the constraint the not-yet-placed endpoint is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NewSide {
    Left,
    Right,
}

/// Folds `constraint` into `tree`.
///
/// `constraint` must already be a member of `constraints`: validation always
/// runs over the entire working set, the new constraint included.
///
/// # Errors
///
/// Returns [`Error::Contradictory`](crate::Error::Contradictory) when no
/// placement or relaxation candidate satisfies the whole set. The committed
/// tree is left exactly as it was.
///
/// # Panics
///
/// Panics if a successful placement leaves the tree without a root or with
/// inconsistent parent/child links — both indicate a bug in the engine.
///
/// # Examples
///
/// ```rust
/// use flowforge::model::ProcessTree;
/// use flowforge::{merge, Constraint, ConstraintSet, Relation};
///
/// let mut tree = ProcessTree::new();
/// let mut constraints = ConstraintSet::new();
///
/// let first = Constraint::new(Relation::Before, "A", "B");
/// constraints.insert(first.clone());
/// merge::merge(&mut tree, &constraints, &first).unwrap();
///
/// assert_eq!(tree.structural_hash(), "SEQ(A,B)");
/// ```
pub fn merge(tree: &mut ProcessTree, constraints: &ConstraintSet, constraint: &Constraint) -> Result<()> {
    tracing::debug!(constraint = %constraint, tree = %tree, "merge step");
    if constraint.left() == constraint.right() {
        // degenerate self-relation; nothing to place
        return Ok(());
    }

    let left = tree.find_task(constraint.left());
    let right = tree.find_task(constraint.right());
    let result = match (left, right) {
        (None, None) => place_pair(tree, constraints, constraint),
        (Some(node), None) => place_single(tree, constraints, constraint, node, NewSide::Right),
        (None, Some(node)) => place_single(tree, constraints, constraint, node, NewSide::Left),
        (Some(l), Some(r)) => place_both(tree, constraints, constraint, l, r),
    };

    if result.is_ok() {
        assert!(tree.root().is_some(), "merge left the tree without a root");
        assert!(
            tree.verify_links(),
            "merge corrupted tree ownership: {tree}"
        );
    } else {
        tracing::debug!(constraint = %constraint, "merge rejected");
    }
    result
}

/// Neither endpoint exists: the pair joins as a parallel sibling of the whole
/// tree.
fn place_pair(tree: &mut ProcessTree, constraints: &ConstraintSet, constraint: &Constraint) -> Result<()> {
    let committed = trial(tree, constraints, |candidate| {
        let left = candidate.add_task(constraint.left());
        let right = candidate.add_task(constraint.right());
        let pair = candidate
            .add_operator_with_children(constraint.relation().operator(), vec![left, right]);
        match candidate.root() {
            None => candidate.set_root(pair),
            Some(root) => {
                let new_root = candidate.add_operator(Operator::Parallel);
                candidate.replace(root, new_root);
                candidate.attach(new_root, root);
                candidate.attach(new_root, pair);
            }
        }
    });
    if committed {
        Ok(())
    } else {
        Err(contradiction!(
            "cannot place fresh pair {constraint} into {tree}"
        ))
    }
}

/// Exactly one endpoint exists: splice the new task in next to it.
fn place_single(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    constraint: &Constraint,
    present: NodeId,
    side: NewSide,
) -> Result<()> {
    let new_label = match side {
        NewSide::Left => constraint.left(),
        NewSide::Right => constraint.right(),
    };
    let new_first = constraint.relation() == Relation::Before && side == NewSide::Left;

    // 1: naive splice at the present occurrence
    let naive = splice_candidate(tree, constraint, present, new_label, new_first);
    if oracle::is_consistent(&naive, constraints) {
        *tree = naive;
        polish(tree, constraints, new_label);
        return Ok(());
    }

    // 2: re-splice at the earliest violated constraint's conflict anchor
    let violated_index =
        oracle::first_problematic(&naive, constraints).expect("naive splice was inconsistent");
    let violated = constraints.get(violated_index).expect("index from the set");
    if let Some(anchor) = conflict_anchor(tree, &naive, violated, new_label) {
        if anchor != present {
            let candidate = splice_candidate(tree, constraint, anchor, new_label, new_first);
            if oracle::is_consistent(&candidate, constraints) {
                *tree = candidate;
                polish(tree, constraints, new_label);
                return Ok(());
            }
        }
    }

    // 3: relaxation of the naive splice
    let mut relaxed = naive;
    if let Some(new_node) = relaxed.find_task(new_label) {
        sequence::reduce_local(&mut relaxed, constraints, new_node);
    }
    choice::reduce_global(&mut relaxed, constraints);
    sequence::reduce_global(&mut relaxed, constraints);
    if oracle::is_consistent(&relaxed, constraints) {
        *tree = relaxed;
        return Ok(());
    }

    Err(contradiction!(
        "no placement of {new_label} satisfies {constraint} in {tree}"
    ))
}

/// Builds the splice candidate: clone, wrap the anchor in the constraint's
/// operator, add the new task as its sibling, normalize.
fn splice_candidate(
    tree: &ProcessTree,
    constraint: &Constraint,
    anchor: NodeId,
    new_label: &str,
    new_first: bool,
) -> ProcessTree {
    let mut candidate = tree.clone();
    let new_task = candidate.add_task(new_label);
    let wrapper = candidate.wrap(anchor, constraint.relation().operator());
    if new_first {
        candidate.insert_child(wrapper, 0, new_task);
    } else {
        candidate.attach(wrapper, new_task);
    }
    normalize(&mut candidate);
    candidate
}

/// The node to re-splice at when the naive placement violated `violated`:
/// the LCA of the violated constraint's endpoints *in the naive copy*.
///
/// Arena ids are shared between the committed tree and its copies, so the LCA
/// maps straight back — unless the naive splice created it, in which case the
/// violated constraint's endpoint that still lives in the committed tree
/// anchors instead.
fn conflict_anchor(
    tree: &ProcessTree,
    naive: &ProcessTree,
    violated: &Constraint,
    new_label: &str,
) -> Option<NodeId> {
    let left = naive.find_task(violated.left())?;
    let right = naive.find_task(violated.right())?;
    let lca = naive.least_common_ancestor(&[left, right]).ok()?;
    let attached_in_committed =
        tree.contains_node(lca) && (tree.parent(lca).is_some() || tree.root() == Some(lca));
    if attached_in_committed {
        return Some(lca);
    }
    violated
        .other_endpoint(new_label)
        .and_then(|other| tree.find_task(other))
}

/// Quality pass after a committed placement: relax the new task's position.
/// Only verified improvements commit, so this never breaks consistency.
fn polish(tree: &mut ProcessTree, constraints: &ConstraintSet, new_label: &str) {
    if let Some(new_node) = tree.find_task(new_label) {
        sequence::reduce_local(tree, constraints, new_node);
    }
}

/// Both endpoints exist: decide by the relation their LCA entails.
fn place_both(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    constraint: &Constraint,
    left: NodeId,
    right: NodeId,
) -> Result<()> {
    if oracle::satisfies(tree, constraint) {
        tracing::debug!(constraint = %constraint, "already entailed, no-op");
        return Ok(());
    }

    let lca = tree
        .least_common_ancestor(&[left, right])
        .expect("both endpoints are reachable from the root");

    if tree.op(lca) != Operator::Parallel {
        // a parallel requirement under a choice is the enlargement case;
        // everything else entails a conflicting relation for good
        if tree.op(lca) == Operator::Choice && constraint.relation() == Relation::Parallel {
            let mut candidate = tree.clone();
            if choice::enlarge(&mut candidate, constraints, lca, left, right)
                && oracle::is_consistent(&candidate, constraints)
            {
                *tree = candidate;
                return Ok(());
            }
        }
        return Err(contradiction!(
            "{constraint} conflicts with the entailed relation in {tree}"
        ));
    }

    let left_branch = tree
        .branch_toward(lca, left)
        .expect("LCA is an ancestor of its inputs");
    let right_branch = tree
        .branch_toward(lca, right)
        .expect("LCA is an ancestor of its inputs");

    let left_free = free_path(tree, lca, left);
    let right_free = free_path(tree, lca, right);

    match (left_free, right_free) {
        (true, false) => replant(tree, constraints, constraint, left, right, NewSide::Left),
        (false, true) => replant(tree, constraints, constraint, right, left, NewSide::Right),
        _ => retype(
            tree,
            constraints,
            constraint,
            lca,
            left_branch,
            right_branch,
            !(left_free && right_free),
        ),
    }
}

/// `true` when nothing but `Parallel` operators lie strictly between `node`
/// and `lca`.
fn free_path(tree: &ProcessTree, lca: NodeId, node: NodeId) -> bool {
    let mut current = tree.parent(node);
    while let Some(id) = current {
        if id == lca {
            return true;
        }
        if tree.op(id) != Operator::Parallel {
            return false;
        }
        current = tree.parent(id);
    }
    // node was not below lca at all; treat as constrained
    false
}

/// Retypes the two endpoint branches of a `Parallel` LCA under the
/// constraint's operator. With `delegate` set, a failed direct retype is
/// handed to the relaxation passes before giving up.
fn retype(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    constraint: &Constraint,
    lca: NodeId,
    left_branch: NodeId,
    right_branch: NodeId,
    delegate: bool,
) -> Result<()> {
    let mut candidate = tree.clone();
    candidate.detach(left_branch);
    candidate.detach(right_branch);
    let wrapper = candidate.add_operator_with_children(
        constraint.relation().operator(),
        vec![left_branch, right_branch],
    );
    candidate.attach(lca, wrapper);
    normalize(&mut candidate);

    if oracle::is_consistent(&candidate, constraints) {
        *tree = candidate;
        return Ok(());
    }

    if delegate {
        choice::reduce_global(&mut candidate, constraints);
        sequence::reduce_global(&mut candidate, constraints);
        if oracle::is_consistent(&candidate, constraints) {
            *tree = candidate;
            return Ok(());
        }
    }

    Err(contradiction!(
        "retyping the common ancestor for {constraint} fails in {tree}"
    ))
}

/// Moves the free endpoint next to the constrained one, reducing to the
/// single-placement shape.
fn replant(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    constraint: &Constraint,
    free: NodeId,
    anchored: NodeId,
    free_side: NewSide,
) -> Result<()> {
    let free_first = constraint.relation() == Relation::Before && free_side == NewSide::Left;

    let mut candidate = tree.clone();
    candidate.detach(free);
    let wrapper = candidate.wrap(anchored, constraint.relation().operator());
    if free_first {
        candidate.insert_child(wrapper, 0, free);
    } else {
        candidate.attach(wrapper, free);
    }
    normalize(&mut candidate);

    if oracle::is_consistent(&candidate, constraints) {
        *tree = candidate;
        return Ok(());
    }

    // let the reducers rearrange the replanted endpoint
    if let Some(seq) = candidate.parent(free) {
        if candidate.op(seq) == Operator::Sequence {
            sequence::reduce_local(&mut candidate, constraints, free);
        }
    }
    choice::reduce_global(&mut candidate, constraints);
    sequence::reduce_global(&mut candidate, constraints);
    if oracle::is_consistent(&candidate, constraints) {
        *tree = candidate;
        return Ok(());
    }

    Err(contradiction!(
        "re-planting an endpoint for {constraint} fails in {tree}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn before(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Before, l, r)
    }

    fn par(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Parallel, l, r)
    }

    fn xor(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Exclusive, l, r)
    }

    /// Merges the given constraints in order into a fresh tree.
    fn merge_all(list: &[Constraint]) -> Result<ProcessTree> {
        let mut tree = ProcessTree::new();
        let mut constraints = ConstraintSet::new();
        for c in list {
            constraints.insert(c.clone());
            merge(&mut tree, &constraints, c)?;
        }
        Ok(tree)
    }

    #[test]
    fn test_first_pair_becomes_root() {
        let tree = merge_all(&[before("A", "B")]).unwrap();
        assert_eq!(tree.structural_hash(), "SEQ(A,B)");
    }

    #[test]
    fn test_disjoint_pairs_join_in_parallel() {
        let tree = merge_all(&[before("A", "B"), xor("C", "D")]).unwrap();
        assert_eq!(tree.structural_hash(), "PAR(SEQ(A,B),XOR(C,D))");
    }

    #[test]
    fn test_single_endpoint_splice_relaxes() {
        // A>B then A>C: C is unordered against B, so the tail relaxes
        let tree = merge_all(&[before("A", "B"), before("A", "C")]).unwrap();
        assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C))");
    }

    #[test]
    fn test_chain_stays_sequenced() {
        let tree = merge_all(&[before("A", "B"), before("B", "C")]).unwrap();
        assert_eq!(tree.structural_hash(), "SEQ(A,B,C)");
    }

    #[test]
    fn test_choice_grows_by_direct_splice() {
        let tree = merge_all(&[xor("A", "B"), xor("A", "C")]).unwrap();
        assert_eq!(tree.structural_hash(), "XOR(A,B,C)");
    }

    #[test]
    fn test_already_satisfied_is_noop() {
        let mut tree = ProcessTree::new();
        let mut constraints = ConstraintSet::new();
        let c = before("A", "B");
        constraints.insert(c.clone());
        merge(&mut tree, &constraints, &c).unwrap();
        let hash = tree.structural_hash();

        // merging the same constraint again must not alter the tree
        merge(&mut tree, &constraints, &c).unwrap();
        assert_eq!(tree.structural_hash(), hash);
    }

    #[test]
    fn test_opposite_orders_contradict() {
        let result = merge_all(&[before("A", "B"), before("B", "A")]);
        assert!(matches!(result, Err(Error::Contradictory { .. })));
    }

    #[test]
    fn test_failed_merge_leaves_tree_untouched() {
        let mut tree = ProcessTree::new();
        let mut constraints = ConstraintSet::new();
        let first = before("A", "B");
        constraints.insert(first.clone());
        merge(&mut tree, &constraints, &first).unwrap();
        let hash = tree.structural_hash();

        let bad = before("B", "A");
        constraints.insert(bad.clone());
        assert!(merge(&mut tree, &constraints, &bad).is_err());
        assert_eq!(tree.structural_hash(), hash);
    }

    #[test]
    fn test_parallel_and_exclusive_contradict() {
        let result = merge_all(&[xor("A", "B"), par("A", "B")]);
        assert!(matches!(result, Err(Error::Contradictory { .. })));
    }

    #[test]
    fn test_retype_parallel_lca() {
        // A&B and A&C put all three in one parallel; B>C then retypes the
        // B and C branches into a sequence
        let tree = merge_all(&[par("A", "B"), par("A", "C"), before("B", "C")]).unwrap();
        assert_eq!(tree.structural_hash(), "PAR(A,SEQ(B,C))");
    }

    #[test]
    fn test_replant_free_endpoint() {
        // B sits free under the parallel root; B>X pulls it into the sequence
        let tree = merge_all(&[before("A", "X"), par("A", "B"), before("B", "X")]).unwrap();
        assert!(oracle::satisfies(&tree, &before("A", "X")));
        assert!(oracle::satisfies(&tree, &before("B", "X")));
    }

    #[test]
    fn test_replant_constrained_endpoint() {
        // PAR(B, SEQ(A, X)): B is free under the parallel, X is behind a
        // sequence. B>X re-plants B next to X.
        let mut tree = ProcessTree::new();
        let b = tree.add_task("B");
        let a = tree.add_task("A");
        let x = tree.add_task("X");
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, x]);
        let par = tree.add_operator_with_children(Operator::Parallel, vec![b, seq]);
        tree.set_root(par);

        let mut constraints = ConstraintSet::new();
        constraints.insert(before("A", "X"));
        let c = before("B", "X");
        constraints.insert(c.clone());

        merge(&mut tree, &constraints, &c).unwrap();
        assert_eq!(tree.structural_hash(), "SEQ(A,B,X)");
    }

    #[test]
    fn test_choice_enlargement_via_merge() {
        // D is exclusive with A but must co-occur with B
        let tree = merge_all(&[
            xor("A", "B"),
            xor("A", "C"),
            par("B", "C"),
            xor("A", "D"),
            par("D", "B"),
        ])
        .unwrap();
        let mut constraints = ConstraintSet::new();
        for c in [
            xor("A", "B"),
            xor("A", "C"),
            par("B", "C"),
            xor("A", "D"),
            par("D", "B"),
        ] {
            constraints.insert(c);
        }
        assert!(oracle::is_consistent(&tree, &constraints));
    }

    #[test]
    fn test_merged_sets_are_sound() {
        // soundness: after a successful merge of the whole set, nothing is
        // problematic
        let list = [
            before("A", "B"),
            before("A", "C"),
            par("B", "C"),
            before("B", "D"),
            before("C", "D"),
            xor("E", "D"),
        ];
        let mut tree = ProcessTree::new();
        let mut constraints = ConstraintSet::new();
        for c in &list {
            constraints.insert(c.clone());
            merge(&mut tree, &constraints, c).unwrap();
        }
        assert!(oracle::is_consistent(&tree, &constraints));
        assert!(tree.verify_links());
    }
}
