//! Consistency oracle: which constraints does a tree violate?
//!
//! Given a tree and a constraint set, the oracle determines the *problematic*
//! constraints — those whose required relation is not entailed by the current
//! tree shape. Every trial mutation in the synthesis pipeline ends with an
//! oracle run over the entire working set; a non-empty answer means the trial
//! is rolled back.
//!
//! # Entailment
//!
//! For a constraint whose endpoints both occur in the tree, the relation the
//! tree entails is read off the least common ancestor of the two endpoints:
//!
//! | LCA operator      | entails                                          |
//! |-------------------|--------------------------------------------------|
//! | `Sequence`        | `Before`, in branch order                        |
//! | `Parallel`        | `Parallel`                                       |
//! | `Choice`          | `Exclusive`                                      |
//! | `Loop`            | `Before` from the mandatory to the optional part |
//! | `LoopMandatory` / `LoopOptional` | `Before`, in branch order (body parts chain) |
//!
//! A constraint with an absent endpoint is never problematic: there is nothing
//! to violate yet. Endpoints with no common ancestor violate every relation —
//! the halves of the tree were never joined.

use crate::constraint::{Constraint, ConstraintSet, Relation};
use crate::model::{NodeId, Operator, ProcessTree};

/// Returns `true` if the tree satisfies (or does not yet bind) the constraint.
///
/// # Examples
///
/// ```rust
/// use flowforge::model::{Operator, ProcessTree};
/// use flowforge::oracle;
/// use flowforge::{Constraint, Relation};
///
/// let mut tree = ProcessTree::new();
/// let a = tree.add_task("A");
/// let b = tree.add_task("B");
/// let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, b]);
/// tree.set_root(seq);
///
/// assert!(oracle::satisfies(&tree, &Constraint::new(Relation::Before, "A", "B")));
/// assert!(!oracle::satisfies(&tree, &Constraint::new(Relation::Before, "B", "A")));
/// assert!(!oracle::satisfies(&tree, &Constraint::new(Relation::Parallel, "A", "B")));
/// ```
#[must_use]
pub fn satisfies(tree: &ProcessTree, constraint: &Constraint) -> bool {
    let (Some(left), Some(right)) = (
        tree.find_task(constraint.left()),
        tree.find_task(constraint.right()),
    ) else {
        // an unplaced endpoint cannot be violated
        return true;
    };
    if left == right {
        // degenerate self-relation; nothing a binary shape could express
        return true;
    }
    let Ok(lca) = tree.least_common_ancestor(&[left, right]) else {
        return false;
    };

    let left_branch = tree
        .branch_toward(lca, left)
        .expect("LCA is an ancestor of its inputs");
    let right_branch = tree
        .branch_toward(lca, right)
        .expect("LCA is an ancestor of its inputs");

    match tree.op(lca) {
        Operator::Parallel => constraint.relation() == Relation::Parallel,
        Operator::Choice => constraint.relation() == Relation::Exclusive,
        Operator::Sequence | Operator::LoopMandatory | Operator::LoopOptional => {
            constraint.relation() == Relation::Before
                && branch_precedes(tree, lca, left_branch, right_branch)
        }
        Operator::Loop => {
            // mandatory body runs before the optional tail within an iteration
            constraint.relation() == Relation::Before
                && tree.op(left_branch) == Operator::LoopMandatory
                && tree.op(right_branch) == Operator::LoopOptional
        }
        Operator::Task => unreachable!("a task cannot be the LCA of two distinct nodes"),
    }
}

/// Returns `true` if `left` comes before `right` among `parent`'s children.
fn branch_precedes(tree: &ProcessTree, parent: NodeId, left: NodeId, right: NodeId) -> bool {
    let left_index = tree
        .child_index(parent, left)
        .expect("branch is a child of the LCA");
    let right_index = tree
        .child_index(parent, right)
        .expect("branch is a child of the LCA");
    left_index < right_index
}

/// Returns the indices of the problematic constraints, in insertion order.
///
/// The merge engine resolves conflicts at the *earliest* violated constraint,
/// so the order of this answer is part of the oracle's contract.
#[must_use]
pub fn problematic_indices(tree: &ProcessTree, constraints: &ConstraintSet) -> Vec<usize> {
    constraints
        .iter()
        .enumerate()
        .filter(|(_, c)| !satisfies(tree, c))
        .map(|(i, _)| i)
        .collect()
}

/// Returns the index of the earliest problematic constraint, if any.
#[must_use]
pub fn first_problematic(tree: &ProcessTree, constraints: &ConstraintSet) -> Option<usize> {
    constraints
        .iter()
        .enumerate()
        .find(|(_, c)| !satisfies(tree, c))
        .map(|(i, _)| i)
}

/// Returns `true` if no constraint in the set is problematic.
#[must_use]
pub fn is_consistent(tree: &ProcessTree, constraints: &ConstraintSet) -> bool {
    constraints.iter().all(|c| satisfies(tree, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds Sequence(A, Parallel(B, C), Choice(D, E)).
    fn sample_tree() -> ProcessTree {
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let d = tree.add_task("D");
        let e = tree.add_task("E");
        let par = tree.add_operator_with_children(Operator::Parallel, vec![b, c]);
        let choice = tree.add_operator_with_children(Operator::Choice, vec![d, e]);
        let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, par, choice]);
        tree.set_root(seq);
        tree
    }

    fn before(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Before, l, r)
    }

    fn par(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Parallel, l, r)
    }

    fn xor(l: &str, r: &str) -> Constraint {
        Constraint::new(Relation::Exclusive, l, r)
    }

    #[test]
    fn test_sequence_entailment() {
        let tree = sample_tree();
        assert!(satisfies(&tree, &before("A", "B")));
        assert!(satisfies(&tree, &before("A", "D")));
        assert!(satisfies(&tree, &before("B", "E")));
        // wrong direction
        assert!(!satisfies(&tree, &before("B", "A")));
        // wrong relation
        assert!(!satisfies(&tree, &par("A", "B")));
        assert!(!satisfies(&tree, &xor("A", "B")));
    }

    #[test]
    fn test_parallel_entailment() {
        let tree = sample_tree();
        assert!(satisfies(&tree, &par("B", "C")));
        assert!(!satisfies(&tree, &before("B", "C")));
        assert!(!satisfies(&tree, &xor("B", "C")));
    }

    #[test]
    fn test_choice_entailment() {
        let tree = sample_tree();
        assert!(satisfies(&tree, &xor("D", "E")));
        assert!(!satisfies(&tree, &before("D", "E")));
        assert!(!satisfies(&tree, &par("D", "E")));
    }

    #[test]
    fn test_absent_endpoint_not_problematic() {
        let tree = sample_tree();
        assert!(satisfies(&tree, &before("A", "missing")));
        assert!(satisfies(&tree, &xor("missing", "also-missing")));
    }

    #[test]
    fn test_loop_lca_entailment() {
        // Loop(LoopMandatory(Sequence(A, B)), LoopOptional(C))
        let mut tree = ProcessTree::new();
        let a = tree.add_task("A");
        let b = tree.add_task("B");
        let c = tree.add_task("C");
        let body = tree.add_operator_with_children(Operator::Sequence, vec![a, b]);
        let mandatory = tree.add_operator_with_children(Operator::LoopMandatory, vec![body]);
        let optional = tree.add_operator_with_children(Operator::LoopOptional, vec![c]);
        let lp = tree.add_operator_with_children(Operator::Loop, vec![mandatory, optional]);
        tree.set_root(lp);

        // inside the mandatory body, the sequence rules apply
        assert!(satisfies(&tree, &before("A", "B")));
        // mandatory part precedes the optional tail
        assert!(satisfies(&tree, &before("A", "C")));
        assert!(satisfies(&tree, &before("B", "C")));
        assert!(!satisfies(&tree, &before("C", "A")));
        assert!(!satisfies(&tree, &par("A", "C")));
        assert!(!satisfies(&tree, &xor("A", "C")));
    }

    #[test]
    fn test_problematic_indices_order() {
        let tree = sample_tree();
        let set: ConstraintSet = [
            before("A", "B"), // 0: satisfied
            before("B", "A"), // 1: violated
            par("D", "E"),    // 2: violated
            xor("D", "E"),    // 3: satisfied
        ]
        .into_iter()
        .collect();

        assert_eq!(problematic_indices(&tree, &set), vec![1, 2]);
        assert_eq!(first_problematic(&tree, &set), Some(1));
        assert!(!is_consistent(&tree, &set));
    }

    #[test]
    fn test_consistent_set() {
        let tree = sample_tree();
        let set: ConstraintSet = [before("A", "C"), par("B", "C"), xor("D", "E")]
            .into_iter()
            .collect();
        assert!(is_consistent(&tree, &set));
        assert_eq!(first_problematic(&tree, &set), None);
    }
}
