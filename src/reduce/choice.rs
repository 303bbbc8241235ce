//! Choice enlargement.
//!
//! Placing a new exclusivity endpoint directly into an existing `Choice` makes
//! it exclusive with *every* branch of that choice — including bystander
//! branches the triggering constraint never mentioned. When another constraint
//! requires the endpoint to co-occur with such a bystander, the choice reducer
//! repairs the shape: it pulls mergeable branches out of the choice and wraps
//! them together in a `Parallel`, preserving every exclusivity that must
//! remain by nesting a `Choice` at the conflict site.
//!
//! Mergeability is a constraint-set property: two branches are mergeable when
//! no constraint makes any task pair across them mutually exclusive. Every
//! rearrangement is validated with the trial protocol against the full
//! constraint set before it is committed.

use crate::constraint::{ConstraintSet, Relation};
use crate::model::{NodeId, Operator, ProcessTree};
use crate::oracle;
use crate::reduce::trial_improving;

/// Repairs every parallel-under-choice violation it can, to a fixpoint.
///
/// Scans for problematic [`Relation::Parallel`] constraints whose endpoints
/// meet at a `Choice`, and enlarges that choice so the endpoints can co-occur.
///
/// # Returns
///
/// `true` if any enlargement was committed.
pub fn reduce_global(tree: &mut ProcessTree, constraints: &ConstraintSet) -> bool {
    let mut changed = false;
    while repair_once(tree, constraints) {
        changed = true;
    }
    changed
}

/// Finds the first repairable violation and enlarges; returns `true` on commit.
fn repair_once(tree: &mut ProcessTree, constraints: &ConstraintSet) -> bool {
    for index in oracle::problematic_indices(tree, constraints) {
        let constraint = constraints.get(index).expect("index from the same set");
        if constraint.relation() != Relation::Parallel {
            continue;
        }
        let (Some(left), Some(right)) = (
            tree.find_task(constraint.left()),
            tree.find_task(constraint.right()),
        ) else {
            continue;
        };
        let Ok(lca) = tree.least_common_ancestor(&[left, right]) else {
            continue;
        };
        if tree.op(lca) != Operator::Choice {
            continue;
        }
        if enlarge(tree, constraints, lca, left, right) {
            return true;
        }
    }
    false
}

/// Enlarges `choice` so the branches holding `left` and `right` can co-occur.
///
/// Candidates, in order:
///
/// 1. pull both branches out and wrap them in a `Parallel` child of the choice
///    (only when nothing excludes across the two branch task sets);
/// 2. descend: find a node inside one branch that confines every exclusivity
///    conflict against the other branch, wrap it in a nested `Choice`, and move
///    the other branch in as its alternative.
///
/// Each candidate is committed only if the full constraint set verifies.
///
/// # Returns
///
/// `true` if a candidate was committed.
pub fn enlarge(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    choice: NodeId,
    left: NodeId,
    right: NodeId,
) -> bool {
    let left_branch = tree
        .branch_toward(choice, left)
        .expect("endpoint lives under the choice");
    let right_branch = tree
        .branch_toward(choice, right)
        .expect("endpoint lives under the choice");
    if left_branch == right_branch {
        // the conflict is deeper than this choice; not ours to repair
        return false;
    }
    let left_tasks = tree.task_labels_under(left_branch);
    let right_tasks = tree.task_labels_under(right_branch);

    if !constraints.excludes_across(&left_tasks, &right_tasks) {
        let committed = trial_improving(tree, constraints, |candidate| {
            candidate.detach(left_branch);
            candidate.detach(right_branch);
            let parallel = candidate
                .add_operator_with_children(Operator::Parallel, vec![left_branch, right_branch]);
            candidate.attach(choice, parallel);
        });
        if committed {
            return true;
        }
    }

    // deeper insertion: confine the exclusivity conflict to a sub-node of one
    // branch and make the other branch its alternative
    let sides = [
        (left_branch, right_branch, left_tasks, right_tasks.clone()),
        (right_branch, left_branch, right_tasks, {
            tree.task_labels_under(left_branch)
        }),
    ];
    for (host, guest, host_tasks, guest_tasks) in sides {
        for site in tree.subtree_nodes(host) {
            if site == host {
                continue;
            }
            let site_tasks = tree.task_labels_under(site);
            if !constraints.excludes_across(&site_tasks, &guest_tasks) {
                // no conflict here; the whole-branch wrap already covered it
                continue;
            }
            let outside: std::collections::BTreeSet<String> = host_tasks
                .difference(&site_tasks)
                .cloned()
                .collect();
            if constraints.excludes_across(&outside, &guest_tasks) {
                continue;
            }
            let committed = trial_improving(tree, constraints, |candidate| {
                candidate.detach(guest);
                let wrapper = candidate.wrap(site, Operator::Choice);
                candidate.attach(wrapper, guest);
            });
            if committed {
                return true;
            }
        }
    }
    false
}
