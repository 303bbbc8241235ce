//! Tree normalization and constraint-relaxation passes.
//!
//! Three passes share this module:
//!
//! - [`normalize`] - structural cleanup after every edit (collapse singleton
//!   wrappers, flatten nested same-operator nodes, drop empty wrappers)
//! - [`sequence`] - relaxes over-strict ordering introduced by direct
//!   placement, locally after one insertion and globally to a fixpoint
//! - [`choice`] - enlarges a choice so branches that other constraints require
//!   to co-occur can leave their mutual exclusion behind
//!
//! # Trial Protocol
//!
//! The relaxation passes never edit the committed tree directly. Every
//! candidate edit runs on a clone, is normalized, and is checked with the
//! [oracle](crate::oracle) against the whole working constraint set. Two
//! acceptance criteria exist:
//!
//! - [`trial`] commits only a fully consistent result — the merge engine's
//!   final word on a placement;
//! - [`trial_improving`] commits a result whose problematic set is a subset of
//!   what it was before (and strictly smaller unless it was already empty) —
//!   the reducers' stepping stone, which lets a multi-violation repair land
//!   one fix at a time without ever regressing a satisfied constraint.

pub mod choice;
mod normalize;
pub mod sequence;

pub use normalize::normalize;

use crate::constraint::ConstraintSet;
use crate::model::ProcessTree;
use crate::oracle;

/// Applies `edit` to a clone of `tree`; commits it only if the result
/// satisfies the entire constraint set.
///
/// The clone is normalized before the oracle runs. On rollback the committed
/// tree is untouched.
pub(crate) fn trial<F>(tree: &mut ProcessTree, constraints: &ConstraintSet, edit: F) -> bool
where
    F: FnOnce(&mut ProcessTree),
{
    let mut candidate = tree.clone();
    edit(&mut candidate);
    normalize(&mut candidate);
    if oracle::is_consistent(&candidate, constraints) {
        tracing::trace!(tree = %candidate, "trial committed");
        *tree = candidate;
        true
    } else {
        tracing::trace!("trial rolled back");
        false
    }
}

/// Applies `edit` to a clone of `tree`; commits it only if the problematic
/// set shrank and nothing previously satisfied broke.
///
/// On an already-consistent tree this degenerates to [`trial`]: the edit must
/// keep the tree consistent. On an inconsistent tree the edit must fix at
/// least one violation and introduce none.
pub(crate) fn trial_improving<F>(
    tree: &mut ProcessTree,
    constraints: &ConstraintSet,
    edit: F,
) -> bool
where
    F: FnOnce(&mut ProcessTree),
{
    let before = oracle::problematic_indices(tree, constraints);
    let mut candidate = tree.clone();
    edit(&mut candidate);
    normalize(&mut candidate);
    let after = oracle::problematic_indices(&candidate, constraints);
    let no_regression = after.iter().all(|index| before.contains(index));
    if no_regression && (after.len() < before.len() || before.is_empty()) {
        tracing::trace!(
            fixed = before.len() - after.len(),
            tree = %candidate,
            "improving trial committed"
        );
        *tree = candidate;
        true
    } else {
        tracing::trace!("improving trial rolled back");
        false
    }
}
