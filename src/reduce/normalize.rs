//! Tree normalization (the reductor).
//!
//! Every structural edit leaves debris: operator nodes with a single child,
//! empty wrappers, a `Sequence` nested directly inside a `Sequence`. The
//! reductor removes it, and every other pass assumes it has run:
//!
//! - childless `Sequence`/`Parallel`/`Choice` wrappers are removed
//! - a `Sequence`/`Parallel`/`Choice` wrapper with exactly one child is
//!   collapsed — the child takes the wrapper's place, including at the root
//! - a child with the same operator as its parent is flattened — its children
//!   are spliced into the parent at the child's position
//!
//! Loop-family nodes are never collapsed: `Loop(LoopMandatory(x))` is
//! meaningful structure even with a single child. Their descendants are
//! normalized as usual.
//!
//! Normalization is idempotent: a second run changes nothing.

use crate::model::{NodeId, ProcessTree};

/// Normalizes the tree in place, bottom-up, to a fixpoint.
///
/// # Examples
///
/// ```rust
/// use flowforge::model::{Operator, ProcessTree};
/// use flowforge::reduce::normalize;
///
/// // SEQ(A, SEQ(B, C)) flattens to SEQ(A, B, C)
/// let mut tree = ProcessTree::new();
/// let a = tree.add_task("A");
/// let b = tree.add_task("B");
/// let c = tree.add_task("C");
/// let inner = tree.add_operator_with_children(Operator::Sequence, vec![b, c]);
/// let outer = tree.add_operator_with_children(Operator::Sequence, vec![a, inner]);
/// tree.set_root(outer);
///
/// normalize(&mut tree);
/// assert_eq!(tree.structural_hash(), "SEQ(A,B,C)");
/// ```
pub fn normalize(tree: &mut ProcessTree) {
    while normalize_once(tree) {}
}

/// Runs one normalization sweep; returns `true` if anything changed.
fn normalize_once(tree: &mut ProcessTree) -> bool {
    let mut changed = false;
    // snapshot ids: the sweep mutates the tree as it goes
    let ids: Vec<NodeId> = tree.dfs().collect();
    for id in ids.into_iter().rev() {
        // skip nodes an earlier rewrite already detached
        if tree.parent(id).is_none() && tree.root() != Some(id) {
            continue;
        }
        let op = tree.op(id);
        if !op.is_structural() || op.is_loop_family() {
            continue;
        }

        if tree.children(id).is_empty() {
            if tree.root() != Some(id) {
                tree.detach(id);
                changed = true;
            }
            continue;
        }

        if tree.children(id).len() == 1 {
            let child = tree.children(id)[0];
            tree.detach(child);
            tree.replace(id, child);
            changed = true;
            continue;
        }

        let children: Vec<NodeId> = tree.children(id).to_vec();
        for child in children {
            if tree.op(child) == op {
                let index = tree
                    .child_index(id, child)
                    .expect("snapshot child still attached");
                let grandchildren: Vec<NodeId> = tree.children(child).to_vec();
                tree.detach(child);
                for (offset, grandchild) in grandchildren.into_iter().enumerate() {
                    tree.detach(grandchild);
                    tree.insert_child(id, index + offset, grandchild);
                }
                changed = true;
            }
        }
    }
    changed
}
