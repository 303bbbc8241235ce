//! Arena-backed process tree.
//!
//! This module provides [`ProcessTree`], the mutable tree every synthesis pass
//! operates on. Nodes live in an arena and are addressed by stable
//! [`NodeId`] indices; "parent" and "children" are index fields inside the
//! arena, so a node can never be copied without its arena and a deep copy is an
//! arena clone that preserves every id.
//!
//! # Link Discipline
//!
//! Every mutation goes through arena methods ([`attach`](ProcessTree::attach),
//! [`detach`](ProcessTree::detach), [`insert_child`](ProcessTree::insert_child),
//! [`replace`](ProcessTree::replace)) that repair both the child list and the
//! parent back-index in one call. Callers never fix pointers by hand, which
//! makes the "a node's recorded parent lists it exactly once" invariant
//! machine-checked rather than assumed. [`verify_links`](ProcessTree::verify_links)
//! re-checks the whole reachable tree and is asserted after every committed
//! merge.
//!
//! # Trial Mutations
//!
//! The synthesis passes test structural changes on a [`Clone`] of the committed
//! tree and only assign the clone back when the
//! [consistency oracle](crate::oracle) reports no violations. Since ids are
//! arena indices, the clone shares every id with the original.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;

use crate::model::{NodeId, Operator};
use crate::{Error, Result};

/// Per-node storage inside the arena.
#[derive(Debug, Clone)]
struct NodeData {
    /// Node kind
    op: Operator,
    /// Task name for leaves; derived display label for operators
    label: Option<String>,
    /// Back-index to the owning parent, `None` for the root and detached nodes
    parent: Option<NodeId>,
    /// Owned children, order-significant for `Sequence`
    children: Vec<NodeId>,
}

/// A mutable process tree over an arena of nodes.
///
/// The tree owns at most one root node. Detached nodes stay in the arena with
/// their id (ids are never reused) and simply become unreachable; they are not
/// part of the tree shape, the structural hash, or any traversal.
///
/// # Examples
///
/// ```rust
/// use flowforge::model::{Operator, ProcessTree};
///
/// // Sequence(A, Parallel(B, C))
/// let mut tree = ProcessTree::new();
/// let a = tree.add_task("A");
/// let b = tree.add_task("B");
/// let c = tree.add_task("C");
/// let par = tree.add_operator_with_children(Operator::Parallel, vec![b, c]);
/// let seq = tree.add_operator_with_children(Operator::Sequence, vec![a, par]);
/// tree.set_root(seq);
///
/// assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C))");
/// assert_eq!(tree.find_task("C"), Some(c));
/// ```
#[derive(Debug, Clone)]
pub struct ProcessTree {
    /// Node arena; indices are `NodeId`s and are never reused
    nodes: Vec<NodeData>,
    /// The unique root, `None` for an empty tree
    root: Option<NodeId>,
    /// Bumped on every structural mutation; keys the hash memo
    revision: u64,
    /// Memoized structural hash for the current revision
    hash_cache: RefCell<Option<(u64, String)>>,
}

impl Default for ProcessTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTree {
    /// Creates a new empty tree.
    #[must_use]
    pub fn new() -> Self {
        ProcessTree {
            nodes: Vec::new(),
            root: None,
            revision: 0,
            hash_cache: RefCell::new(None),
        }
    }

    /// Creates a tree consisting of a single task.
    #[must_use]
    pub fn with_task(label: &str) -> Self {
        let mut tree = Self::new();
        let task = tree.add_task(label);
        tree.set_root(task);
        tree
    }

    /// Bumps the revision counter, invalidating the hash memo.
    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Allocates a new task leaf in the arena, initially detached.
    ///
    /// # Returns
    ///
    /// The `NodeId` of the new node. The node has no parent until attached.
    pub fn add_task(&mut self, label: &str) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeData {
            op: Operator::Task,
            label: Some(label.to_string()),
            parent: None,
            children: Vec::new(),
        });
        self.touch();
        id
    }

    /// Allocates a new operator node in the arena, initially detached and
    /// childless.
    ///
    /// # Panics
    ///
    /// Panics if `op` is [`Operator::Task`]; tasks carry a label and are
    /// created with [`add_task`](Self::add_task).
    pub fn add_operator(&mut self, op: Operator) -> NodeId {
        assert!(
            op.is_structural(),
            "tasks are created with add_task, not add_operator"
        );
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeData {
            op,
            label: None,
            parent: None,
            children: Vec::new(),
        });
        self.touch();
        id
    }

    /// Allocates a new operator node and attaches the given children to it,
    /// in order.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`add_operator`](Self::add_operator)
    /// and [`attach`](Self::attach).
    pub fn add_operator_with_children(&mut self, op: Operator, children: Vec<NodeId>) -> NodeId {
        let id = self.add_operator(op);
        for child in children {
            self.attach(id, child);
        }
        id
    }

    /// Returns the root node, or `None` for an empty tree.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Makes `node` the root of the tree.
    ///
    /// The previous root, if any and different, becomes unreachable unless it
    /// is attached elsewhere first.
    ///
    /// # Panics
    ///
    /// Panics if `node` still has a parent; detach it first.
    pub fn set_root(&mut self, node: NodeId) {
        assert!(
            self.nodes[node.index()].parent.is_none(),
            "root must not have a parent (node {node})"
        );
        self.root = Some(node);
        self.touch();
    }

    /// Returns the operator of the given node.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not a valid arena index.
    #[must_use]
    pub fn op(&self, node: NodeId) -> Operator {
        self.nodes[node.index()].op
    }

    /// Returns the label of the given node, if any.
    ///
    /// Every task carries its name; operator nodes usually carry none.
    #[must_use]
    pub fn label(&self, node: NodeId) -> Option<&str> {
        self.nodes[node.index()].label.as_deref()
    }

    /// Returns the parent of the given node, `None` for the root and for
    /// detached nodes.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    /// Returns the ordered children of the given node.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.index()].children
    }

    /// Returns the number of arena slots, including detached nodes.
    ///
    /// Ids are never reused, so this counts every node ever created for this
    /// tree, not just the reachable ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Checks whether the given node id addresses an arena slot.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    /// Returns the position of `child` within `parent`'s child list.
    #[must_use]
    pub fn child_index(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.index()]
            .children
            .iter()
            .position(|&c| c == child)
    }

    /// Attaches `child` as the last child of `parent`, fixing both link
    /// directions.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a task, if `child` already has a parent, or if
    /// `parent == child`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        let len = self.nodes[parent.index()].children.len();
        self.insert_child(parent, len, child);
    }

    /// Attaches `child` at position `index` within `parent`'s child list,
    /// fixing both link directions.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is a task, if `child` already has a parent, if
    /// `parent == child`, or if `index` is past the end of the child list.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        assert_ne!(parent, child, "cannot attach a node to itself");
        assert!(
            self.nodes[parent.index()].op.is_structural(),
            "cannot attach children to a task (node {parent})"
        );
        assert!(
            self.nodes[child.index()].parent.is_none(),
            "node {child} already has a parent; detach it first"
        );
        self.nodes[parent.index()].children.insert(index, child);
        self.nodes[child.index()].parent = Some(parent);
        if self.root == Some(child) {
            self.root = None;
        }
        self.touch();
    }

    /// Detaches `node` from its parent, fixing both link directions.
    ///
    /// Detaching the root or an already-detached node is a no-op.
    ///
    /// # Returns
    ///
    /// The position the node held in its former parent's child list, or `None`
    /// if the node had no parent.
    ///
    /// # Panics
    ///
    /// Panics if the parent back-index and the child list disagree — that is an
    /// arena corruption, a bug in the engine.
    pub fn detach(&mut self, node: NodeId) -> Option<usize> {
        let parent = self.nodes[node.index()].parent?;
        let index = self
            .child_index(parent, node)
            .unwrap_or_else(|| panic!("arena corruption: {parent} does not list child {node}"));
        self.nodes[parent.index()].children.remove(index);
        self.nodes[node.index()].parent = None;
        self.touch();
        Some(index)
    }

    /// Puts `replacement` in `old`'s place: same parent, same position — or the
    /// root slot if `old` was the root. `old` ends up detached.
    ///
    /// # Panics
    ///
    /// Panics if `replacement` already has a parent, or if `old` is neither the
    /// root nor attached anywhere.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) {
        assert!(
            self.nodes[replacement.index()].parent.is_none(),
            "replacement {replacement} already has a parent"
        );
        if self.root == Some(old) {
            self.root = None;
            self.set_root(replacement);
        } else if let Some(parent) = self.nodes[old.index()].parent {
            let index = self.detach(old).expect("node was attached");
            self.insert_child(parent, index, replacement);
        } else {
            panic!("node {old} is neither attached nor the root");
        }
    }

    /// Wraps `node` in a fresh operator node that takes `node`'s place in the
    /// tree.
    ///
    /// # Returns
    ///
    /// The id of the new wrapper, with `node` as its only child.
    ///
    /// # Panics
    ///
    /// Panics if `node` is neither attached nor the root.
    pub fn wrap(&mut self, node: NodeId, op: Operator) -> NodeId {
        let wrapper = self.add_operator(op);
        if self.root == Some(node) {
            self.root = None;
            self.attach(wrapper, node);
            self.set_root(wrapper);
        } else {
            let parent = self.nodes[node.index()]
                .parent
                .unwrap_or_else(|| panic!("cannot wrap detached node {node}"));
            let index = self.detach(node).expect("node was attached");
            self.insert_child(parent, index, wrapper);
            self.attach(wrapper, node);
        }
        wrapper
    }

    /// Finds the first node (depth-first, pre-order from the root) whose label
    /// equals `label`.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<NodeId> {
        self.dfs()
            .find(|&id| self.nodes[id.index()].label.as_deref() == Some(label))
    }

    /// Finds the task leaf carrying the given name.
    #[must_use]
    pub fn find_task(&self, label: &str) -> Option<NodeId> {
        self.dfs().find(|&id| {
            self.nodes[id.index()].op == Operator::Task
                && self.nodes[id.index()].label.as_deref() == Some(label)
        })
    }

    /// Returns `true` if a task with the given name is reachable from the root.
    #[must_use]
    pub fn contains_task(&self, label: &str) -> bool {
        self.find_task(label).is_some()
    }

    /// Returns an iterator over the reachable nodes in depth-first pre-order.
    pub fn dfs(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            for &child in self.nodes[node.index()].children.iter().rev() {
                stack.push(child);
            }
            Some(node)
        })
    }

    /// Returns the ancestor chain of `node`, nearest first, excluding `node`
    /// itself.
    #[must_use]
    pub fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes[node.index()].parent;
        while let Some(id) = current {
            chain.push(id);
            current = self.nodes[id.index()].parent;
        }
        chain
    }

    /// Returns `true` if `ancestor` lies on the parent chain of `node`
    /// (a node is not its own ancestor).
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes[node.index()].parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes[id.index()].parent;
        }
        false
    }

    /// Returns `true` if `node` lies in the subtree below `ancestor`.
    #[must_use]
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        self.is_ancestor(ancestor, node)
    }

    /// Computes the least common ancestor of the given nodes.
    ///
    /// Walks the first node's ancestor chain upward until it finds a node that
    /// is an ancestor-or-self of every other input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCommonAncestor`] when the nodes share no ancestor —
    /// which signals an unmergeable constraint set upstream — and
    /// [`Error::NotFound`] when called with an empty slice.
    pub fn least_common_ancestor(&self, nodes: &[NodeId]) -> Result<NodeId> {
        let (&first, rest) = nodes
            .split_first()
            .ok_or_else(|| Error::NotFound("least_common_ancestor of no nodes".into()))?;
        let mut candidate = Some(first);
        while let Some(id) = candidate {
            if rest
                .iter()
                .all(|&other| other == id || self.is_ancestor(id, other))
            {
                return Ok(id);
            }
            candidate = self.nodes[id.index()].parent;
        }
        Err(Error::NoCommonAncestor)
    }

    /// Returns the child of `ancestor` whose subtree contains `node`.
    ///
    /// Returns `node` itself if it is a direct child, `None` if `ancestor` is
    /// not actually an ancestor of `node`.
    #[must_use]
    pub fn branch_toward(&self, ancestor: NodeId, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            let parent = self.nodes[current.index()].parent?;
            if parent == ancestor {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Returns every node of the subtree rooted at `node`, depth-first
    /// pre-order, `node` itself first.
    #[must_use]
    pub fn subtree_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            nodes.push(id);
            for &child in self.nodes[id.index()].children.iter().rev() {
                stack.push(child);
            }
        }
        nodes
    }

    /// Returns the task leaves reachable from `node`, depth-first pre-order.
    #[must_use]
    pub fn tasks_under(&self, node: NodeId) -> Vec<NodeId> {
        let mut tasks = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if self.nodes[id.index()].op == Operator::Task {
                tasks.push(id);
            }
            for &child in self.nodes[id.index()].children.iter().rev() {
                stack.push(child);
            }
        }
        tasks
    }

    /// Returns the set of task names reachable from `node`.
    #[must_use]
    pub fn task_labels_under(&self, node: NodeId) -> BTreeSet<String> {
        self.tasks_under(node)
            .into_iter()
            .filter_map(|id| self.nodes[id.index()].label.clone())
            .collect()
    }

    /// Verifies the parent/child link invariant over the reachable tree.
    ///
    /// Checks that the root has no parent, that every child's parent back-index
    /// names the node that lists it, and that no node is listed as a child
    /// twice. The merge engine asserts this after every committed step.
    #[must_use]
    pub fn verify_links(&self) -> bool {
        let Some(root) = self.root else {
            return true;
        };
        if self.nodes[root.index()].parent.is_some() {
            return false;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if seen[id.index()] {
                // reached twice: listed under two parents or a cycle
                return false;
            }
            seen[id.index()] = true;
            for &child in &self.nodes[id.index()].children {
                if self.nodes[child.index()].parent != Some(id) {
                    return false;
                }
                stack.push(child);
            }
        }
        true
    }

    /// Returns the memoized structural hash of the tree.
    ///
    /// The hash is a post-order string encoding of the tree shape: tasks encode
    /// as their name, operators as `CODE(child,child,…)`. The child encodings
    /// of commutative operators (`Parallel`, `Choice`) are sorted before
    /// joining, so equal shapes hash equally regardless of child order. Used
    /// for deduplication and equality of trees.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use flowforge::model::{Operator, ProcessTree};
    ///
    /// let mut tree = ProcessTree::new();
    /// let b = tree.add_task("B");
    /// let a = tree.add_task("A");
    /// let par = tree.add_operator_with_children(Operator::Parallel, vec![b, a]);
    /// tree.set_root(par);
    ///
    /// // child order does not matter for Parallel
    /// assert_eq!(tree.structural_hash(), "PAR(A,B)");
    /// ```
    #[must_use]
    pub fn structural_hash(&self) -> String {
        if let Some((revision, hash)) = self.hash_cache.borrow().as_ref() {
            if *revision == self.revision {
                return hash.clone();
            }
        }
        let hash = match self.root {
            Some(root) => self.encode(root),
            None => String::new(),
        };
        *self.hash_cache.borrow_mut() = Some((self.revision, hash.clone()));
        hash
    }

    /// Encodes the subtree rooted at `node` in structural-hash form.
    #[must_use]
    pub fn encode(&self, node: NodeId) -> String {
        let data = &self.nodes[node.index()];
        match data.op {
            Operator::Task => data.label.clone().unwrap_or_default(),
            op => {
                let mut parts: Vec<String> =
                    data.children.iter().map(|&c| self.encode(c)).collect();
                if op.is_commutative() {
                    parts.sort();
                }
                format!("{}({})", op.code(), parts.join(","))
            }
        }
    }
}

impl fmt::Display for ProcessTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.structural_hash())
    }
}
