//! Node identity and operator types for process trees.
//!
//! This module provides [`NodeId`], a strongly-typed identifier for nodes within
//! a [`ProcessTree`](crate::model::ProcessTree) arena, and [`Operator`], the
//! discriminant over the node kinds a process tree is built from.

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

/// A strongly-typed identifier for nodes within a process tree arena.
///
/// `NodeId` wraps a `usize` index into the tree's node arena, providing type
/// safety to prevent accidental mixing of node indices with other integer
/// values. Ids are assigned sequentially starting from 0 when nodes are created
/// and are **never reused**: a node detached from the tree keeps its id and
/// simply becomes unreachable.
///
/// Because ids are arena indices, a deep copy of a tree ([`ProcessTree::clone`])
/// preserves every id — trial mutations can be mapped back onto the committed
/// tree without any translation step.
///
/// # Examples
///
/// ```rust
/// use flowforge::model::{NodeId, Operator, ProcessTree};
///
/// let mut tree = ProcessTree::new();
/// let a: NodeId = tree.add_task("A");
/// let b: NodeId = tree.add_task("B");
///
/// assert_ne!(a, b);
///
/// // NodeIds can be used as keys in collections
/// use std::collections::HashMap;
/// let mut data: HashMap<NodeId, i32> = HashMap::new();
/// data.insert(a, 42);
/// ```
///
/// [`ProcessTree::clone`]: crate::model::ProcessTree
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// This constructor is primarily intended for internal use and testing.
    /// Normal usage should obtain `NodeId` values from
    /// [`ProcessTree::add_task`](crate::model::ProcessTree::add_task) and
    /// [`ProcessTree::add_operator`](crate::model::ProcessTree::add_operator).
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw arena index of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}

/// The kind of a process tree node.
///
/// A process tree composes named tasks with four structural operators. Child
/// ordering is significant only for [`Operator::Sequence`];
/// [`Operator::Parallel`] and [`Operator::Choice`] children are unordered sets,
/// which the [structural hash](crate::model::ProcessTree::structural_hash)
/// accounts for by sorting their child encodings.
///
/// The loop family is three-layered by construction: a [`Operator::Loop`] node
/// has exactly one [`Operator::LoopMandatory`] child (the body that runs at
/// least once per iteration and on the exit path) and at most one
/// [`Operator::LoopOptional`] child (the tail that may run zero or more times
/// before looping back or exiting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
pub enum Operator {
    /// An atomic named unit of work; always a leaf.
    #[strum(serialize = "task")]
    Task,
    /// Ordered composition — children execute left-to-right.
    #[strum(serialize = "sequence")]
    Sequence,
    /// Unordered composition — children execute independently.
    #[strum(serialize = "parallel")]
    Parallel,
    /// Mutually exclusive composition — exactly one child executes.
    #[strum(serialize = "choice")]
    Choice,
    /// Repeatable composition with a mandatory and an optional body.
    #[strum(serialize = "loop")]
    Loop,
    /// The mandatory body of a loop; runs once per iteration.
    #[strum(serialize = "loop-mandatory")]
    LoopMandatory,
    /// The optional tail of a loop; may run zero or more times.
    #[strum(serialize = "loop-optional")]
    LoopOptional,
}

impl Operator {
    /// Returns `true` if child ordering is irrelevant for this operator.
    ///
    /// Commutative operators hash identically under any permutation of their
    /// children.
    #[must_use]
    pub const fn is_commutative(self) -> bool {
        matches!(self, Operator::Parallel | Operator::Choice)
    }

    /// Returns `true` for the loop family of operators.
    ///
    /// Loop-family nodes are structural markers that the
    /// [reductor](crate::reduce::normalize) must never collapse: a
    /// `Loop(LoopMandatory(x))` wrapper is meaningful even with a single child.
    #[must_use]
    pub const fn is_loop_family(self) -> bool {
        matches!(
            self,
            Operator::Loop | Operator::LoopMandatory | Operator::LoopOptional
        )
    }

    /// Returns `true` if this operator may carry children.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        !matches!(self, Operator::Task)
    }

    /// Short mnemonic used by the structural hash encoding.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Operator::Task => "T",
            Operator::Sequence => "SEQ",
            Operator::Parallel => "PAR",
            Operator::Choice => "XOR",
            Operator::Loop => "LOOP",
            Operator::LoopMandatory => "MAND",
            Operator::LoopOptional => "OPT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn test_node_id_roundtrip() {
        let node = NodeId::new(42);
        assert_eq!(node.index(), 42);

        let from_usize: NodeId = 7usize.into();
        assert_eq!(from_usize.index(), 7);

        let back: usize = node.into();
        assert_eq!(back, 42);
    }

    #[test]
    fn test_node_id_ordering_and_hash() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);
        assert!(a < b);

        let mut set: HashSet<NodeId> = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(NodeId::new(1));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(3);
        assert_eq!(format!("{node:?}"), "NodeId(3)");
        assert_eq!(format!("{node}"), "n3");
    }

    #[test]
    fn test_operator_commutativity() {
        assert!(Operator::Parallel.is_commutative());
        assert!(Operator::Choice.is_commutative());
        assert!(!Operator::Sequence.is_commutative());
        assert!(!Operator::Task.is_commutative());
        assert!(!Operator::Loop.is_commutative());
    }

    #[test]
    fn test_operator_loop_family() {
        assert!(Operator::Loop.is_loop_family());
        assert!(Operator::LoopMandatory.is_loop_family());
        assert!(Operator::LoopOptional.is_loop_family());
        assert!(!Operator::Sequence.is_loop_family());
    }

    #[test]
    fn test_operator_codes_unique() {
        let codes: HashSet<&str> = Operator::iter().map(Operator::code).collect();
        assert_eq!(codes.len(), Operator::iter().count());
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(Operator::Sequence.to_string(), "sequence");
        assert_eq!(Operator::LoopMandatory.to_string(), "loop-mandatory");
    }
}
