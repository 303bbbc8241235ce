//! Loop descriptions.
//!
//! [`LoopShape`] is what the [extractor](crate::loops::extract) produces from
//! graph reachability and what the [regenerator](crate::loops::regenerate)
//! consumes: a repeatable region partitioned into an entry, exit(s), a
//! mandatory core and an optional tail. [`LoopDeclaration`] is the explicitly
//! declared form the expression parser emits for `*` expressions; declarations
//! merge into detected shapes when their member sets overlap.

use std::collections::BTreeSet;

/// An explicitly declared loop: mandatory and optional member names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopDeclaration {
    /// Tasks that run on every iteration.
    pub mandatory: BTreeSet<String>,
    /// Tasks that may run zero or more times before looping back.
    pub optional: BTreeSet<String>,
}

impl LoopDeclaration {
    /// Creates a declaration from mandatory and optional name iterators.
    #[must_use]
    pub fn new<M, O>(mandatory: M, optional: O) -> Self
    where
        M: IntoIterator<Item = String>,
        O: IntoIterator<Item = String>,
    {
        LoopDeclaration {
            mandatory: mandatory.into_iter().collect(),
            optional: optional.into_iter().collect(),
        }
    }

    /// All member names, mandatory and optional.
    #[must_use]
    pub fn members(&self) -> BTreeSet<String> {
        self.mandatory.union(&self.optional).cloned().collect()
    }
}

/// A repeatable region of the task dependency graph.
///
/// The three name sets are disjoint by construction: `mandatory` holds the
/// nodes on the entry-to-exit path (executed once per iteration and on the way
/// out), `optional` the nodes between the exit and the jump back to the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopShape {
    /// The unique entry task of the region.
    pub entry: String,
    /// Exit task(s), sorted; empty for declared-only loops with no graph
    /// structure.
    pub exits: Vec<String>,
    /// Tasks executed once per iteration and on the exit path.
    pub mandatory: BTreeSet<String>,
    /// Tasks executed after the exit point, before looping back.
    pub optional: BTreeSet<String>,
}

impl LoopShape {
    /// All member names, mandatory and optional.
    #[must_use]
    pub fn members(&self) -> BTreeSet<String> {
        self.mandatory.union(&self.optional).cloned().collect()
    }

    /// Returns `true` if the given task belongs to this loop.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.mandatory.contains(name) || self.optional.contains(name)
    }

    /// Returns `true` if any member name also appears in `names`.
    #[must_use]
    pub fn overlaps(&self, names: &BTreeSet<String>) -> bool {
        self.mandatory.iter().any(|name| names.contains(name))
            || self.optional.iter().any(|name| names.contains(name))
    }

    /// Folds a declaration into this shape.
    ///
    /// Mandatory wins over optional on conflict: a task declared mandatory
    /// anywhere ends up mandatory, and the optional set is reduced
    /// accordingly.
    pub fn absorb(&mut self, declaration: &LoopDeclaration) {
        self.mandatory.extend(declaration.mandatory.iter().cloned());
        self.optional.extend(declaration.optional.iter().cloned());
        self.optional = self
            .optional
            .difference(&self.mandatory)
            .cloned()
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_declaration_members() {
        let declaration = LoopDeclaration::new(
            ["A".to_string(), "B".to_string()],
            ["C".to_string()],
        );
        assert_eq!(declaration.members(), names(&["A", "B", "C"]));
    }

    #[test]
    fn test_shape_membership() {
        let shape = LoopShape {
            entry: "A".to_string(),
            exits: vec!["C".to_string()],
            mandatory: names(&["A", "B", "C"]),
            optional: names(&["D"]),
        };
        assert!(shape.contains("A"));
        assert!(shape.contains("D"));
        assert!(!shape.contains("E"));
        assert_eq!(shape.members(), names(&["A", "B", "C", "D"]));
    }

    #[test]
    fn test_shape_overlap() {
        let shape = LoopShape {
            entry: "A".to_string(),
            exits: Vec::new(),
            mandatory: names(&["A", "B"]),
            optional: BTreeSet::new(),
        };
        assert!(shape.overlaps(&names(&["B", "X"])));
        assert!(!shape.overlaps(&names(&["X", "Y"])));
    }

    #[test]
    fn test_absorb_mandatory_wins() {
        let mut shape = LoopShape {
            entry: "A".to_string(),
            exits: Vec::new(),
            mandatory: names(&["A"]),
            optional: names(&["B", "C"]),
        };
        // B is declared mandatory elsewhere; D arrives as new optional
        shape.absorb(&LoopDeclaration::new(
            ["B".to_string()],
            ["D".to_string()],
        ));

        assert_eq!(shape.mandatory, names(&["A", "B"]));
        assert_eq!(shape.optional, names(&["C", "D"]));
    }
}
