//! The synthesis driver.
//!
//! [`Synthesizer`] orchestrates the whole pipeline:
//!
//! 1. build the task dependency graph from the `Before` constraints;
//! 2. [extract](crate::loops::extract) the repeatable regions and drop the
//!    `Before` constraints that correspond to their back edges — the working
//!    set stays acyclic;
//! 3. fold every remaining constraint into the growing tree with the
//!    [merge engine](crate::merge) (local relaxation runs inside each step);
//! 4. [regenerate](crate::loops::regenerate) each loop region;
//! 5. run global sequence and choice reduction to a fixpoint and normalize;
//! 6. validate with the [oracle](crate::oracle) — any problematic constraint
//!    at this point fails the whole run.
//!
//! Progress is reported through `tracing` at each phase boundary; no phase
//! depends on a subscriber being installed.

use std::collections::HashSet;

use bitflags::bitflags;

use crate::constraint::{Constraint, ConstraintSet, Relation};
use crate::graph::TaskGraph;
use crate::loops::{self, LoopDeclaration};
use crate::merge;
use crate::model::{Operator, ProcessTree};
use crate::oracle;
use crate::reduce::{choice, normalize, sequence};
use crate::Result;

bitflags! {
    /// Behavior switches for a synthesis run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SynthesisFlags: u32 {
        /// When a loop region cannot be isolated, fold everything under its
        /// ancestor into the mandatory body instead of failing. Lossy (the
        /// repeatable region is over-approximated) but safe.
        const LOSSY_LOOP_FALLBACK = 1 << 0;
        /// Skip the global reduction fixpoint after loop regeneration. The
        /// result stays consistent but may over-sequence unconstrained tasks;
        /// useful when diagnosing a reduction pass.
        const SKIP_GLOBAL_REDUCTION = 1 << 1;
    }
}

/// Configuration for a synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Behavior flags; the default enables the lossy loop fallback.
    pub flags: SynthesisFlags,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        SynthesisOptions {
            flags: SynthesisFlags::LOSSY_LOOP_FALLBACK,
        }
    }
}

/// Synthesizes one consistent process tree from pairwise constraints.
///
/// # Examples
///
/// ```rust
/// use flowforge::{Constraint, Relation, Synthesizer};
///
/// let constraints = vec![
///     Constraint::new(Relation::Before, "receive", "check"),
///     Constraint::new(Relation::Before, "check", "ship"),
/// ];
/// let tree = Synthesizer::default()
///     .synthesize(constraints, Vec::new())
///     .unwrap();
/// assert_eq!(tree.structural_hash(), "SEQ(receive,check,ship)");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer {
    options: SynthesisOptions,
}

impl Synthesizer {
    /// Creates a synthesizer with the given options.
    #[must_use]
    pub fn new(options: SynthesisOptions) -> Self {
        Synthesizer { options }
    }

    /// Runs the full pipeline over the given constraints and declared loops.
    ///
    /// Constraints are folded in their given order, which makes the result
    /// deterministic and explainable from the input sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contradictory`](crate::Error::Contradictory) when a
    /// constraint cannot be merged, a loop region cannot be isolated (with the
    /// lossy fallback disabled), or the final validation finds a problematic
    /// constraint.
    pub fn synthesize(
        &self,
        constraints: Vec<Constraint>,
        declared: Vec<LoopDeclaration>,
    ) -> Result<ProcessTree> {
        let full_set: ConstraintSet = constraints.iter().cloned().collect();
        let graph = TaskGraph::from_constraints(&full_set);
        tracing::debug!(
            tasks = graph.task_count(),
            dependencies = graph.dependency_count(),
            "dependency graph built"
        );

        let extraction = loops::extract(&graph, &declared);
        tracing::debug!(loops = extraction.shapes.len(), "loop extraction done");

        // the working set is the input minus the cycle-closing orderings
        let back_edges: HashSet<(String, String)> =
            extraction.back_edges.iter().cloned().collect();
        let mut working = ConstraintSet::new();
        for constraint in constraints {
            let closes_cycle = constraint.relation() == Relation::Before
                && back_edges
                    .contains(&(constraint.left().to_string(), constraint.right().to_string()));
            if closes_cycle {
                tracing::debug!(constraint = %constraint, "dropped as loop back edge");
                continue;
            }
            working.insert(constraint);
        }
        infer_loop_exit_orderings(&mut working, &graph, &extraction);

        // acyclic skeleton: fold the constraints in order
        let mut tree = ProcessTree::new();
        for index in 0..working.len() {
            let constraint = working
                .get(index)
                .expect("iterating the set by index")
                .clone();
            merge::merge(&mut tree, &working, &constraint)?;
        }
        tracing::debug!(tree = %tree, "skeleton built");

        // loop reintegration
        let lossy = self
            .options
            .flags
            .contains(SynthesisFlags::LOSSY_LOOP_FALLBACK);
        for shape in &extraction.shapes {
            for member in shape.members() {
                ensure_placed(&mut tree, &member);
            }
            loops::regenerate(&mut tree, &working, shape, lossy)?;
        }
        tracing::debug!(tree = %tree, "loops reintegrated");

        // global relaxation to a fixpoint, then final cleanup
        if !self
            .options
            .flags
            .contains(SynthesisFlags::SKIP_GLOBAL_REDUCTION)
        {
            sequence::reduce_global(&mut tree, &working);
            choice::reduce_global(&mut tree, &working);
        }
        normalize(&mut tree);

        if let Some(index) = oracle::first_problematic(&tree, &working) {
            let unsatisfied = working.get(index).expect("index from the same set");
            return Err(contradiction!(
                "synthesis left {unsatisfied} unsatisfied in {tree}"
            ));
        }
        tracing::debug!(tree = %tree, "synthesis complete");
        Ok(tree)
    }
}

/// Infers `Before(member, follower)` for every loop member against every task
/// a loop exit leads to outside the region.
///
/// The whole loop runs before whatever its exits flow into; recording that
/// explicitly keeps placement and relaxation from entangling members with
/// followers before regeneration can isolate the region. Pairs some input
/// constraint already relates are left alone.
fn infer_loop_exit_orderings(
    working: &mut ConstraintSet,
    graph: &TaskGraph,
    extraction: &loops::Extraction,
) {
    let mut related: HashSet<(String, String)> = working
        .iter()
        .map(|constraint| pair_key(constraint.left(), constraint.right()))
        .collect();

    for shape in &extraction.shapes {
        let mut followers: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();
        for exit in &shape.exits {
            let Some(exit_node) = graph.node_of(exit) else {
                continue;
            };
            for succ in graph.inner().successors(exit_node) {
                let Some(name) = graph.name_of(succ) else {
                    continue;
                };
                if !shape.contains(name) {
                    followers.insert(name.to_string());
                }
            }
        }
        for member in shape.members() {
            for follower in &followers {
                if related.insert(pair_key(&member, follower)) {
                    let inferred = Constraint::new(Relation::Before, &member, follower);
                    tracing::debug!(constraint = %inferred, "inferred loop-exit ordering");
                    working.insert(inferred);
                }
            }
        }
    }
}

/// Unordered name pair, for "is this pair already constrained" checks.
fn pair_key(left: &str, right: &str) -> (String, String) {
    if left <= right {
        (left.to_string(), right.to_string())
    } else {
        (right.to_string(), left.to_string())
    }
}

/// Places a task that only loop declarations mention: it joins as a parallel
/// sibling of the whole tree, like a fresh constraint pair would.
fn ensure_placed(tree: &mut ProcessTree, label: &str) {
    if tree.contains_task(label) {
        return;
    }
    let task = tree.add_task(label);
    match tree.root() {
        None => tree.set_root(task),
        Some(root) => {
            if tree.op(root) == Operator::Parallel {
                tree.attach(root, task);
            } else {
                let parallel = tree.add_operator(Operator::Parallel);
                tree.replace(root, parallel);
                tree.attach(parallel, root);
                tree.attach(parallel, task);
            }
        }
    }
}
