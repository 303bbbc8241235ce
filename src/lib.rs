// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # flowforge
//!
//! [![Crates.io](https://img.shields.io/crates/v/flowforge.svg)](https://crates.io/crates/flowforge)
//! [![Documentation](https://docs.rs/flowforge/badge.svg)](https://docs.rs/flowforge)
//! [![License](https://img.shields.io/badge/license-Apache--2.0-blue.svg)](https://github.com/BinFlip/flowforge/blob/main/LICENSE-APACHE)
//!
//! Synthesis of a single consistent process model — a tree of sequence,
//! parallel, choice and loop operators over named tasks — from a set of
//! independently stated pairwise ordering constraints ("A before B", "A and B
//! in parallel", "A or B mutually exclusive", "A repeats"). Constraints of
//! that kind are individually simple but collectively incomplete, redundant,
//! or contradictory with respect to one tree structure; `flowforge` resolves
//! them through incremental merging with trial mutation: copy, mutate,
//! verify, commit-or-rollback.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowforge::{Constraint, Relation, Synthesizer};
//!
//! let constraints = vec![
//!     Constraint::new(Relation::Before, "receive", "check"),
//!     Constraint::new(Relation::Before, "receive", "pack"),
//!     Constraint::new(Relation::Before, "check", "ship"),
//!     Constraint::new(Relation::Before, "pack", "ship"),
//! ];
//! let tree = Synthesizer::default()
//!     .synthesize(constraints, Vec::new())
//!     .unwrap();
//!
//! // check and pack are unordered against each other and run in parallel
//! assert_eq!(tree.structural_hash(), "SEQ(receive,PAR(check,pack),ship)");
//! ```
//!
//! ### From Constraint Expressions
//!
//! ```rust
//! use flowforge::parse::parse_lines;
//! use flowforge::Synthesizer;
//!
//! let outcome = parse_lines("plan > build > test\nbuild > document").unwrap();
//! let tree = Synthesizer::default()
//!     .synthesize(outcome.constraints, outcome.loops)
//!     .unwrap();
//! assert!(tree.contains_task("document"));
//! ```
//!
//! ### To a Flow Graph
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use flowforge::codegen::generate;
//! use flowforge::{Constraint, Relation, Synthesizer};
//!
//! let tree = Synthesizer::default()
//!     .synthesize(
//!         vec![Constraint::new(Relation::Before, "A", "B")],
//!         Vec::new(),
//!     )
//!     .unwrap();
//! let flow = generate(&tree, &HashMap::new()).unwrap();
//! println!("{}", flow.to_dot());
//! ```
//!
//! ## Architecture
//!
//! The pipeline, leaf-first:
//!
//! - [`model`] - the arena-backed process tree: typed nodes with stable ids,
//!   machine-checked parent/child links, id-preserving deep copy, and a
//!   commutativity-aware structural hash
//! - [`reduce`] - normalization after every edit, plus the sequence and
//!   choice relaxation passes that rearrange shape without breaking satisfied
//!   constraints
//! - [`oracle`] - the consistency oracle: which constraints does a tree
//!   violate?
//! - [`merge`] - folds one binary constraint into the growing tree,
//!   case-split on endpoint presence, every branch trial-verified
//! - [`graph`] - arena-indexed directed graphs with traversal, Tarjan SCC,
//!   cycle detection and reachability
//! - [`loops`] - extraction of repeatable regions from the dependency graph
//!   and their regeneration as `Loop` constructs
//! - [`synth`] - the driver orchestrating the whole run
//! - [`parse`] - the constraint expression parser (upstream collaborator)
//! - [`codegen`] - the tree-to-flow-graph lowering (downstream collaborator)
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Contradictory
//! constraint sets surface as [`Error::Contradictory`] with the offending
//! constraint and the tree shape at failure time; a failed step never mutates
//! the committed tree. Internal invariant violations (arena corruption, a
//! relaxation that was satisfiable by construction finding no candidate)
//! panic — they are engine bugs, not input errors.
//!
//! ## Determinism
//!
//! One input, one output: constraints fold in their given order, relaxation
//! candidates are tried in a fixed priority, and every unordered traversal is
//! sorted. There is no guarantee of finding *a* valid tree when the input is
//! genuinely unsatisfiable, and no optimality among multiple valid trees —
//! only a deterministic, explainable one.

#[macro_use]
pub(crate) mod error;

pub mod codegen;
pub mod constraint;
pub mod graph;
pub mod loops;
pub mod merge;
pub mod model;
pub mod oracle;
pub mod parse;
pub mod reduce;
pub mod synth;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use flowforge::prelude::*;
///
/// let tree = Synthesizer::default()
///     .synthesize(vec![Constraint::new(Relation::Before, "A", "B")], Vec::new())
///     .unwrap();
/// assert_eq!(tree.structural_hash(), "SEQ(A,B)");
/// ```
pub mod prelude;

/// `flowforge` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`]. This is used consistently throughout the crate for all
/// fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `flowforge` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for
/// the variants and their meaning.
pub use error::Error;

pub use constraint::{Constraint, ConstraintSet, Relation};
pub use synth::{Synthesizer, SynthesisFlags, SynthesisOptions};
