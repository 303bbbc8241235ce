//! Convenient re-exports of the most commonly used types.
//!
//! This module provides a curated selection of the most frequently used types
//! from across the crate, allowing for convenient glob imports:
//!
//! ```rust
//! use flowforge::prelude::*;
//!
//! let outcome = parse_lines("A > B\nA > C").unwrap();
//! let tree = Synthesizer::default()
//!     .synthesize(outcome.constraints, outcome.loops)
//!     .unwrap();
//! assert_eq!(tree.structural_hash(), "SEQ(A,PAR(B,C))");
//! ```

pub use crate::codegen::{generate, FlowGraph, FlowNode, GatewayRole};
pub use crate::constraint::{Constraint, ConstraintSet, Relation};
pub use crate::graph::TaskGraph;
pub use crate::loops::{LoopDeclaration, LoopShape};
pub use crate::model::{NodeId, Operator, ProcessTree};
pub use crate::parse::{parse_lines, ParseOutcome};
pub use crate::synth::{SynthesisFlags, SynthesisOptions, Synthesizer};
pub use crate::{Error, Result};
