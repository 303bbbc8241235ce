//! Loop extraction and regeneration.
//!
//! Repeatable behavior enters the pipeline in two forms: structurally, as
//! cycles in the task dependency graph, and explicitly, as declared
//! mandatory/optional member sets. The [extractor](extract) unifies both into
//! [`LoopShape`]s and reports the cycle-closing back edges; after the acyclic
//! skeleton is built, the [regenerator](regenerate) rewrites each shape's
//! region into a `Loop(LoopMandatory, LoopOptional)` construct.

mod extract;
mod info;
mod regenerate;

pub use extract::{extract, Extraction};
pub use info::{LoopDeclaration, LoopShape};
pub use regenerate::regenerate;
