//! Arena-indexed directed graphs.
//!
//! The graph layer serves two customers: the **task dependency graph** the
//! loop extractor analyzes ([`TaskGraph`], keyed by task name) and the **flow
//! graph** the code generator emits ([`DirectedGraph`] over
//! [`FlowNode`](crate::codegen::FlowNode) data). Algorithms are written
//! against the access [`traits`] so both share them.
//!
//! # Architecture
//!
//! - [`ids`](NodeId) - strongly-typed `NodeId`/`EdgeId` arena indices
//! - [`DirectedGraph`] - adjacency lists in both directions, typed node and
//!   edge data, multigraph semantics
//! - [`traits`] - [`GraphBase`](traits::GraphBase),
//!   [`Successors`](traits::Successors), [`Predecessors`](traits::Predecessors)
//! - [`algorithms`] - traversal, topological sort, Tarjan SCC, cycle finding,
//!   reachability

pub mod algorithms;
mod directed;
mod ids;
mod tasks;
pub mod traits;

pub use directed::DirectedGraph;
pub use ids::{EdgeId, NodeId};
pub use tasks::TaskGraph;
