//! Schema definitions shared by the netdep pipeline.
//!
//! This crate contains the data structures that flow between the pipeline's
//! phases:
//! - [`ssa`]: the SSA program model produced by the Go bridge and consumed by
//!   the call-graph walker
//! - [`CallTarget`] and [`BusCall`]: discovered call sites, the output of
//!   extraction and the input of matching
//! - [`AdjacencyList`] and friends: the final service dependency graph
//!
//! All types serialize to JSON. The output types also derive `JsonSchema`
//! so external consumers can validate the adjacency list.

mod graph;
pub mod ssa;
mod targets;
#[cfg(test)]
mod testutil;

#[doc(inline)]
pub use graph::*;
#[doc(inline)]
pub use targets::*;
