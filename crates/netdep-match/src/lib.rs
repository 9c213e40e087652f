//! Service dependency graph from discovered network calls.
//!
//! This crate takes the clients, endpoints and message-bus calls found by
//! `netdep-extract`, binds each client to the service serving its URL, and
//! produces a [`NodeGraph`] of services. Its serialized form is the
//! [`AdjacencyList`] printed by the `netdep` binary.
//!
//! ## Usage
//!
//! ```
//! use netdep_match::{Discovery, run};
//!
//! let mut output = Vec::new();
//! run(&Discovery::default(), &mut output).unwrap();
//! assert_eq!(String::from_utf8(output).unwrap(), "{}\n");
//! ```

mod error;
mod graph;
mod matcher;

use std::io::Write;

#[doc(inline)]
pub use netdep_schemas::{AdjacencyList, Discovery, NetworkCall, PeerCalls, ServiceNode};
use tracing::debug_span;

#[doc(inline)]
pub use crate::error::MatchError;
use crate::error::MatchErrorKind;
pub use crate::graph::{ConnectionEdge, NodeGraph};
pub use crate::matcher::{DEFAULT_PORT, build_graph};

/// Matches a discovery and writes the adjacency list as pretty JSON.
///
/// # Errors
///
/// Returns [`MatchError`] if serialization or writing fails.
pub fn run(discovery: &Discovery, mut output: impl Write) -> Result<(), MatchError> {
    let _span = debug_span!("run").entered();

    let adjacency = build_graph(discovery).to_adjacency_list();
    serde_json::to_writer_pretty(&mut output, &adjacency)
        .map_err(|e| MatchError::new(MatchErrorKind::Serialization(e)))?;
    writeln!(output)?;

    Ok(())
}
