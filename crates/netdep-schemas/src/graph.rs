//! Service dependency graph schema.
//!
//! The matcher joins client calls to endpoints and produces a graph whose
//! nodes are services and whose edges are individual network calls. The
//! serialized form is an [`AdjacencyList`]: for every service, the peers it
//! calls together with the calls made to each.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of the node every unmatched or unresolved call points to.
pub const UNKNOWN_SERVICE: &str = "UnknownService";

/// Protocol recorded for HTTP client calls.
pub const PROTOCOL_HTTP: &str = "HTTP";

/// Protocol recorded for message-bus producer calls.
pub const PROTOCOL_NATS: &str = "NATS";

/// A service in the dependency graph.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ServiceNode {
    pub service_name: String,
    /// True only for the [`UNKNOWN_SERVICE`] node.
    #[serde(default)]
    pub is_unknown: bool,
}

impl ServiceNode {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            is_unknown: false,
        }
    }

    pub fn unknown() -> Self {
        Self {
            service_name: UNKNOWN_SERVICE.to_string(),
            is_unknown: true,
        }
    }
}

/// One network call between two services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NetworkCall {
    /// `HTTP` or `NATS`.
    pub protocol: String,
    /// Requested URL, or the subject for message-bus calls.
    pub url: String,
    /// Fully qualified identifier of the call. Not part of the JSON output.
    #[serde(skip)]
    pub method_name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// `"<file>:<line>"` of the call.
    pub location: String,
}

/// All calls from one service to one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PeerCalls {
    /// Name of the peer service.
    pub service: String,
    pub calls: Vec<NetworkCall>,
    /// Number of entries in `calls`.
    pub count: usize,
}

/// Serialized form of the dependency graph.
///
/// Keys are service names in alphabetical order; each value lists that
/// service's peers in alphabetical order.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct AdjacencyList(pub BTreeMap<String, Vec<PeerCalls>>);

impl AdjacencyList {
    /// Peers of `service`, if the service is part of the graph.
    pub fn peers(&self, service: &str) -> Option<&[PeerCalls]> {
        self.0.get(service).map(Vec::as_slice)
    }

    /// Service names in the graph, alphabetically.
    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Total number of calls across all services.
    pub fn call_count(&self) -> usize {
        self.0.values().flatten().map(|p| p.count).sum()
    }
}
