//! Call sites discovered by extraction.
//!
//! A [`CallTarget`] is one interesting HTTP call: either a client call that
//! issues an outbound request or an endpoint registration that exposes an
//! inbound route or port. A [`BusCall`] is one message-bus producer or
//! consumer found by the syntax scanner.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One frame of a call chain: the source position of a call.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TraceEntry {
    pub file: String,
    pub line: u32,
}

impl TraceEntry {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A discovered client or endpoint call site.
///
/// Invariants upheld by extraction:
/// - `is_resolved` implies `request_location` is non-empty
/// - `trace` is never empty; its first entry is the outermost call made from
///   the service's entry point and its last entry is the interesting call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CallTarget {
    /// Import path of the invoked function's package, e.g. `net/http`.
    pub package_name: String,
    /// Fully qualified identifier of the invoked function, e.g.
    /// `net/http.Get` or `(*net/http.Client).Do`.
    pub method_name: String,
    /// Name of the enclosing service (last segment of its directory).
    pub service_name: String,
    /// Resolved URL, path, or `:port`; empty when unresolved.
    pub request_location: String,
    pub is_resolved: bool,
    /// Explicit peer service supplied by an annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_service: Option<String>,
    /// Call chain from the entry point down to this call.
    pub trace: Vec<TraceEntry>,
}

impl CallTarget {
    /// The interesting call itself.
    pub fn innermost(&self) -> Option<&TraceEntry> {
        self.trace.last()
    }

    /// `"<file>:<line>"` of the interesting call, or empty if there is no
    /// trace.
    pub fn location(&self) -> String {
        self.innermost().map(ToString::to_string).unwrap_or_default()
    }

    /// Marks the target resolved to `location`. An empty location leaves the
    /// target unresolved.
    pub fn resolve_to(&mut self, location: impl Into<String>) {
        self.request_location = location.into();
        self.is_resolved = !self.request_location.is_empty();
    }
}

/// Whether a message-bus call publishes or subscribes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BusRole {
    Producer,
    Consumer,
}

/// A message-bus call found by the syntax scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BusCall {
    pub role: BusRole,
    /// Selector naming the subject, e.g. `OrderCreatedSubject`.
    pub subject: String,
    pub service_name: String,
    pub file: String,
    pub line: u32,
}

impl BusCall {
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}

/// Everything extraction found, in service-name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Discovery {
    pub clients: Vec<CallTarget>,
    pub endpoints: Vec<CallTarget>,
    #[serde(default)]
    pub bus_calls: Vec<BusCall>,
}

impl Discovery {
    /// Appends the findings of another service.
    pub fn extend(&mut self, other: Discovery) {
        self.clients.extend(other.clients);
        self.endpoints.extend(other.endpoints);
        self.bus_calls.extend(other.bus_calls);
    }
}
