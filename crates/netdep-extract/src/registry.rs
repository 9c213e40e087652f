//! Signatures of the library functions the analysis cares about.
//!
//! A signature is the fully qualified identifier produced by
//! [`Function::signature`](netdep_schemas::ssa::Function::signature). Each
//! interesting signature maps to the index of its interesting argument: the
//! URL of a client call, the path or `:port` of an endpoint registration, or
//! the variable name of an environment lookup.

use indexmap::{IndexMap, IndexSet};

use crate::config::AnalyserConfig;

/// What the walker does when it meets a call to a registered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryAction {
    /// Record an outbound request.
    EmitClient,
    /// Record an inbound route or listening port.
    EmitEndpoint,
    /// Resolve lazily through the environment map.
    Substitute,
}

/// Signature of the standard formatter. Its format string is argument 0 and
/// its operands are the variadic slice in argument 1.
pub const FORMATTER: &str = "fmt.Sprintf";

const HTTP_CLIENT_METHODS: &[&str] = &["Do", "Get", "Post", "Head", "PostForm"];
const HTTP_FUNCTIONS: &[&str] = &["Get", "Post", "Head", "PostForm"];
const GIN_VERBS: &[&str] =
    &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "Any"];
const GIN_ROUTERS: &[&str] = &[
    "*github.com/gin-gonic/gin.RouterGroup",
    "*github.com/gin-gonic/gin.Engine",
];

const IGNORED_PACKAGES: &[&str] = &[
    "fmt",
    "reflect",
    "net/url",
    "strings",
    "bytes",
    "io",
    "errors",
    "runtime",
    "internal/reflectlite",
    "math/bits",
];

/// Client signatures and the position of their URL argument.
pub fn default_clients() -> IndexMap<String, usize> {
    let mut clients = IndexMap::new();
    for method in HTTP_CLIENT_METHODS {
        // Argument 0 is the receiver.
        clients.insert(format!("(*net/http.Client).{method}"), 1);
    }
    for function in HTTP_FUNCTIONS {
        clients.insert(format!("net/http.{function}"), 0);
    }
    clients.insert("net/http.NewRequest".to_string(), 1);
    clients.insert("net/http.NewRequestWithContext".to_string(), 2);
    clients
}

/// Endpoint signatures and the position of their path or port argument.
pub fn default_endpoints() -> IndexMap<String, usize> {
    let mut endpoints = IndexMap::new();
    endpoints.insert("net/http.Handle".to_string(), 0);
    endpoints.insert("net/http.HandleFunc".to_string(), 0);
    endpoints.insert("(*net/http.ServeMux).Handle".to_string(), 1);
    endpoints.insert("(*net/http.ServeMux).HandleFunc".to_string(), 1);
    endpoints.insert("net/http.ListenAndServe".to_string(), 0);
    for router in GIN_ROUTERS {
        for verb in GIN_VERBS {
            endpoints.insert(format!("({router}).{verb}"), 1);
        }
    }
    endpoints
}

/// Substitute signatures and the position of their variable-name argument.
pub fn default_substitutes() -> IndexMap<String, usize> {
    IndexMap::from([("os.Getenv".to_string(), 0)])
}

/// Packages the walker never descends into.
pub fn default_ignore_list() -> IndexSet<String> {
    IGNORED_PACKAGES.iter().map(|p| (*p).to_string()).collect()
}

impl AnalyserConfig {
    /// Classifies a signature, returning the action and the index of the
    /// interesting argument.
    pub fn classify(&self, signature: &str) -> Option<(DiscoveryAction, usize)> {
        if let Some(&index) = self.interesting_client.get(signature) {
            return Some((DiscoveryAction::EmitClient, index));
        }
        if let Some(&index) = self.interesting_endpoint.get(signature) {
            return Some((DiscoveryAction::EmitEndpoint, index));
        }
        self.substitute
            .get(signature)
            .map(|&index| (DiscoveryAction::Substitute, index))
    }

    /// Returns true if the walker must not descend into functions of the
    /// package at `package_path`.
    ///
    /// Matches on the full path and on its first segment, so `runtime`
    /// also covers `runtime/debug`.
    pub fn is_ignored(&self, package_path: &str) -> bool {
        if self.ignore_list.contains(package_path) {
            return true;
        }
        let first = package_path.split('/').next().unwrap_or(package_path);
        self.ignore_list.contains(first)
    }
}
