//! Analyser configuration.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};

use crate::registry;

/// Environment variables per service: service name → (variable → value).
pub type EnvMap = BTreeMap<String, BTreeMap<String, String>>;

/// Annotation sources of one service: (normalised file, line) → the text
/// following `//netdep:`.
pub type ServiceAnnotations = BTreeMap<(String, u32), String>;

/// Annotations per service.
pub type AnnotationMap = BTreeMap<String, ServiceAnnotations>;

/// Settings shared read-only by every service analysis of a run.
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// Maximum number of stacked walker frames.
    pub max_recursion_depth: usize,
    /// Maximum number of trace entries shown when logging a trace.
    pub max_trace_depth: usize,
    /// Client signatures → URL argument index.
    pub interesting_client: IndexMap<String, usize>,
    /// Endpoint signatures → path or port argument index.
    pub interesting_endpoint: IndexMap<String, usize>,
    /// Substitute signatures → variable-name argument index.
    pub substitute: IndexMap<String, usize>,
    /// Package paths (or first path segments) the walker skips.
    pub ignore_list: IndexSet<String>,
    pub env: EnvMap,
    pub annotations: AnnotationMap,
    /// Log unresolved traces and discovered annotations at `info`.
    pub verbose: bool,
}

/// Default depth for both recursion and trace display.
pub const DEFAULT_MAX_DEPTH: usize = 16;

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_DEPTH,
            max_trace_depth: DEFAULT_MAX_DEPTH,
            interesting_client: registry::default_clients(),
            interesting_endpoint: registry::default_endpoints(),
            substitute: registry::default_substitutes(),
            ignore_list: registry::default_ignore_list(),
            env: EnvMap::new(),
            annotations: AnnotationMap::new(),
            verbose: false,
        }
    }
}

impl AnalyserConfig {
    #[must_use]
    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    /// Adds annotations, replacing entries with the same key.
    #[must_use]
    pub fn with_annotations(mut self, annotations: AnnotationMap) -> Self {
        for (service, entries) in annotations {
            self.annotations.entry(service).or_default().extend(entries);
        }
        self
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the recursion depth. The trace display depth follows it.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self.max_trace_depth = depth;
        self
    }

    /// Looks up an environment variable of a service.
    pub fn env_var(&self, service: &str, name: &str) -> Option<&str> {
        self.env.get(service)?.get(name).map(String::as_str)
    }
}
