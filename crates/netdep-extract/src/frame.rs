//! Per-path walker state.
//!
//! A [`Frame`] is one activation on the walker's path from a service entry
//! point. Parameter and free-variable bindings are [`Bound`] values that
//! borrow the caller's frame, so the resolver knows in which frame to
//! continue when it follows a binding.

use std::collections::HashSet;

use indexmap::IndexMap;
use netdep_schemas::TraceEntry;
use netdep_schemas::ssa::{BlockId, Function, FunctionId, ValueId};

use crate::config::AnalyserConfig;

/// A value of the function owned by `frame`.
#[derive(Clone, Copy)]
pub(crate) struct Bound<'a> {
    pub frame: &'a Frame<'a>,
    pub value: ValueId,
}

/// One call on the path: where it happened and what it entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub site: TraceEntry,
    pub callee: FunctionId,
}

pub(crate) struct Frame<'a> {
    pub function: &'a Function,
    pub trace: Vec<Step>,
    /// Formal parameter name → argument supplied at the call site.
    pub params: IndexMap<String, Bound<'a>>,
    /// Free variable name → value captured by `MakeClosure`.
    pub free_vars: IndexMap<String, Bound<'a>>,
    /// Blocks entered on this path. Cloned on every descent.
    pub visited: HashSet<(FunctionId, BlockId)>,
    /// Number of frames above this one.
    pub depth: usize,
    pub config: &'a AnalyserConfig,
}

impl<'a> Frame<'a> {
    /// The frame of a service's entry function.
    pub fn entry(function: &'a Function, config: &'a AnalyserConfig) -> Self {
        Self {
            function,
            trace: Vec::new(),
            params: IndexMap::new(),
            free_vars: IndexMap::new(),
            visited: HashSet::new(),
            depth: 0,
            config,
        }
    }

    /// A frame for a call from this frame into `callee`.
    pub fn descend<'b>(
        &'b self,
        site: TraceEntry,
        callee: &'b Function,
        params: IndexMap<String, Bound<'b>>,
        free_vars: IndexMap<String, Bound<'b>>,
    ) -> Frame<'b> {
        let mut trace = self.trace.clone();
        trace.push(Step {
            site,
            callee: callee.id,
        });
        Frame {
            function: callee,
            trace,
            params,
            free_vars,
            visited: self.visited.clone(),
            depth: self.depth + 1,
            config: self.config,
        }
    }

    /// A frame for a handler registered from this frame. Its trace starts
    /// at the registration site and it has no parameter bindings.
    pub fn handler<'b>(
        &'b self,
        site: TraceEntry,
        callee: &'b Function,
        free_vars: IndexMap<String, Bound<'b>>,
    ) -> Frame<'b> {
        Frame {
            function: callee,
            trace: vec![Step {
                site,
                callee: callee.id,
            }],
            params: IndexMap::new(),
            free_vars,
            visited: self.visited.clone(),
            depth: self.depth + 1,
            config: self.config,
        }
    }

    /// Binding of the parameter at `index` of the current function.
    pub fn param(&self, index: usize) -> Option<Bound<'a>> {
        let name = self.function.param_name(index)?;
        self.params.get(name).copied()
    }

    /// Binding of the free variable at `index` of the current function.
    pub fn free_var(&self, index: usize) -> Option<Bound<'a>> {
        let name = self.function.free_var_name(index)?;
        self.free_vars.get(name).copied()
    }

    /// Returns true if the entry block of `function` is on this path.
    pub fn has_entered(&self, function: FunctionId) -> bool {
        self.visited.contains(&(function, BlockId(0)))
    }

    /// The trace of a call made at `site` from this frame.
    pub fn trace_to(&self, site: TraceEntry) -> Vec<TraceEntry> {
        self.trace
            .iter()
            .map(|step| step.site.clone())
            .chain(std::iter::once(site))
            .collect()
    }
}
