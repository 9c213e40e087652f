//! Call-graph walk from a service's entry point.
//!
//! The walk is a depth-first traversal over basic blocks: blocks in the order
//! control flow reaches them, successors in declared order, calls in
//! instruction order. Calls to registered client or endpoint signatures
//! become [`CallTarget`]s; calls to anything else are followed into their
//! callee when it has a body, is not ignored, is not already on the path and
//! the depth limit allows. The functions passed as handlers to endpoint
//! registrations are walked as well, so their outbound calls count for the
//! registering service.

use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;
use netdep_schemas::ssa::{BlockId, CallCommon, Function, Program, ValueId};
use netdep_schemas::{CallTarget, Discovery, TraceEntry};
use tracing::{debug, info, trace, warn};

use crate::config::AnalyserConfig;
use crate::frame::{Bound, Frame};
use crate::registry::DiscoveryAction;
use crate::resolver::{Callable, Resolution, Resolver};

/// Walks `program` from its `main` function and collects the client and
/// endpoint calls of `service`. A program without an entry point yields no
/// calls.
///
/// Targets with the same trace are reported once.
pub fn walk_service(
    program: &Program,
    service: &str,
    config: &AnalyserConfig,
) -> Discovery {
    let Some(main) = program.main_function() else {
        warn!(service, "no entry point, nothing to walk");
        return Discovery::default();
    };

    let mut walker = Walker {
        program,
        config,
        service,
        resolver: Resolver::new(program, config, service),
        seen: HashSet::new(),
        calls: Discovery::default(),
    };
    let mut frame = Frame::entry(main, config);
    walker.walk_block(&mut frame, BlockId(0));

    debug!(
        service,
        clients = walker.calls.clients.len(),
        endpoints = walker.calls.endpoints.len(),
        "walk finished"
    );
    walker.calls
}

struct Walker<'a> {
    program: &'a Program,
    config: &'a AnalyserConfig,
    service: &'a str,
    resolver: Resolver<'a>,
    /// Traces already reported.
    seen: HashSet<Vec<TraceEntry>>,
    calls: Discovery,
}

impl Walker<'_> {
    fn walk_block(&mut self, frame: &mut Frame<'_>, block: BlockId) {
        let function = frame.function;
        if !frame.visited.insert((function.id, block)) {
            return;
        }
        let Some(basic_block) = function.block(block) else {
            return;
        };

        for &instr in &basic_block.instrs {
            let Some(call) = function.value(instr).and_then(|v| v.as_call()) else {
                continue;
            };
            self.visit_call(frame, instr, call);
        }

        for &succ in &basic_block.succs {
            self.walk_block(frame, succ);
        }
    }

    fn visit_call(&mut self, frame: &Frame<'_>, instr: ValueId, call: &CallCommon) {
        let site = call_site(frame.function, instr);
        let Some(callable) = self.resolver.resolve_callee(frame, call) else {
            trace!(site = %site, "callee not resolvable");
            return;
        };
        let Some(callee) = self.program.function(callable.func) else {
            return;
        };
        let signature = callee.signature();

        match self.config.classify(&signature) {
            Some((DiscoveryAction::EmitClient, index)) => {
                let target = self.target(frame, &site, callee, call, index);
                self.record(target, DiscoveryAction::EmitClient);
            }
            Some((DiscoveryAction::EmitEndpoint, index)) => {
                let target = self.target(frame, &site, callee, call, index);
                self.record(target, DiscoveryAction::EmitEndpoint);
                self.walk_handler(frame, site, call, index + 1);
            }
            // Resolved lazily when its result is used.
            Some((DiscoveryAction::Substitute, _)) => {}
            None => self.descend(frame, site, callee, call, callable),
        }
    }

    /// Builds the target of an interesting call at `site`.
    fn target(
        &self,
        frame: &Frame<'_>,
        site: &TraceEntry,
        callee: &Function,
        call: &CallCommon,
        index: usize,
    ) -> CallTarget {
        let resolution = call
            .arguments()
            .get(index)
            .map_or(Resolution::Unknown, |&arg| self.resolver.resolve(frame, arg));

        let mut target = CallTarget {
            package_name: callee.package_path.clone(),
            method_name: callee.signature(),
            service_name: self.service.to_string(),
            request_location: String::new(),
            is_resolved: false,
            target_service: None,
            trace: frame.trace_to(site.clone()),
        };
        target.resolve_to(resolution.into_string());
        target
    }

    fn record(&mut self, target: CallTarget, action: DiscoveryAction) {
        if !self.seen.insert(target.trace.clone()) {
            trace!(location = %target.location(), "duplicate trace, skipping");
            return;
        }

        if target.is_resolved {
            debug!(
                service = self.service,
                method = %target.method_name,
                location = %target.request_location,
                "discovered call"
            );
        } else if self.config.verbose {
            let trace = target
                .trace
                .iter()
                .take(self.config.max_trace_depth)
                .join(" -> ");
            info!(
                service = self.service,
                method = %target.method_name,
                %trace,
                "unresolved call"
            );
        }

        match action {
            DiscoveryAction::EmitClient => self.calls.clients.push(target),
            DiscoveryAction::EmitEndpoint => self.calls.endpoints.push(target),
            DiscoveryAction::Substitute => {}
        }
    }

    /// Whether the walker may enter `callee` from `frame`.
    fn may_enter(&self, frame: &Frame<'_>, callee: &Function) -> bool {
        if callee.is_external() || self.config.is_ignored(&callee.package_path) {
            return false;
        }
        if frame.depth >= self.config.max_recursion_depth {
            trace!(callee = %callee.signature(), "max recursion depth reached");
            return false;
        }
        !frame.has_entered(callee.id)
    }

    fn descend(
        &mut self,
        frame: &Frame<'_>,
        site: TraceEntry,
        callee: &Function,
        call: &CallCommon,
        callable: Callable<'_>,
    ) {
        if !self.may_enter(frame, callee) {
            return;
        }
        trace!(callee = %callee.signature(), site = %site, "descending");

        let params: IndexMap<String, Bound<'_>> = callee
            .params
            .iter()
            .zip(call.arguments())
            .map(|(param, value)| (param.name.clone(), Bound { frame, value }))
            .collect();
        let free_vars = bind_free_vars(callee, callable);

        let mut child = frame.descend(site, callee, params, free_vars);
        self.walk_block(&mut child, BlockId(0));
    }

    /// Walks the handler passed at `handler_index` of an endpoint call.
    fn walk_handler(
        &mut self,
        frame: &Frame<'_>,
        site: TraceEntry,
        call: &CallCommon,
        handler_index: usize,
    ) {
        let Some(&handler) = call.arguments().get(handler_index) else {
            return;
        };
        let Some(callable) = self.resolver.resolve_handler(frame, handler) else {
            trace!(site = %site, "handler not resolvable");
            return;
        };
        let Some(callee) = self.program.function(callable.func) else {
            return;
        };
        if !self.may_enter(frame, callee) {
            return;
        }
        trace!(handler = %callee.signature(), site = %site, "walking handler");

        let free_vars = bind_free_vars(callee, callable);
        let mut child = frame.handler(site, callee, free_vars);
        self.walk_block(&mut child, BlockId(0));
    }
}

fn bind_free_vars<'a>(
    callee: &Function,
    callable: Callable<'a>,
) -> IndexMap<String, Bound<'a>> {
    callee
        .free_vars
        .iter()
        .zip(callable.bindings)
        .map(|(var, bound)| (var.name.clone(), bound))
        .collect()
}

/// Source position of the call `instr`, falling back to the enclosing
/// function's declaration.
fn call_site(function: &Function, instr: ValueId) -> TraceEntry {
    let pos = function
        .value(instr)
        .and_then(|v| v.pos.as_ref())
        .or(function.pos.as_ref());
    match pos {
        Some(pos) => TraceEntry::new(pos.file.clone(), pos.line),
        None => TraceEntry::new(String::new(), 0),
    }
}
