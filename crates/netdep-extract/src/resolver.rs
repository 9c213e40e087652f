//! Symbolic resolution of SSA values to strings and functions.
//!
//! The resolver follows constants, string concatenation, formatter calls,
//! environment lookups and phi nodes within a function, and parameters and
//! free variables across function boundaries through the caller frames their
//! bindings borrow.
//! Anything it does not understand resolves to [`Resolution::Unknown`].

use netdep_schemas::ssa::{
    BinaryOp, CallCommon, Callee, Function, FunctionId, Literal, Program,
    ValueId, ValueKind,
};
use tracing::trace;

use crate::config::AnalyserConfig;
use crate::frame::{Bound, Frame};
use crate::registry::FORMATTER;

/// Longest chain of values the resolver follows before giving up.
const MAX_RESOLVE_DEPTH: usize = 32;

/// Outcome of resolving a value to a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unknown,
}

impl Resolution {
    /// The resolved string, or empty when unknown.
    pub fn into_string(self) -> String {
        match self {
            Resolution::Resolved(s) => s,
            Resolution::Unknown => String::new(),
        }
    }
}

/// A function a value resolved to, with the values its closure captured.
pub(crate) struct Callable<'a> {
    pub func: FunctionId,
    pub bindings: Vec<Bound<'a>>,
}

impl Callable<'_> {
    fn bare(func: FunctionId) -> Self {
        Self {
            func,
            bindings: Vec::new(),
        }
    }
}

pub(crate) struct Resolver<'a> {
    program: &'a Program,
    config: &'a AnalyserConfig,
    service: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(
        program: &'a Program,
        config: &'a AnalyserConfig,
        service: &'a str,
    ) -> Self {
        Self {
            program,
            config,
            service,
        }
    }

    /// Resolves `value` of the frame's function to a string.
    pub fn resolve(&self, frame: &Frame<'_>, value: ValueId) -> Resolution {
        self.resolve_at(frame, value, 0)
    }

    fn resolve_at(
        &self,
        frame: &Frame<'_>,
        value: ValueId,
        depth: usize,
    ) -> Resolution {
        if depth > MAX_RESOLVE_DEPTH {
            trace!(function = %frame.function.signature(), "resolution depth exceeded");
            return Resolution::Unknown;
        }
        let function = frame.function;
        let Some(v) = function.value(value) else {
            return Resolution::Unknown;
        };

        match &v.kind {
            ValueKind::Const {
                literal: Literal::String(s),
            } => Resolution::Resolved(s.clone()),
            ValueKind::Const { .. } => Resolution::Unknown,
            ValueKind::Parameter { index } => match frame.param(*index) {
                Some(bound) => self.resolve_at(bound.frame, bound.value, depth + 1),
                None => Resolution::Unknown,
            },
            ValueKind::FreeVar { index } => match frame.free_var(*index) {
                Some(bound) => self.resolve_at(bound.frame, bound.value, depth + 1),
                None => Resolution::Unknown,
            },
            ValueKind::BinOp {
                op: BinaryOp::Add,
                x,
                y,
            } => {
                let Resolution::Resolved(left) = self.resolve_at(frame, *x, depth + 1)
                else {
                    return Resolution::Unknown;
                };
                let Resolution::Resolved(right) = self.resolve_at(frame, *y, depth + 1)
                else {
                    return Resolution::Unknown;
                };
                Resolution::Resolved(left + &right)
            }
            ValueKind::Call { call } => self.resolve_call(frame, call, depth),
            ValueKind::Phi { edges } => self.resolve_phi(frame, edges, depth),
            ValueKind::MakeInterface { x } | ValueKind::Convert { x } => {
                self.resolve_at(frame, *x, depth + 1)
            }
            _ => Resolution::Unknown,
        }
    }

    /// All incoming values must resolve to the same string.
    fn resolve_phi(
        &self,
        frame: &Frame<'_>,
        edges: &[ValueId],
        depth: usize,
    ) -> Resolution {
        let mut agreed: Option<String> = None;
        for &edge in edges {
            let Resolution::Resolved(s) = self.resolve_at(frame, edge, depth + 1)
            else {
                return Resolution::Unknown;
            };
            match &agreed {
                Some(prev) if *prev != s => return Resolution::Unknown,
                Some(_) => {}
                None => agreed = Some(s),
            }
        }
        agreed.map_or(Resolution::Unknown, Resolution::Resolved)
    }

    /// Substitute calls and the formatter; every other call is unknown.
    fn resolve_call(
        &self,
        frame: &Frame<'_>,
        call: &CallCommon,
        depth: usize,
    ) -> Resolution {
        let Callee::Static { func } = call.callee else {
            return Resolution::Unknown;
        };
        let Some(callee) = self.program.function(func) else {
            return Resolution::Unknown;
        };
        let signature = callee.signature();

        if let Some(&index) = self.config.substitute.get(&signature) {
            let Some(&arg) = call.args.get(index) else {
                return Resolution::Unknown;
            };
            let Resolution::Resolved(name) = self.resolve_at(frame, arg, depth + 1)
            else {
                return Resolution::Unknown;
            };
            return match self.config.env_var(self.service, &name) {
                Some(value) => Resolution::Resolved(value.to_string()),
                None => {
                    trace!(service = self.service, variable = %name, "environment variable not set");
                    Resolution::Unknown
                }
            };
        }

        if signature == FORMATTER {
            return self.resolve_format(frame, call, depth);
        }

        Resolution::Unknown
    }

    /// `fmt.Sprintf(format, operands...)` with `%s`, `%d` and `%%`.
    fn resolve_format(
        &self,
        frame: &Frame<'_>,
        call: &CallCommon,
        depth: usize,
    ) -> Resolution {
        let Some(&format) = call.args.first() else {
            return Resolution::Unknown;
        };
        let Resolution::Resolved(format) = self.resolve_at(frame, format, depth + 1)
        else {
            return Resolution::Unknown;
        };
        let operands = match call.args.get(1) {
            Some(&slice) => match vararg_elements(frame.function, slice) {
                Some(operands) => operands,
                None => return Resolution::Unknown,
            },
            None => Vec::new(),
        };

        let mut operands = operands.into_iter();
        let mut out = String::with_capacity(format.len());
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(verb @ ('s' | 'd')) => {
                    let Some(operand) = operands.next() else {
                        return Resolution::Unknown;
                    };
                    match self.resolve_operand(frame, operand, verb, depth + 1) {
                        Resolution::Resolved(s) => out.push_str(&s),
                        Resolution::Unknown => return Resolution::Unknown,
                    }
                }
                _ => return Resolution::Unknown,
            }
        }
        Resolution::Resolved(out)
    }

    /// Operands arrive boxed in `any`; `%d` also accepts integer constants.
    fn resolve_operand(
        &self,
        frame: &Frame<'_>,
        operand: ValueId,
        verb: char,
        depth: usize,
    ) -> Resolution {
        let mut current = operand;
        while let Some(v) = frame.function.value(current) {
            match &v.kind {
                ValueKind::MakeInterface { x } | ValueKind::Convert { x } => {
                    current = *x;
                }
                ValueKind::Const {
                    literal: Literal::Int(i),
                } if verb == 'd' => return Resolution::Resolved(i.to_string()),
                _ => break,
            }
        }
        self.resolve_at(frame, current, depth)
    }

    /// Resolves a function-typed value to the function it denotes.
    pub fn resolve_function<'f>(
        &self,
        frame: &'f Frame<'f>,
        value: ValueId,
    ) -> Option<Callable<'f>> {
        self.resolve_function_at(frame, value, 0)
    }

    fn resolve_function_at<'f>(
        &self,
        frame: &'f Frame<'f>,
        value: ValueId,
        depth: usize,
    ) -> Option<Callable<'f>> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let v = frame.function.value(value)?;
        match &v.kind {
            ValueKind::Function { func } => Some(Callable::bare(*func)),
            ValueKind::MakeClosure { func, bindings } => Some(Callable {
                func: *func,
                bindings: bindings
                    .iter()
                    .map(|&value| Bound { frame, value })
                    .collect(),
            }),
            ValueKind::MakeInterface { x } | ValueKind::Convert { x } => {
                self.resolve_function_at(frame, *x, depth + 1)
            }
            ValueKind::Parameter { index } => {
                let bound = frame.param(*index)?;
                self.resolve_function_at(bound.frame, bound.value, depth + 1)
            }
            ValueKind::FreeVar { index } => {
                let bound = frame.free_var(*index)?;
                self.resolve_function_at(bound.frame, bound.value, depth + 1)
            }
            // A variadic handler list; the first handler is the one we follow.
            ValueKind::Slice { .. } => {
                let first = vararg_elements(frame.function, value)?
                    .into_iter()
                    .next()?;
                self.resolve_function_at(frame, first, depth + 1)
            }
            ValueKind::Phi { edges } => {
                let mut resolved = edges
                    .iter()
                    .map(|&edge| self.resolve_function_at(frame, edge, depth + 1));
                let first = resolved.next()??;
                for other in resolved {
                    if other?.func != first.func {
                        return None;
                    }
                }
                Some(first)
            }
            _ => None,
        }
    }

    /// Finds the concrete type behind an interface value.
    pub fn concrete_type(&self, frame: &Frame<'_>, value: ValueId) -> Option<String> {
        self.concrete_type_at(frame, value, 0)
    }

    fn concrete_type_at(
        &self,
        frame: &Frame<'_>,
        value: ValueId,
        depth: usize,
    ) -> Option<String> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        let v = frame.function.value(value)?;
        match &v.kind {
            ValueKind::MakeInterface { x } => {
                frame.function.value(*x).map(|inner| inner.ty.clone())
            }
            ValueKind::Convert { x } => self.concrete_type_at(frame, *x, depth + 1),
            ValueKind::Parameter { index } => {
                let bound = frame.param(*index)?;
                self.concrete_type_at(bound.frame, bound.value, depth + 1)
            }
            ValueKind::FreeVar { index } => {
                let bound = frame.free_var(*index)?;
                self.concrete_type_at(bound.frame, bound.value, depth + 1)
            }
            ValueKind::Phi { edges } => {
                let mut types = edges
                    .iter()
                    .map(|&edge| self.concrete_type_at(frame, edge, depth + 1));
                let first = types.next()??;
                for other in types {
                    if other? != first {
                        return None;
                    }
                }
                Some(first)
            }
            // Already concrete when the type has a method set of its own.
            _ if self.program.method_sets.contains_key(&v.ty) => Some(v.ty.clone()),
            _ => None,
        }
    }

    /// Resolves the callee of a call: static, through a function value, or
    /// by dispatching an interface method on the receiver's concrete type.
    pub fn resolve_callee<'f>(
        &self,
        frame: &'f Frame<'f>,
        call: &CallCommon,
    ) -> Option<Callable<'f>> {
        match &call.callee {
            Callee::Static { func } => Some(Callable::bare(*func)),
            Callee::Dynamic { value } => self.resolve_function(frame, *value),
            Callee::Invoke { receiver, method } => {
                let ty = self.concrete_type(frame, *receiver)?;
                self.program.method(&ty, method).map(Callable::bare)
            }
        }
    }

    /// Resolves an endpoint's handler argument: a function value, or a value
    /// whose concrete type has a `ServeHTTP` method.
    pub fn resolve_handler<'f>(
        &self,
        frame: &'f Frame<'f>,
        value: ValueId,
    ) -> Option<Callable<'f>> {
        if let Some(callable) = self.resolve_function(frame, value) {
            return Some(callable);
        }
        let ty = self.concrete_type(frame, value)?;
        self.program.method(&ty, "ServeHTTP").map(Callable::bare)
    }
}

/// Elements stored into the array behind a variadic slice, in index order.
///
/// go/ssa passes `f(a, b)` for `f(xs ...T)` as `t0 = new [2]T; *&t0[0] = a;
/// *&t0[1] = b; t1 = slice t0[:]`. A `nil` slice has no elements. Returns
/// `None` when the slice is built any other way or has gaps.
fn vararg_elements(function: &Function, slice: ValueId) -> Option<Vec<ValueId>> {
    let v = function.value(slice)?;
    let array = match &v.kind {
        ValueKind::Slice { x } => *x,
        ValueKind::Const {
            literal: Literal::Nil,
        } => return Some(Vec::new()),
        _ => return None,
    };

    let mut elements: Vec<(i64, ValueId)> = function
        .values
        .iter()
        .filter_map(|store| {
            let ValueKind::Store { addr, val } = &store.kind else {
                return None;
            };
            let ValueKind::IndexAddr { x, index } = &function.value(*addr)?.kind
            else {
                return None;
            };
            if *x != array {
                return None;
            }
            match &function.value(*index)?.kind {
                ValueKind::Const {
                    literal: Literal::Int(i),
                } => Some((*i, *val)),
                _ => None,
            }
        })
        .collect();
    elements.sort_by_key(|(i, _)| *i);

    let contiguous = elements
        .iter()
        .enumerate()
        .all(|(pos, (i, _))| usize::try_from(*i).is_ok_and(|i| i == pos));
    contiguous.then(|| elements.into_iter().map(|(_, v)| v).collect())
}
