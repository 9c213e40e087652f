//! SSA program model consumed by the analysis.
//!
//! Go's SSA form is produced outside of this workspace by a small bridge
//! program built on `golang.org/x/tools/go/ssa`. The bridge serializes every
//! function reachable from a service into the JSON shape described here, and
//! the analysis works purely on these types.
//!
//! ## Identity
//!
//! Functions are addressed by [`FunctionId`], an index into
//! [`Program::functions`]. Values and blocks are addressed by [`ValueId`] and
//! [`BlockId`], indices into the owning function's `values` and `blocks`.
//! A `ValueId` is therefore only meaningful together with the function it
//! was taken from.
//!
//! ## Instructions vs. values
//!
//! Every SSA value lives in [`Function::values`]. Instructions (calls, binary
//! operations, control flow, ...) additionally appear, in execution order, in
//! the `instrs` list of their basic block. Constants, parameters, free
//! variables, function references and globals are values only.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Index of a function in [`Program::functions`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

/// Index of a value in [`Function::values`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct ValueId(pub u32);

/// Index of a basic block in [`Function::blocks`].
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl FunctionId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl ValueId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A whole program as seen from one service's entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Program {
    /// Every function known to the program, including external functions
    /// (standard library and third-party) that carry no body.
    pub functions: Vec<Function>,

    /// Packages that were loaded to build this program.
    #[serde(default)]
    pub packages: Vec<Package>,

    /// Method sets of named types, keyed by the fully qualified type
    /// (e.g. `*example.com/svc/client.Caller`) and then by method name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub method_sets: BTreeMap<String, BTreeMap<String, FunctionId>>,
}

impl Program {
    /// Returns the function with the given id.
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    /// Returns the `main` function of the first non-errored `main` package.
    pub fn main_function(&self) -> Option<&Function> {
        self.functions.iter().find(|f| {
            f.package_name == "main"
                && f.name == "main"
                && f.receiver.is_none()
                && !f.is_external()
                && !self.is_errored_package(&f.package_path)
        })
    }

    /// Looks up a method by the concrete type of its receiver.
    pub fn method(&self, type_name: &str, method: &str) -> Option<FunctionId> {
        self.method_sets.get(type_name)?.get(method).copied()
    }

    /// Returns true if the package at `path` reported load errors.
    pub fn is_errored_package(&self, path: &str) -> bool {
        self.packages
            .iter()
            .any(|p| p.path == path && !p.errors.is_empty())
    }

    /// Packages that loaded without errors.
    pub fn usable_packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter().filter(|p| p.errors.is_empty())
    }
}

/// A Go package that took part in building the program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Package {
    /// Import path, e.g. `example.com/shop/svc/orders`.
    pub path: String,
    /// Declared package name, e.g. `main`.
    pub name: String,
    /// Type-checking or SSA construction errors reported for this package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A function or method, possibly without a body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Function {
    /// Own position in [`Program::functions`].
    pub id: FunctionId,
    /// Unqualified name. Anonymous functions use the go/ssa form `outer$1`.
    pub name: String,
    /// Import path of the declaring package.
    pub package_path: String,
    /// Declared name of the package.
    pub package_name: String,
    /// Fully qualified receiver type for methods, e.g. `*net/http.Client`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Source position of the declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Pos>,
    /// Formal parameters. For methods the receiver is parameter 0.
    #[serde(default)]
    pub params: Vec<Param>,
    /// Captured variables of a closure, bound by `MakeClosure`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub free_vars: Vec<Param>,
    /// All values of the function body.
    #[serde(default)]
    pub values: Vec<Value>,
    /// Basic blocks; block 0 is the entry block.
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// Fully qualified identifier used by the signature registry.
    ///
    /// Free functions render as `pkg/path.Name`, methods as
    /// `(*pkg/path.Type).Name`.
    pub fn signature(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("({receiver}).{}", self.name),
            None => format!("{}.{}", self.package_path, self.name),
        }
    }

    /// External functions have no body to walk.
    pub fn is_external(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the value with the given id.
    pub fn value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index())
    }

    /// Returns the block with the given id.
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index())
    }

    /// Name of the formal parameter at `index`.
    pub fn param_name(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(|p| p.name.as_str())
    }

    /// Name of the free variable at `index`.
    pub fn free_var_name(&self, index: usize) -> Option<&str> {
        self.free_vars.get(index).map(|p| p.name.as_str())
    }
}

/// A formal parameter or free variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Param {
    pub name: String,
    /// The `Parameter`/`FreeVar` value representing it inside the body.
    pub value: ValueId,
}

/// A basic block of a function body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BasicBlock {
    pub index: BlockId,
    /// Instructions in execution order.
    #[serde(default)]
    pub instrs: Vec<ValueId>,
    /// Successor blocks in declared order.
    #[serde(default)]
    pub succs: Vec<BlockId>,
}

/// A source position.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct Pos {
    /// File name as reported by the Go toolchain (usually absolute).
    pub file: String,
    /// 1-based line.
    pub line: u32,
}

impl Pos {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// An SSA value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Value {
    /// go/ssa register name (`t3`) or the source name for parameters.
    #[serde(default)]
    pub name: String,
    /// Type as printed by go/types, e.g. `string` or `*net/http.Client`.
    #[serde(default)]
    pub ty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<Pos>,
    #[serde(flatten)]
    pub kind: ValueKind,
}

impl Value {
    /// Returns the call this value performs, if it is a call instruction.
    /// `go` and `defer` statements count as calls.
    pub fn as_call(&self) -> Option<&CallCommon> {
        match &self.kind {
            ValueKind::Call { call }
            | ValueKind::Go { call }
            | ValueKind::Defer { call } => Some(call),
            _ => None,
        }
    }
}

/// The kinds of SSA values the analysis distinguishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "instr", rename_all = "snake_case")]
pub enum ValueKind {
    /// A compile-time constant.
    Const { literal: Literal },
    /// The `index`th formal parameter of the enclosing function.
    Parameter { index: usize },
    /// The `index`th captured variable of the enclosing closure.
    FreeVar { index: usize },
    /// A reference to a function used as a value.
    Function { func: FunctionId },
    /// The address of a package-level variable.
    Global { global: String },
    /// A binary operation.
    BinOp { op: BinaryOp, x: ValueId, y: ValueId },
    /// A function or method call.
    Call { call: CallCommon },
    /// A call started in a new goroutine (`go f()`).
    Go { call: CallCommon },
    /// A call deferred to function exit (`defer f()`).
    Defer { call: CallCommon },
    /// Boxing of a concrete value into an interface.
    MakeInterface { x: ValueId },
    /// Creation of a closure with its captured variables.
    MakeClosure { func: FunctionId, bindings: Vec<ValueId> },
    /// Type conversion or change, e.g. `http.HandlerFunc(f)` or `string(b)`.
    Convert { x: ValueId },
    /// Merge of values flowing in from predecessor blocks.
    Phi { edges: Vec<ValueId> },
    /// Allocation of a local or heap variable.
    Alloc,
    /// Address of an element of an array or slice.
    IndexAddr { x: ValueId, index: ValueId },
    /// `*addr = val`.
    Store { addr: ValueId, val: ValueId },
    /// Slicing operation, e.g. the `[:]` go/ssa emits for variadic arguments.
    Slice { x: ValueId },
    Jump,
    If { cond: ValueId },
    Return {
        #[serde(default)]
        results: Vec<ValueId>,
    },
    /// Any other instruction. The analysis treats it as opaque.
    #[serde(other)]
    Other,
}

/// A constant literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

/// Binary operators. Only `Add` matters to the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    #[serde(other)]
    Other,
}

/// The operands of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CallCommon {
    pub callee: Callee,
    /// Actual arguments. For static method calls the receiver is argument 0;
    /// for interface invocations the receiver is held by [`Callee::Invoke`].
    #[serde(default)]
    pub args: Vec<ValueId>,
}

impl CallCommon {
    /// Arguments with the receiver of an interface invocation prepended, so
    /// argument indices line up with the static-call convention.
    pub fn arguments(&self) -> Vec<ValueId> {
        match &self.callee {
            Callee::Invoke { receiver, .. } => std::iter::once(*receiver)
                .chain(self.args.iter().copied())
                .collect(),
            Callee::Static { .. } | Callee::Dynamic { .. } => self.args.clone(),
        }
    }
}

/// How the callee of a call is determined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Callee {
    /// A statically known function or concrete method.
    Static { func: FunctionId },
    /// A call through a function value (closure, parameter, variable).
    Dynamic { value: ValueId },
    /// Dynamic dispatch of `method` on an interface value.
    Invoke { receiver: ValueId, method: String },
}

#[cfg(any(test, feature = "test-util"))]
pub mod builder;
