//! In-memory construction of SSA programs for tests.
//!
//! Mirrors the shapes go/ssa emits for the Go constructs the analysis cares
//! about, so tests can describe a service without running the bridge.
//!
//! ```ignore
//! use netdep_schemas::ssa::builder::ProgramBuilder;
//!
//! let mut program = ProgramBuilder::new();
//! let get = program.external("net/http", "Get");
//! let mut main = program.declare("example.com/svc/a", "main", "main");
//! let url = main.const_str("http://example.com/");
//! main.call(get, &[url], 5);
//! main.ret();
//! program.define(main);
//! let program = program.build();
//! assert!(program.main_function().is_some());
//! ```

use super::{
    BasicBlock, BinaryOp, BlockId, CallCommon, Callee, Function, FunctionId,
    Literal, Package, Param, Pos, Program, Value, ValueId, ValueKind,
};

/// Builds a [`Program`] function by function.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body-less function such as `net/http.Get`.
    pub fn external(&mut self, package_path: &str, name: &str) -> FunctionId {
        self.push(package_path, name, None)
    }

    /// Adds a body-less method such as `(*net/http.Client).Get`.
    pub fn external_method(
        &mut self,
        receiver: &str,
        package_path: &str,
        name: &str,
    ) -> FunctionId {
        self.push(package_path, name, Some(receiver))
    }

    /// Reserves a function with a body and returns a builder for it. The
    /// function's package name is given explicitly because `main` packages
    /// rarely match the last segment of their import path.
    pub fn declare(
        &mut self,
        package_path: &str,
        package_name: &str,
        name: &str,
    ) -> FunctionBuilder {
        let id = self.push(package_path, name, None);
        self.register_package(package_path, package_name);
        let function = &mut self.program.functions[id.0 as usize];
        function.package_name = package_name.to_string();
        FunctionBuilder::new(function.clone())
    }

    /// Reserves a method with a body.
    pub fn declare_method(
        &mut self,
        receiver: &str,
        package_path: &str,
        package_name: &str,
        name: &str,
    ) -> FunctionBuilder {
        let mut builder = self.declare(package_path, package_name, name);
        builder.function.receiver = Some(receiver.to_string());
        builder
    }

    /// Stores a finished function body in its reserved slot.
    pub fn define(&mut self, builder: FunctionBuilder) {
        let function = builder.finish();
        let slot = function.id.0 as usize;
        self.program.functions[slot] = function;
    }

    /// Registers `func` as method `method` of the concrete type `type_name`.
    pub fn add_method(
        &mut self,
        type_name: &str,
        method: &str,
        func: FunctionId,
    ) {
        self.program
            .method_sets
            .entry(type_name.to_string())
            .or_default()
            .insert(method.to_string(), func);
    }

    /// Records load errors for a package.
    pub fn package_errors(&mut self, package_path: &str, errors: &[&str]) {
        let name = last_segment(package_path);
        self.register_package(package_path, name);
        if let Some(package) = self
            .program
            .packages
            .iter_mut()
            .find(|p| p.path == package_path)
        {
            package.errors = errors.iter().map(|e| (*e).to_string()).collect();
        }
    }

    pub fn build(self) -> Program {
        self.program
    }

    fn push(
        &mut self,
        package_path: &str,
        name: &str,
        receiver: Option<&str>,
    ) -> FunctionId {
        let id = FunctionId(
            u32::try_from(self.program.functions.len())
                .expect("test programs have fewer than 2^32 functions"),
        );
        self.program.functions.push(Function {
            id,
            name: name.to_string(),
            package_path: package_path.to_string(),
            package_name: last_segment(package_path).to_string(),
            receiver: receiver.map(str::to_string),
            ..Default::default()
        });
        id
    }

    fn register_package(&mut self, path: &str, name: &str) {
        if !self.program.packages.iter().any(|p| p.path == path) {
            self.program.packages.push(Package {
                path: path.to_string(),
                name: name.to_string(),
                errors: Vec::new(),
            });
        }
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Builds the body of one function.
///
/// Instructions are appended to the current block, which starts out as the
/// entry block. Positions use the builder's file (default `main.go`) and the
/// line passed to each call-like instruction.
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    current: BlockId,
    file: String,
}

impl FunctionBuilder {
    fn new(mut function: Function) -> Self {
        function.blocks.push(BasicBlock::default());
        Self {
            function,
            current: BlockId(0),
            file: "main.go".to_string(),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.function.id
    }

    /// Sets the file reported for positions created from now on.
    #[must_use]
    pub fn in_file(mut self, file: &str) -> Self {
        self.file = file.to_string();
        self
    }

    /// Adds a formal parameter.
    pub fn param(&mut self, name: &str, ty: &str) -> ValueId {
        let index = self.function.params.len();
        let value = self.value(name, ty, ValueKind::Parameter { index });
        self.function.params.push(Param {
            name: name.to_string(),
            value,
        });
        value
    }

    /// Adds a captured variable.
    pub fn free_var(&mut self, name: &str, ty: &str) -> ValueId {
        let index = self.function.free_vars.len();
        let value = self.value(name, ty, ValueKind::FreeVar { index });
        self.function.free_vars.push(Param {
            name: name.to_string(),
            value,
        });
        value
    }

    pub fn const_str(&mut self, s: &str) -> ValueId {
        self.value(
            "",
            "string",
            ValueKind::Const {
                literal: Literal::String(s.to_string()),
            },
        )
    }

    pub fn const_int(&mut self, i: i64) -> ValueId {
        self.value(
            "",
            "int",
            ValueKind::Const {
                literal: Literal::Int(i),
            },
        )
    }

    pub fn nil(&mut self, ty: &str) -> ValueId {
        self.value(
            "",
            ty,
            ValueKind::Const {
                literal: Literal::Nil,
            },
        )
    }

    pub fn global(&mut self, name: &str, ty: &str) -> ValueId {
        self.value(
            name,
            ty,
            ValueKind::Global {
                global: name.to_string(),
            },
        )
    }

    /// A function used as a value, e.g. a handler passed by name.
    pub fn func_ref(&mut self, func: FunctionId) -> ValueId {
        self.value("", "func()", ValueKind::Function { func })
    }

    /// String concatenation `x + y`.
    pub fn add(&mut self, x: ValueId, y: ValueId) -> ValueId {
        self.instr(
            "string",
            None,
            ValueKind::BinOp {
                op: BinaryOp::Add,
                x,
                y,
            },
        )
    }

    /// Integer arithmetic, which the analysis never resolves.
    pub fn binop(&mut self, op: BinaryOp, x: ValueId, y: ValueId) -> ValueId {
        self.instr("int", None, ValueKind::BinOp { op, x, y })
    }

    /// Static call of a function or concrete method.
    pub fn call(
        &mut self,
        func: FunctionId,
        args: &[ValueId],
        line: u32,
    ) -> ValueId {
        self.call_common(Callee::Static { func }, args, line)
    }

    /// `go f(args...)`.
    pub fn go(&mut self, func: FunctionId, args: &[ValueId], line: u32) -> ValueId {
        let pos = Pos::new(self.file.clone(), line);
        self.instr(
            "",
            Some(pos),
            ValueKind::Go {
                call: CallCommon {
                    callee: Callee::Static { func },
                    args: args.to_vec(),
                },
            },
        )
    }

    /// Call through a function value.
    pub fn call_value(
        &mut self,
        value: ValueId,
        args: &[ValueId],
        line: u32,
    ) -> ValueId {
        self.call_common(Callee::Dynamic { value }, args, line)
    }

    /// Interface method invocation.
    pub fn invoke(
        &mut self,
        receiver: ValueId,
        method: &str,
        args: &[ValueId],
        line: u32,
    ) -> ValueId {
        self.call_common(
            Callee::Invoke {
                receiver,
                method: method.to_string(),
            },
            args,
            line,
        )
    }

    pub fn make_interface(&mut self, x: ValueId, ty: &str) -> ValueId {
        self.instr(ty, None, ValueKind::MakeInterface { x })
    }

    pub fn make_closure(
        &mut self,
        func: FunctionId,
        bindings: &[ValueId],
    ) -> ValueId {
        self.instr(
            "func()",
            None,
            ValueKind::MakeClosure {
                func,
                bindings: bindings.to_vec(),
            },
        )
    }

    pub fn convert(&mut self, x: ValueId, ty: &str) -> ValueId {
        self.instr(ty, None, ValueKind::Convert { x })
    }

    /// Allocates a value of type `ty`, e.g. `*example.com/svc.Handler`.
    pub fn alloc(&mut self, ty: &str) -> ValueId {
        self.instr(ty, None, ValueKind::Alloc)
    }

    pub fn phi(&mut self, edges: &[ValueId], ty: &str) -> ValueId {
        self.instr(
            ty,
            None,
            ValueKind::Phi {
                edges: edges.to_vec(),
            },
        )
    }

    /// Builds the `new [n]any; &t[i] = ...; t[:]` sequence go/ssa emits for
    /// a variadic `...any` argument, returning the final slice.
    pub fn varargs(&mut self, elems: &[ValueId]) -> ValueId {
        let array = self.alloc("*[]any");
        for (i, &elem) in elems.iter().enumerate() {
            let index = self.const_int(i64::try_from(i).unwrap_or(i64::MAX));
            let addr = self.instr("*any", None, ValueKind::IndexAddr {
                x: array,
                index,
            });
            let boxed = self.make_interface(elem, "any");
            self.instr("", None, ValueKind::Store {
                addr,
                val: boxed,
            });
        }
        self.instr("[]any", None, ValueKind::Slice { x: array })
    }

    /// Creates a new, empty block without switching to it.
    pub fn new_block(&mut self) -> BlockId {
        let index = BlockId(
            u32::try_from(self.function.blocks.len())
                .expect("test functions have fewer than 2^32 blocks"),
        );
        self.function.blocks.push(BasicBlock {
            index,
            ..Default::default()
        });
        index
    }

    /// Makes `block` the target of subsequent instructions.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn jump(&mut self, to: BlockId) {
        self.instr("", None, ValueKind::Jump);
        self.block_mut().succs.push(to);
    }

    pub fn branch(&mut self, cond: ValueId, then: BlockId, otherwise: BlockId) {
        self.instr("", None, ValueKind::If { cond });
        self.block_mut().succs.extend([then, otherwise]);
    }

    pub fn ret(&mut self) {
        self.instr("", None, ValueKind::Return {
            results: Vec::new(),
        });
    }

    pub fn finish(self) -> Function {
        self.function
    }

    fn call_common(
        &mut self,
        callee: Callee,
        args: &[ValueId],
        line: u32,
    ) -> ValueId {
        let pos = Pos::new(self.file.clone(), line);
        self.instr(
            "",
            Some(pos),
            ValueKind::Call {
                call: CallCommon {
                    callee,
                    args: args.to_vec(),
                },
            },
        )
    }

    fn block_mut(&mut self) -> &mut BasicBlock {
        &mut self.function.blocks[self.current.0 as usize]
    }

    fn next_id(&self) -> ValueId {
        ValueId(
            u32::try_from(self.function.values.len())
                .expect("test functions have fewer than 2^32 values"),
        )
    }

    fn value(&mut self, name: &str, ty: &str, kind: ValueKind) -> ValueId {
        let id = self.next_id();
        let name = if name.is_empty() {
            format!("t{}", id.0)
        } else {
            name.to_string()
        };
        self.function.values.push(Value {
            name,
            ty: ty.to_string(),
            pos: None,
            kind,
        });
        id
    }

    fn instr(
        &mut self,
        ty: &str,
        pos: Option<Pos>,
        kind: ValueKind,
    ) -> ValueId {
        let id = self.value("", ty, kind);
        self.function.values[id.0 as usize].pos = pos;
        self.block_mut().instrs.push(id);
        id
    }
}
