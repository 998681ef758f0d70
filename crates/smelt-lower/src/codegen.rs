//! AST-to-IR lowering.
//!
//! Rewrites structured control flow (`if`, `while`, `for`) and
//! short-circuit booleans into conditional jumps, and structured data
//! access into address arithmetic. Type checking happens in the same run.
//!
//! Expression lowering returns an [`ExprOutcome`]: normally a value with
//! its derived type and l-value-ness, exceptionally a module reference
//! that only member lowering may consume. Callers that need an r-value go
//! through [`CodeGenerator::make_rvalue`], which inserts the load when the
//! lowered expression denotes a storage location.
//!
//! Statement-level errors go to the diagnostic sink and lowering
//! continues with the next statement; the module fails as a whole at the
//! end.

use std::collections::HashMap;

use tracing::debug;

use smelt_ast::{
    ArithOp, BinOp, CmpOp, CompileError, Expr, FunctionDecl, Literal, LogicOp, ModuleId, Program,
    SourceLoc, Stmt, Symbol, SymbolId, Type, TypeId, UnOp,
};
use smelt_ir::{
    BinOp as IrBinOp, Builder, CondOp, ConstValue, Instr, InstrId, IrType, Module as IrModule,
    Parameter,
};
use smelt_layout::{ConstVal, LayoutService, TargetInfo};

/// A lowered expression: the IR value plus derived facts. When `lvalue`
/// is set the value is the *address* of the denoted location.
#[derive(Debug, Clone, Copy)]
pub struct Lowered {
    pub value: InstrId,
    pub typ: TypeId,
    pub lvalue: bool,
}

/// What expression lowering can produce. `ModuleRef` is consumed only by
/// member lowering; everywhere else it is a type error.
#[derive(Debug, Clone, Copy)]
pub enum ExprOutcome {
    Value(Lowered),
    ModuleRef(ModuleId),
}

/// Where a variable lives: a local stack slot or a module-level symbol.
#[derive(Debug, Clone)]
enum VarSlot {
    Local(InstrId),
    Global(String),
}

/// Packs a string literal: 4-byte little-endian length prefix followed by
/// the ASCII bytes. This image is bit-exact across targets.
pub fn pack_string(text: &str) -> Vec<u8> {
    let mut data = (text.len() as u32).to_le_bytes().to_vec();
    data.extend(text.bytes());
    data
}

/// Lowers a typed AST program into IR modules.
pub struct CodeGenerator<'p> {
    program: &'p Program,
    target: &'p TargetInfo,
    builder: Builder,
    diag: smelt_ast::DiagnosticSink,
    var_map: HashMap<SymbolId, VarSlot>,
    /// Modules whose globals were generated but whose code has not been.
    pending: HashMap<ModuleId, IrModule>,
    layout: Option<LayoutService<'p>>,
    current_module: Option<ModuleId>,
    current_func: Option<SymbolId>,
}

impl<'p> CodeGenerator<'p> {
    pub fn new(program: &'p Program, target: &'p TargetInfo) -> Self {
        CodeGenerator {
            program,
            target,
            builder: Builder::new(),
            diag: smelt_ast::DiagnosticSink::new(),
            var_map: HashMap::new(),
            pending: HashMap::new(),
            layout: None,
            current_module: None,
            current_func: None,
        }
    }

    /// Statement-level errors accumulated so far.
    pub fn errors(&self) -> &[CompileError] {
        self.diag.errors()
    }

    fn layout(&self) -> &LayoutService<'p> {
        self.layout.as_ref().expect("no layout service installed")
    }

    // -- entry points -----------------------------------------------------

    /// Creates the IR module and room for every module-level variable.
    /// Must run for all modules before any `gen_code` call so that
    /// cross-module references resolve.
    pub fn gen_globals(&mut self, module: ModuleId) -> Result<(), CompileError> {
        let ast_mod = self.program.module(module);
        let layout = LayoutService::new(self.target, self.program, module);
        let mut ir_mod = IrModule::new(&ast_mod.name);

        for &vsym in &ast_mod.variables {
            let var = match self.program.symbol(vsym) {
                Symbol::Var(v) => v,
                other => panic!("module variable is not a variable: {}", other.name()),
            };
            let size = layout.size_of(var.typ)?;
            ir_mod.add_variable(smelt_ir::GlobalVar {
                name: var.name.clone(),
                size,
            });
            self.var_map.insert(vsym, VarSlot::Global(var.name.clone()));
        }

        self.pending.insert(module, ir_mod);
        Ok(())
    }

    /// Generates code for a single module. Every declared type is
    /// validated first; only functions with a body are lowered. Any
    /// statement-level error marks the module invalid and it fails as a
    /// whole at the end.
    pub fn gen_code(&mut self, module: ModuleId) -> Result<IrModule, CompileError> {
        if !self.pending.contains_key(&module) {
            self.gen_globals(module)?;
        }

        let ast_mod = self.program.module(module);
        debug!("generating ir-code for {}", ast_mod.name);

        self.diag = smelt_ast::DiagnosticSink::new();
        self.builder.prepare();
        let ir_mod = self.pending.remove(&module).expect("globals just generated");
        self.builder.set_module(ir_mod);
        self.layout = Some(LayoutService::new(self.target, self.program, module));
        self.current_module = Some(module);

        for &tid in &ast_mod.types {
            if let Err(e) = self.layout().check_type(tid) {
                self.diag.report(e);
            }
        }

        // Only generate functions that have a body:
        let real_functions: Vec<SymbolId> = ast_mod
            .functions
            .iter()
            .copied()
            .filter(|&f| matches!(self.program.symbol(f), Symbol::Func(d) if d.body.is_some()))
            .collect();
        for func in real_functions {
            if let Err(e) = self.gen_function(func) {
                self.diag.report(e);
            }
        }

        self.current_module = None;
        if self.diag.has_errors() {
            Err(CompileError::Invalid {
                module: ast_mod.name.clone(),
                errors: self.diag.errors().len(),
            })
        } else {
            Ok(self.builder.take_module())
        }
    }

    // -- functions --------------------------------------------------------

    /// Lowers one function: stack slots for every inner-scope symbol,
    /// parameter copy-in, the body, and the terminal jump into the
    /// epilogue.
    fn gen_function(&mut self, fsym: SymbolId) -> Result<(), CompileError> {
        let decl = match self.program.symbol(fsym) {
            Symbol::Func(d) => d,
            other => panic!("not a function symbol: {}", other.name()),
        };
        // The function carries its linker-visible name so call sites and
        // the labels of the compiled body agree.
        let name = self.mangled_name(decl);
        debug!("generating function {}", name);

        let ir_func = self.builder.new_function(&name);
        self.builder.set_function(Some(ir_func));
        self.current_func = Some(fsym);

        // A synthetic preamble jumps into the entry block, which keeps
        // the entry block a proper join target.
        let preamble = self.builder.new_block();
        self.builder.set_block(preamble);
        let entry = self.builder.new_block();
        self.builder.emit(Instr::Jump { target: entry });
        self.builder.set_block(entry);

        // Room for locals; parameters additionally get copied into their
        // slot so the later mem-to-reg pass can take over.
        let mut param_index = 0u32;
        for &sym in &decl.locals {
            let var = match self.program.symbol(sym) {
                Symbol::Var(v) => v,
                other => panic!("function local is not a variable: {}", other.name()),
            };
            self.layout().check_type(var.typ)?;
            let size = self.layout().size_of(var.typ)?;
            let slot = self.builder.emit(Instr::Alloc {
                name: format!("var_{}", var.name),
                size,
            });
            if var.is_parameter {
                // Parameters are fixed at i32 for now.
                self.builder.add_parameter(Parameter {
                    name: var.name.clone(),
                    ty: IrType::I32,
                });
                let value = self.builder.emit(Instr::Param {
                    index: param_index,
                    name: var.name.clone(),
                    ty: IrType::I32,
                });
                param_index += 1;
                self.builder.emit(Instr::Store {
                    value,
                    addr: slot,
                    volatile: false,
                });
            }
            self.var_map.insert(sym, VarSlot::Local(slot));
        }

        let body = decl.body.as_ref().expect("function without body");
        self.gen_stmt(body);

        // Unconditional; dead when control already returned. A later
        // dead-code pass cleans this up.
        let epilogue = self.builder.func().epilogue;
        self.builder.emit(Instr::Jump { target: epilogue });
        self.builder.set_block(epilogue);
        self.builder.set_function(None);
        self.current_func = None;
        Ok(())
    }

    // -- statements -------------------------------------------------------

    /// Lowers a statement, reporting any error to the sink so lowering can
    /// continue with the next statement.
    fn gen_stmt(&mut self, stmt: &Stmt) {
        self.builder.set_loc(stmt.loc());
        if let Err(e) = self.lower_stmt(stmt) {
            self.diag.report(e);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Compound { statements, .. } => {
                for s in statements {
                    self.gen_stmt(s);
                }
                Ok(())
            }
            Stmt::Empty { .. } => Ok(()),
            Stmt::Assignment {
                lval,
                rval,
                shorthand,
                loc,
            } => self.gen_assignment(lval, rval, *shorthand, *loc),
            Stmt::ExpressionStatement { expr, loc } => {
                self.gen_expr(expr)?;
                // Only a call has a useful void effect.
                if !matches!(expr, Expr::FunctionCall { .. }) {
                    return Err(CompileError::unsupported("Not a call expression", Some(*loc)));
                }
                Ok(())
            }
            Stmt::If {
                condition,
                then_stmt,
                else_stmt,
                ..
            } => self.gen_if(condition, then_stmt, else_stmt),
            Stmt::Return { expr, .. } => self.gen_return(expr),
            Stmt::While {
                condition, body, ..
            } => self.gen_while(condition, body),
            Stmt::For {
                init,
                condition,
                step,
                body,
                ..
            } => self.gen_for(init, condition, step, body),
        }
    }

    fn gen_assignment(
        &mut self,
        lval: &Expr,
        rval: &Expr,
        shorthand: Option<ArithOp>,
        loc: SourceLoc,
    ) -> Result<(), CompileError> {
        let lhs = self.gen_value(lval)?;

        if !self.program.types.is_simple(lhs.typ) {
            return Err(CompileError::type_error(
                format!("Cannot assign to complex type {}", self.type_name(lhs.typ)),
                loc,
            ));
        }
        if !lhs.lvalue {
            return Err(CompileError::lvalue("No valid lvalue", lval.loc()));
        }

        let rhs = self.make_rvalue(rval)?;
        let mut value = self.do_coerce(rhs.value, rhs.typ, lhs.typ, loc)?;

        // Shorthands (+=, -= ...) evaluate the left side once: load it,
        // combine, store back.
        if let Some(op) = shorthand {
            let load_ty = self.get_ir_type(lhs.typ, lval.loc())?;
            let loaded = self.builder.emit(Instr::Load {
                addr: lhs.value,
                name: "assign_op_load".into(),
                ty: load_ty,
            });
            value = self.builder.emit(Instr::Binop {
                a: loaded,
                op: ir_binop(op),
                b: value,
                name: "binop".into(),
                ty: load_ty,
            });
        }

        // TODO: derive volatility from the variable's type instead of
        // treating every store as volatile.
        self.builder.emit(Instr::Store {
            value,
            addr: lhs.value,
            volatile: true,
        });
        Ok(())
    }

    fn gen_if(&mut self, condition: &Expr, then_stmt: &Stmt, else_stmt: &Stmt) -> Result<(), CompileError> {
        let true_block = self.builder.new_block();
        let false_block = self.builder.new_block();
        let final_block = self.builder.new_block();
        self.gen_cond(condition, true_block, false_block)?;
        self.builder.set_block(true_block);
        self.gen_stmt(then_stmt);
        self.builder.emit(Instr::Jump { target: final_block });
        self.builder.set_block(false_block);
        self.gen_stmt(else_stmt);
        self.builder.emit(Instr::Jump { target: final_block });
        self.builder.set_block(final_block);
        Ok(())
    }

    fn gen_while(&mut self, condition: &Expr, body: &Stmt) -> Result<(), CompileError> {
        let body_block = self.builder.new_block();
        let test_block = self.builder.new_block();
        let final_block = self.builder.new_block();
        self.builder.emit(Instr::Jump { target: test_block });
        self.builder.set_block(test_block);
        self.gen_cond(condition, body_block, final_block)?;
        self.builder.set_block(body_block);
        self.gen_stmt(body);
        self.builder.emit(Instr::Jump { target: test_block });
        self.builder.set_block(final_block);
        Ok(())
    }

    fn gen_for(
        &mut self,
        init: &Stmt,
        condition: &Expr,
        step: &Stmt,
        body: &Stmt,
    ) -> Result<(), CompileError> {
        let body_block = self.builder.new_block();
        let test_block = self.builder.new_block();
        let final_block = self.builder.new_block();
        self.gen_stmt(init);
        self.builder.emit(Instr::Jump { target: test_block });
        self.builder.set_block(test_block);
        self.gen_cond(condition, body_block, final_block)?;
        self.builder.set_block(body_block);
        self.gen_stmt(body);
        self.gen_stmt(step);
        self.builder.emit(Instr::Jump { target: test_block });
        self.builder.set_block(final_block);
        Ok(())
    }

    fn gen_return(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let value = self.make_rvalue(expr)?;
        self.builder.emit(Instr::Return { value: value.value });
        // Anything following the return still needs an emission target.
        let unreachable_block = self.builder.new_block();
        self.builder.set_block(unreachable_block);
        Ok(())
    }

    // -- conditions -------------------------------------------------------

    /// Lowers a boolean expression straight into control flow; no boolean
    /// value is ever materialized.
    fn gen_cond(
        &mut self,
        expr: &Expr,
        true_block: smelt_ir::BlockId,
        false_block: smelt_ir::BlockId,
    ) -> Result<(), CompileError> {
        match expr {
            Expr::Binop {
                a,
                op: BinOp::Logic(LogicOp::Or),
                b,
                ..
            } => {
                // a is false? then try b.
                let second = self.builder.new_block();
                self.gen_cond(a, true_block, second)?;
                self.builder.set_block(second);
                self.gen_cond(b, true_block, false_block)
            }
            Expr::Binop {
                a,
                op: BinOp::Logic(LogicOp::And),
                b,
                ..
            } => {
                // a is true? then try b.
                let second = self.builder.new_block();
                self.gen_cond(a, second, false_block)?;
                self.builder.set_block(second);
                self.gen_cond(b, true_block, false_block)
            }
            Expr::Binop {
                a,
                op: BinOp::Cmp(op),
                b,
                loc,
            } => {
                let ta = self.make_rvalue(a)?;
                let tb = self.make_rvalue(b)?;
                if ta.typ != tb.typ {
                    return Err(CompileError::type_error(
                        format!(
                            "Types unequal {} != {}",
                            self.type_name(ta.typ),
                            self.type_name(tb.typ)
                        ),
                        *loc,
                    ));
                }
                self.builder.emit(Instr::CJump {
                    a: ta.value,
                    cond: cond_op(*op),
                    b: tb.value,
                    if_true: true_block,
                    if_false: false_block,
                });
                Ok(())
            }
            Expr::Binop { op, loc, .. } => Err(CompileError::type_error(
                format!("non-bool: {op:?}"),
                *loc,
            )),
            Expr::Literal { value, loc } => {
                let lowered = self.gen_value(expr)?;
                let truthy = match value {
                    Literal::Bool(v) => *v,
                    Literal::Int(v) => *v != 0,
                    Literal::Float(v) => *v != 0.0,
                    Literal::Str(s) => !s.is_empty(),
                };
                let target = if truthy { true_block } else { false_block };
                self.builder.emit(Instr::Jump { target });
                // The condition must still be boolean; flag the mismatch
                // without aborting the enclosing statement.
                if lowered.typ != TypeId::BOOL {
                    self.diag
                        .report(CompileError::type_error("Condition must be boolean", *loc));
                }
                Ok(())
            }
            other => Err(CompileError::unsupported(
                "Unknown condition",
                Some(other.loc()),
            )),
        }
    }

    // -- expressions ------------------------------------------------------

    /// Lowers an expression and inserts the extra load when the result
    /// denotes a storage location, so it can be used as an operand or
    /// argument.
    pub fn make_rvalue(&mut self, expr: &Expr) -> Result<Lowered, CompileError> {
        let lowered = self.gen_value(expr)?;
        if lowered.lvalue {
            let load_ty = self.get_ir_type(lowered.typ, expr.loc())?;
            let value = self.builder.emit(Instr::Load {
                addr: lowered.value,
                name: "loaded".into(),
                ty: load_ty,
            });
            Ok(Lowered {
                value,
                typ: lowered.typ,
                lvalue: false,
            })
        } else {
            Ok(lowered)
        }
    }

    /// Lowers an expression, rejecting module references.
    fn gen_value(&mut self, expr: &Expr) -> Result<Lowered, CompileError> {
        match self.gen_expr(expr)? {
            ExprOutcome::Value(v) => Ok(v),
            ExprOutcome::ModuleRef(_) => Err(CompileError::type_error(
                "module used as a value",
                expr.loc(),
            )),
        }
    }

    /// Lowers an expression and returns the generated IR value (or a
    /// module reference for member lowering to consume).
    pub fn gen_expr(&mut self, expr: &Expr) -> Result<ExprOutcome, CompileError> {
        match expr {
            Expr::Binop { a, op, b, loc } => self.gen_binop(a, *op, b, *loc).map(ExprOutcome::Value),
            Expr::Unop { op, a, loc } => self.gen_unop(*op, a, *loc).map(ExprOutcome::Value),
            Expr::Identifier { name, loc } => {
                let module = self.current_module.expect("no module context");
                let sym = self
                    .program
                    .resolve(module, self.current_func, name)
                    .ok_or_else(|| {
                        CompileError::type_error(format!("undefined name '{name}'"), *loc)
                    })?;
                self.gen_symbol(sym, *loc)
            }
            Expr::Deref { ptr, loc } => self.gen_deref(ptr, *loc).map(ExprOutcome::Value),
            Expr::Member { base, field, loc } => self.gen_member(base, field, *loc),
            Expr::Index { base, index, loc } => {
                self.gen_index(base, index, *loc).map(ExprOutcome::Value)
            }
            Expr::Literal { value, loc } => self.gen_literal(value, *loc).map(ExprOutcome::Value),
            Expr::TypeCast { to, a, loc } => {
                self.gen_type_cast(*to, a, *loc).map(ExprOutcome::Value)
            }
            Expr::Sizeof { query, loc } => self.gen_sizeof(*query, *loc).map(ExprOutcome::Value),
            Expr::FunctionCall { callee, args, loc } => {
                self.gen_call(callee, args, *loc).map(ExprOutcome::Value)
            }
        }
    }

    fn gen_symbol(&mut self, sym: SymbolId, loc: SourceLoc) -> Result<ExprOutcome, CompileError> {
        match self.program.symbol(sym) {
            Symbol::Var(var) => {
                let slot = self
                    .var_map
                    .get(&sym)
                    .cloned()
                    .unwrap_or_else(|| panic!("variable '{}' has no slot", var.name));
                let value = match slot {
                    VarSlot::Local(instr) => instr,
                    VarSlot::Global(name) => self.builder.emit(Instr::GlobalRef { name }),
                };
                Ok(ExprOutcome::Value(Lowered {
                    value,
                    typ: var.typ,
                    lvalue: true,
                }))
            }
            Symbol::Const(c) => {
                let typ = c.typ;
                let name = c.name.clone();
                let value = self.layout().eval(&c.value)?;
                let ir_ty = self.get_ir_type(typ, loc)?;
                let const_value = match value {
                    ConstVal::Int(v) => ConstValue::Int(v),
                    ConstVal::Float(v) => ConstValue::Float(v),
                    ConstVal::Ptr(_) => {
                        return Err(CompileError::type_error(
                            "constant does not have a plain value",
                            loc,
                        ))
                    }
                };
                let value = self.builder.emit(Instr::Const {
                    value: const_value,
                    name,
                    ty: ir_ty,
                });
                Ok(ExprOutcome::Value(Lowered {
                    value,
                    typ,
                    lvalue: false,
                }))
            }
            Symbol::EnumConst(e) => {
                let v = self.layout().enum_value(e.owner, &e.name)?;
                let value = self.builder.emit(Instr::Const {
                    value: ConstValue::Int(v),
                    name: e.name.clone(),
                    ty: IrType::I32,
                });
                // Enum constants act as plain ints.
                Ok(ExprOutcome::Value(Lowered {
                    value,
                    typ: TypeId::INT,
                    lvalue: false,
                }))
            }
            Symbol::Module(mid) => Ok(ExprOutcome::ModuleRef(*mid)),
            Symbol::Func(f) => Err(CompileError::unsupported(
                format!("cannot use function '{}' as a value", f.name),
                Some(loc),
            )),
        }
    }

    fn gen_binop(
        &mut self,
        a: &Expr,
        op: BinOp,
        b: &Expr,
        loc: SourceLoc,
    ) -> Result<Lowered, CompileError> {
        let op = match op {
            BinOp::Arith(op) => op,
            other => {
                return Err(CompileError::type_error(
                    format!("Cannot use {other:?}"),
                    loc,
                ))
            }
        };

        let a_val = self.make_rvalue(a)?;
        let b_val = self.make_rvalue(b)?;

        // Get best type for result:
        let common = self.common_type(a_val.typ, b_val.typ, loc)?;

        let a_ir = self.do_coerce(a_val.value, a_val.typ, common, a.loc())?;
        let b_ir = self.do_coerce(b_val.value, b_val.typ, common, b.loc())?;
        let ty = self.get_ir_type(common, loc)?;

        let value = self.builder.emit(Instr::Binop {
            a: a_ir,
            op: ir_binop(op),
            b: b_ir,
            name: "binop".into(),
            ty,
        });
        Ok(Lowered {
            value,
            typ: common,
            lvalue: false,
        })
    }

    fn gen_unop(&mut self, op: UnOp, a: &Expr, loc: SourceLoc) -> Result<Lowered, CompileError> {
        match op {
            UnOp::AddressOf => {
                let inner = self.gen_value(a)?;
                if !inner.lvalue {
                    return Err(CompileError::lvalue("No valid lvalue", a.loc()));
                }
                // The address *is* the value; no load happens. The type
                // table is immutable during lowering, so the pointer type
                // must already be registered by the front-end.
                let typ = self.program.types.find_pointer(inner.typ).ok_or_else(|| {
                    CompileError::type_error(
                        format!("no pointer type declared for {}", self.type_name(inner.typ)),
                        loc,
                    )
                })?;
                Ok(Lowered {
                    value: inner.value,
                    typ,
                    lvalue: false,
                })
            }
            UnOp::Neg => Err(CompileError::unsupported(
                "unary operator not supported",
                Some(loc),
            )),
        }
    }

    fn gen_deref(&mut self, ptr: &Expr, loc: SourceLoc) -> Result<Lowered, CompileError> {
        let inner = self.gen_value(ptr)?;
        let pointee = match self.program.types.get(inner.typ) {
            Some(Type::Pointer { pointee }) => *pointee,
            _ => {
                return Err(CompileError::type_error("Cannot deref non-pointer", loc));
            }
        };

        // When the pointer expression is itself an l-value, its lowered
        // value is the pointer's *address*; fetch the pointer first.
        let value = if inner.lvalue {
            self.builder.emit(Instr::Load {
                addr: inner.value,
                name: "deref".into(),
                ty: IrType::Ptr,
            })
        } else {
            inner.value
        };
        Ok(Lowered {
            value,
            typ: pointee,
            lvalue: true,
        })
    }

    fn gen_member(
        &mut self,
        base: &Expr,
        field: &str,
        loc: SourceLoc,
    ) -> Result<ExprOutcome, CompileError> {
        let outcome = self.gen_expr(base)?;

        let lowered_base = match outcome {
            // Referring to something inside another module; invoke the
            // scope machinery of that module instead.
            ExprOutcome::ModuleRef(mid) => {
                let sym = self.program.resolve(mid, None, field).ok_or_else(|| {
                    CompileError::type_error(
                        format!(
                            "module '{}' has no member '{}'",
                            self.program.module(mid).name,
                            field
                        ),
                        loc,
                    )
                })?;
                return self.gen_symbol(sym, loc);
            }
            ExprOutcome::Value(v) => v,
        };

        let (field_typ, record_typ) = match self.program.types.get(lowered_base.typ) {
            Some(Type::Record(rec)) if rec.kind == smelt_ast::RecordKind::Struct => {
                match rec.fields.get(field) {
                    Some(f) => (f.typ, lowered_base.typ),
                    None => {
                        return Err(CompileError::type_error(
                            format!(
                                "{} does not contain field {}",
                                self.type_name(lowered_base.typ),
                                field
                            ),
                            loc,
                        ))
                    }
                }
            }
            _ => {
                return Err(CompileError::type_error(
                    format!(
                        "Cannot select {} of non-structure type {}",
                        field,
                        self.type_name(lowered_base.typ)
                    ),
                    loc,
                ))
            }
        };

        // Addresses of fields only exist for addressable structs.
        if !lowered_base.lvalue {
            return Err(CompileError::lvalue("No valid lvalue", base.loc()));
        }

        // Calculate the field address: base + offset.
        let offset = self.layout().offset_of(record_typ, field)?;
        let offset_const = self.builder.emit(Instr::Const {
            value: ConstValue::Int(offset as i64),
            name: "offset".into(),
            ty: IrType::I32,
        });
        let offset_ptr = self.builder.emit(Instr::IntToPtr {
            value: offset_const,
            name: "offset".into(),
        });
        let addr = self.builder.emit(Instr::Binop {
            a: lowered_base.value,
            op: IrBinOp::Add,
            b: offset_ptr,
            name: "mem_addr".into(),
            ty: IrType::Ptr,
        });
        Ok(ExprOutcome::Value(Lowered {
            value: addr,
            typ: field_typ,
            lvalue: true,
        }))
    }

    fn gen_index(
        &mut self,
        base: &Expr,
        index: &Expr,
        _loc: SourceLoc,
    ) -> Result<Lowered, CompileError> {
        let lowered_base = self.gen_value(base)?;
        let idx = self.make_rvalue(index)?;

        let element = match self.program.types.get(lowered_base.typ) {
            Some(Type::Array { element, .. }) => *element,
            _ => {
                return Err(CompileError::type_error(
                    format!(
                        "Cannot index non-array type {}",
                        self.type_name(lowered_base.typ)
                    ),
                    base.loc(),
                ))
            }
        };

        // Make sure the index is an integer:
        let idx_ir = self.do_coerce(idx.value, idx.typ, TypeId::INT, index.loc())?;

        // The base address must be a location value.
        if !lowered_base.lvalue {
            return Err(CompileError::lvalue("No valid lvalue", base.loc()));
        }

        let element_size = self.layout().size_of(element)?;
        let size_const = self.builder.emit(Instr::Const {
            value: ConstValue::Int(element_size as i64),
            name: "element_size".into(),
            ty: IrType::I32,
        });
        let offset = self.builder.emit(Instr::Binop {
            a: idx_ir,
            op: IrBinOp::Mul,
            b: size_const,
            name: "element_offset".into(),
            ty: IrType::I32,
        });
        let offset_ptr = self.builder.emit(Instr::IntToPtr {
            value: offset,
            name: "elem_offset".into(),
        });
        let addr = self.builder.emit(Instr::Binop {
            a: lowered_base.value,
            op: IrBinOp::Add,
            b: offset_ptr,
            name: "element_address".into(),
            ty: IrType::Ptr,
        });
        Ok(Lowered {
            value: addr,
            typ: element,
            lvalue: true,
        })
    }

    fn gen_literal(&mut self, value: &Literal, _loc: SourceLoc) -> Result<Lowered, CompileError> {
        let (value, typ) = match value {
            Literal::Int(v) => (
                self.builder.emit(Instr::Const {
                    value: ConstValue::Int(*v),
                    name: "cnst".into(),
                    ty: IrType::I32,
                }),
                TypeId::INT,
            ),
            Literal::Bool(v) => (
                // Booleans use the integer storage class.
                self.builder.emit(Instr::Const {
                    value: ConstValue::Int(*v as i64),
                    name: "bool_cnst".into(),
                    ty: IrType::I32,
                }),
                TypeId::BOOL,
            ),
            Literal::Float(v) => (
                self.builder.emit(Instr::Const {
                    value: ConstValue::Float(*v),
                    name: "flt_cnst".into(),
                    ty: IrType::F64,
                }),
                TypeId::DOUBLE,
            ),
            Literal::Str(text) => {
                let content = self.builder.emit(Instr::Const {
                    value: ConstValue::Blob(pack_string(text)),
                    name: "strval".into(),
                    ty: IrType::Blob,
                });
                let addr = self.builder.emit(Instr::Addr {
                    of: content,
                    name: "addroftxt".into(),
                });
                (addr, TypeId::STR)
            }
        };
        Ok(Lowered {
            value,
            typ,
            lvalue: false,
        })
    }

    fn gen_type_cast(
        &mut self,
        to: TypeId,
        a: &Expr,
        loc: SourceLoc,
    ) -> Result<Lowered, CompileError> {
        // Casting loses the l-value property.
        let inner = self.make_rvalue(a)?;

        let from_ptr = self.program.types.is_pointer(inner.typ);
        let to_ptr = self.program.types.is_pointer(to);

        let value = if from_ptr && to_ptr {
            inner.value
        } else if inner.typ == TypeId::INT && to_ptr {
            self.builder.emit(Instr::IntToPtr {
                value: inner.value,
                name: "int2ptr".into(),
            })
        } else if from_ptr && to == TypeId::INT {
            self.builder.emit(Instr::PtrToInt {
                value: inner.value,
                name: "ptr2int".into(),
            })
        } else if inner.typ == TypeId::BYTE && to == TypeId::INT {
            self.builder.emit(Instr::ByteToInt {
                value: inner.value,
                name: "byte2int".into(),
            })
        } else if inner.typ == TypeId::INT && to == TypeId::BYTE {
            self.builder.emit(Instr::IntToByte {
                value: inner.value,
                name: "bytecast".into(),
            })
        } else {
            return Err(CompileError::type_error(
                format!(
                    "Cannot cast {} to {}",
                    self.type_name(inner.typ),
                    self.type_name(to)
                ),
                loc,
            ));
        };
        Ok(Lowered {
            value,
            typ: to,
            lvalue: false,
        })
    }

    fn gen_sizeof(&mut self, query: TypeId, _loc: SourceLoc) -> Result<Lowered, CompileError> {
        self.layout().check_type(query)?;
        let size = self.layout().size_of(query)?;
        let value = self.builder.emit(Instr::Const {
            value: ConstValue::Int(size as i64),
            name: "sizeof".into(),
            ty: IrType::I32,
        });
        Ok(Lowered {
            value,
            typ: TypeId::INT,
            lvalue: false,
        })
    }

    fn gen_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        loc: SourceLoc,
    ) -> Result<Lowered, CompileError> {
        let fsym = self.resolve_callee(callee)?;
        let decl = match self.program.symbol(fsym) {
            Symbol::Func(d) => d,
            other => {
                return Err(CompileError::type_error(
                    format!("cannot call {}", other.name()),
                    loc,
                ))
            }
        };
        let sig = match self.program.types.get(decl.signature) {
            Some(Type::Function(sig)) => sig.clone(),
            _ => panic!("function '{}' has no signature type", decl.name),
        };
        let mangled = self.mangled_name(decl);

        if args.len() != sig.params.len() {
            return Err(CompileError::Arity {
                callee: mangled,
                expected: sig.params.len(),
                given: args.len(),
                loc: Some(loc),
            });
        }

        let mut ir_args = Vec::with_capacity(args.len());
        for (arg, &ptyp) in args.iter().zip(&sig.params) {
            let av = self.make_rvalue(arg)?;
            let coerced = self.do_coerce(av.value, av.typ, ptyp, arg.loc())?;
            ir_args.push(coerced);
        }

        if !self.program.types.is_simple(sig.return_type) {
            return Err(CompileError::type_error(
                format!(
                    "cannot return complex type {}",
                    self.type_name(sig.return_type)
                ),
                loc,
            ));
        }
        let ret_ir = self.get_ir_type(sig.return_type, loc)?;

        let value = self.builder.emit(Instr::Call {
            callee: mangled.clone(),
            args: ir_args.into(),
            name: format!("{mangled}_rv"),
            ty: ret_ir,
        });
        Ok(Lowered {
            value,
            typ: sig.return_type,
            lvalue: false,
        })
    }

    fn resolve_callee(&mut self, callee: &Expr) -> Result<SymbolId, CompileError> {
        match callee {
            Expr::Identifier { name, loc } => {
                let module = self.current_module.expect("no module context");
                self.program
                    .resolve(module, self.current_func, name)
                    .ok_or_else(|| {
                        CompileError::type_error(format!("undefined name '{name}'"), *loc)
                    })
            }
            Expr::Member { base, field, loc } => match self.gen_expr(base)? {
                ExprOutcome::ModuleRef(mid) => {
                    self.program.resolve(mid, None, field).ok_or_else(|| {
                        CompileError::type_error(
                            format!(
                                "module '{}' has no member '{}'",
                                self.program.module(mid).name,
                                field
                            ),
                            *loc,
                        )
                    })
                }
                ExprOutcome::Value(_) => Err(CompileError::type_error(
                    "callee is not a function",
                    *loc,
                )),
            },
            other => Err(CompileError::type_error(
                "callee is not a function",
                other.loc(),
            )),
        }
    }

    // -- typing helpers ---------------------------------------------------

    /// The linker-visible name of a function: `"<package>_<function>"`.
    fn mangled_name(&self, decl: &FunctionDecl) -> String {
        format!("{}_{}", self.program.module(decl.module).name, decl.name)
    }

    /// Inserts the conversion turning a value of type `from` into type
    /// `to`, or fails with the canonical coercion error.
    fn do_coerce(
        &mut self,
        value: InstrId,
        from: TypeId,
        to: TypeId,
        loc: SourceLoc,
    ) -> Result<InstrId, CompileError> {
        if from == to {
            return Ok(value);
        }
        if from == TypeId::INT && self.program.types.is_pointer(to) {
            return Ok(self.builder.emit(Instr::IntToPtr {
                value,
                name: "coerce".into(),
            }));
        }
        if from == TypeId::INT && to == TypeId::BYTE {
            return Ok(self.builder.emit(Instr::IntToByte {
                value,
                name: "coerce".into(),
            }));
        }
        if from == TypeId::BYTE && to == TypeId::INT {
            return Ok(self.builder.emit(Instr::ByteToInt {
                value,
                name: "coerce".into(),
            }));
        }
        Err(CompileError::type_error(
            format!(
                "Cannot use '{}' as '{}'",
                self.type_name(from),
                self.type_name(to)
            ),
            loc,
        ))
    }

    /// The best common type for a binary operation's operands.
    fn common_type(&self, a: TypeId, b: TypeId, loc: SourceLoc) -> Result<TypeId, CompileError> {
        if a == b {
            return Ok(a);
        }
        if (a == TypeId::INT && b == TypeId::BYTE) || (a == TypeId::BYTE && b == TypeId::INT) {
            return Ok(TypeId::INT);
        }
        Err(CompileError::type_error(
            format!(
                "Types unequal {} != {}",
                self.type_name(a),
                self.type_name(b)
            ),
            loc,
        ))
    }

    /// The IR type used to load or carry a value of the given semantic
    /// type.
    fn get_ir_type(&self, typ: TypeId, loc: SourceLoc) -> Result<IrType, CompileError> {
        match self.program.types.get(typ) {
            Some(Type::Basic(smelt_ast::BasicTy::Int)) => Ok(IrType::I32),
            Some(Type::Basic(smelt_ast::BasicTy::Double)) => Ok(IrType::F64),
            Some(Type::Basic(smelt_ast::BasicTy::Char)) => Ok(IrType::I8),
            Some(Type::Bool) => Ok(IrType::I32),
            Some(Type::Str) => Ok(IrType::Ptr),
            Some(Type::Pointer { .. }) => Ok(IrType::Ptr),
            Some(Type::Enum(_)) => Ok(IrType::I32),
            _ => Err(CompileError::type_error(
                format!(
                    "Cannot determine the load type for \"{}\"",
                    self.type_name(typ)
                ),
                loc,
            )),
        }
    }

    fn type_name(&self, typ: TypeId) -> String {
        match self.program.types.get(typ) {
            Some(Type::Basic(b)) => b.to_string(),
            Some(Type::Bool) => "bool".into(),
            Some(Type::Void) => "void".into(),
            Some(Type::Str) => "string".into(),
            Some(Type::Pointer { pointee }) => format!("{}*", self.type_name(*pointee)),
            Some(Type::Array { element, .. }) => format!("{}[]", self.type_name(*element)),
            Some(Type::Record(rec)) => rec
                .name
                .clone()
                .unwrap_or_else(|| "struct".into()),
            Some(Type::Enum(e)) => e.name.clone().unwrap_or_else(|| "enum".into()),
            Some(Type::Function(_)) => "function".into(),
            None => format!("{typ}"),
        }
    }
}

fn ir_binop(op: ArithOp) -> IrBinOp {
    match op {
        ArithOp::Add => IrBinOp::Add,
        ArithOp::Sub => IrBinOp::Sub,
        ArithOp::Mul => IrBinOp::Mul,
        ArithOp::Div => IrBinOp::Div,
        ArithOp::Shl => IrBinOp::Shl,
        ArithOp::Shr => IrBinOp::Shr,
        ArithOp::BitOr => IrBinOp::Or,
        ArithOp::BitAnd => IrBinOp::And,
    }
}

fn cond_op(op: CmpOp) -> CondOp {
    match op {
        CmpOp::Eq => CondOp::Eq,
        CmpOp::Ne => CondOp::Ne,
        CmpOp::Lt => CondOp::Lt,
        CmpOp::Le => CondOp::Le,
        CmpOp::Gt => CondOp::Gt,
        CmpOp::Ge => CondOp::Ge,
    }
}
