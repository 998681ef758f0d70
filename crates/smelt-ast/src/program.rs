//! Program, modules, symbols and scopes.
//!
//! A [`Program`] is the unit handed to the back-end: a set of modules
//! sharing one [`TypeTable`] and one symbol arena. Scopes are flat
//! name-to-symbol maps; functions carry their inner scope as an ordered
//! symbol list (parameters first). Cross-module access works by putting a
//! [`Symbol::Module`] entry into the importing module's scope, which
//! member lowering then resolves through.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::{Expr, Stmt};
use crate::loc::SourceLoc;
use crate::types::{EnumDef, FunctionSig, RecordDef, Type, TypeId, TypeTable};

/// Symbol identity within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// Module identity within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variable declaration, module-level or function-local.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub typ: TypeId,
    pub is_parameter: bool,
    pub loc: SourceLoc,
}

/// A named compile-time constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub typ: TypeId,
    pub value: Expr,
}

/// A function declaration. `body` is `None` for externals; only functions
/// with a body are lowered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    /// A `Type::Function` entry in the type table.
    pub signature: TypeId,
    pub module: ModuleId,
    pub body: Option<Stmt>,
    /// Inner scope in declaration order, parameters first.
    pub locals: Vec<SymbolId>,
}

/// An enum constant brought into scope; its value comes from the layout
/// service's per-enum cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumConstRef {
    pub name: String,
    pub owner: TypeId,
}

/// Anything a name can resolve to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Symbol {
    Var(Variable),
    Const(Constant),
    Func(FunctionDecl),
    EnumConst(EnumConstRef),
    /// An imported module; only member lowering may consume this.
    Module(ModuleId),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Var(v) => &v.name,
            Symbol::Const(c) => &c.name,
            Symbol::Func(f) => &f.name,
            Symbol::EnumConst(e) => &e.name,
            Symbol::Module(_) => "<module>",
        }
    }
}

/// A single module: declared types, globals, functions, and a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    /// Types declared in this module, validated before lowering.
    pub types: Vec<TypeId>,
    /// Module-level variables.
    pub variables: Vec<SymbolId>,
    pub functions: Vec<SymbolId>,
    pub scope: IndexMap<String, SymbolId>,
}

/// The full compilation unit: modules, symbols, types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    modules: Vec<Module>,
    symbols: Vec<Symbol>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            types: TypeTable::new(),
            modules: Vec::new(),
            symbols: Vec::new(),
        }
    }

    // -- modules ----------------------------------------------------------

    pub fn add_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(Module {
            id,
            name: name.to_string(),
            types: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            scope: IndexMap::new(),
        });
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0 as usize]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    // -- symbols ----------------------------------------------------------

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    fn push_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(sym);
        id
    }

    /// Declares a module-level variable and enters it into scope.
    pub fn add_global(&mut self, module: ModuleId, name: &str, typ: TypeId) -> SymbolId {
        let id = self.push_symbol(Symbol::Var(Variable {
            name: name.to_string(),
            typ,
            is_parameter: false,
            loc: SourceLoc::new(0, 0),
        }));
        let m = &mut self.modules[module.0 as usize];
        m.variables.push(id);
        m.scope.insert(name.to_string(), id);
        id
    }

    /// Declares a named compile-time constant in the module scope.
    pub fn add_constant(&mut self, module: ModuleId, name: &str, typ: TypeId, value: Expr) -> SymbolId {
        let id = self.push_symbol(Symbol::Const(Constant {
            name: name.to_string(),
            typ,
            value,
        }));
        let m = &mut self.modules[module.0 as usize];
        m.scope.insert(name.to_string(), id);
        id
    }

    /// Declares a function. The signature type is registered on the fly;
    /// parameter symbols land in the function's inner scope.
    pub fn add_function(
        &mut self,
        module: ModuleId,
        name: &str,
        params: &[(&str, TypeId)],
        return_type: TypeId,
    ) -> SymbolId {
        let signature = self.types.register(Type::Function(FunctionSig {
            params: params.iter().map(|(_, t)| *t).collect(),
            return_type,
        }));

        let mut locals = Vec::new();
        for (pname, ptyp) in params {
            let pid = self.push_symbol(Symbol::Var(Variable {
                name: pname.to_string(),
                typ: *ptyp,
                is_parameter: true,
                loc: SourceLoc::new(0, 0),
            }));
            locals.push(pid);
        }

        let id = self.push_symbol(Symbol::Func(FunctionDecl {
            name: name.to_string(),
            signature,
            module,
            body: None,
            locals,
        }));
        let m = &mut self.modules[module.0 as usize];
        m.functions.push(id);
        m.scope.insert(name.to_string(), id);
        id
    }

    /// Adds a local variable to a function's inner scope.
    pub fn add_local(&mut self, func: SymbolId, name: &str, typ: TypeId) -> SymbolId {
        let id = self.push_symbol(Symbol::Var(Variable {
            name: name.to_string(),
            typ,
            is_parameter: false,
            loc: SourceLoc::new(0, 0),
        }));
        match &mut self.symbols[func.0 as usize] {
            Symbol::Func(f) => f.locals.push(id),
            other => panic!("add_local on non-function symbol {}", other.name()),
        }
        id
    }

    /// Attaches a body to a declared function.
    pub fn set_body(&mut self, func: SymbolId, body: Stmt) {
        match &mut self.symbols[func.0 as usize] {
            Symbol::Func(f) => f.body = Some(body),
            other => panic!("set_body on non-function symbol {}", other.name()),
        }
    }

    /// Makes `target` visible in `module`'s scope under `name`.
    pub fn add_import(&mut self, module: ModuleId, name: &str, target: ModuleId) -> SymbolId {
        let id = self.push_symbol(Symbol::Module(target));
        self.modules[module.0 as usize]
            .scope
            .insert(name.to_string(), id);
        id
    }

    /// Registers a declared enum type with the module and enters its
    /// constants into the module scope.
    pub fn declare_enum(&mut self, module: ModuleId, name: &str, def: EnumDef) -> TypeId {
        let constants: Vec<String> = def.constants.keys().cloned().collect();
        let tid = self.types.register_named(name, Type::Enum(def));
        self.modules[module.0 as usize].types.push(tid);
        for cname in constants {
            let sid = self.push_symbol(Symbol::EnumConst(EnumConstRef {
                name: cname.clone(),
                owner: tid,
            }));
            self.modules[module.0 as usize].scope.insert(cname, sid);
        }
        tid
    }

    /// Registers a declared record (struct/union) type with the module.
    pub fn declare_record(&mut self, module: ModuleId, name: &str, def: RecordDef) -> TypeId {
        let tid = self.types.register_named(name, Type::Record(def));
        self.modules[module.0 as usize].types.push(tid);
        tid
    }

    // -- resolution -------------------------------------------------------

    /// Resolves a name: first through a function's inner scope (if given),
    /// then through the module scope.
    pub fn resolve(&self, module: ModuleId, func: Option<SymbolId>, name: &str) -> Option<SymbolId> {
        if let Some(fid) = func {
            if let Symbol::Func(f) = self.symbol(fid) {
                for &local in &f.locals {
                    if self.symbol(local).name() == name {
                        return Some(local);
                    }
                }
            }
        }
        self.module(module).scope.get(name).copied()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
