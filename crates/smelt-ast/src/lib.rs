pub mod ast;
pub mod diag;
pub mod loc;
pub mod program;
pub mod types;

// Re-export commonly used types
pub use ast::{ArithOp, BinOp, CmpOp, Expr, Initializer, Literal, LogicOp, Stmt, UnOp};
pub use diag::{CompileError, DiagnosticSink};
pub use loc::SourceLoc;
pub use program::{
    Constant, EnumConstRef, FunctionDecl, Module, ModuleId, Program, Symbol, SymbolId, Variable,
};
pub use types::{
    BasicTy, EnumDef, Field, FunctionSig, RecordDef, RecordKind, Type, TypeId, TypeTable,
};
