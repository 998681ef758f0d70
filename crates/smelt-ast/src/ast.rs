//! The typed AST consumed by the back-end.
//!
//! Statements and expressions form the closed sets the lowering pass
//! dispatches over. Every node carries a [`SourceLoc`] so diagnostics and
//! emitted IR can point back into the source. The AST itself is immutable
//! during lowering; derived facts (type, l-value-ness) travel in records
//! returned by the lowering functions rather than being written back onto
//! nodes.

use serde::{Deserialize, Serialize};

use crate::loc::SourceLoc;
use crate::types::TypeId;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Binary arithmetic and bitwise operators accepted by expression lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    BitOr,
    BitAnd,
}

/// Comparison operators, used only in conditional position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit logical operators, used only in conditional position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

/// Any binary operator appearing in a [`Expr::Binop`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Arith(ArithOp),
    Cmp(CmpOp),
    Logic(LogicOp),
}

/// Unary operators. `AddressOf` is the only one expression lowering
/// accepts; `Neg` exists for the compile-time evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    AddressOf,
    Neg,
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// Literal values. Character literals are represented as `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(String),
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// Expression nodes. This set is closed; lowering dispatches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Binop {
        a: Box<Expr>,
        op: BinOp,
        b: Box<Expr>,
        loc: SourceLoc,
    },
    Unop {
        op: UnOp,
        a: Box<Expr>,
        loc: SourceLoc,
    },
    Identifier {
        name: String,
        loc: SourceLoc,
    },
    Deref {
        ptr: Box<Expr>,
        loc: SourceLoc,
    },
    Member {
        base: Box<Expr>,
        field: String,
        loc: SourceLoc,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        loc: SourceLoc,
    },
    Literal {
        value: Literal,
        loc: SourceLoc,
    },
    TypeCast {
        to: TypeId,
        a: Box<Expr>,
        loc: SourceLoc,
    },
    Sizeof {
        query: TypeId,
        loc: SourceLoc,
    },
    FunctionCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
        loc: SourceLoc,
    },
}

impl Expr {
    /// The source location of this expression.
    pub fn loc(&self) -> SourceLoc {
        match self {
            Expr::Binop { loc, .. }
            | Expr::Unop { loc, .. }
            | Expr::Identifier { loc, .. }
            | Expr::Deref { loc, .. }
            | Expr::Member { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::Literal { loc, .. }
            | Expr::TypeCast { loc, .. }
            | Expr::Sizeof { loc, .. }
            | Expr::FunctionCall { loc, .. } => *loc,
        }
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

/// Statement nodes. This set is closed; lowering dispatches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Compound {
        statements: Vec<Stmt>,
        loc: SourceLoc,
    },
    Empty {
        loc: SourceLoc,
    },
    /// `lval = rval`, or `lval op= rval` when `shorthand` is set.
    Assignment {
        lval: Expr,
        rval: Expr,
        shorthand: Option<ArithOp>,
        loc: SourceLoc,
    },
    ExpressionStatement {
        expr: Expr,
        loc: SourceLoc,
    },
    If {
        condition: Expr,
        then_stmt: Box<Stmt>,
        else_stmt: Box<Stmt>,
        loc: SourceLoc,
    },
    Return {
        expr: Expr,
        loc: SourceLoc,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
        loc: SourceLoc,
    },
    For {
        init: Box<Stmt>,
        condition: Expr,
        step: Box<Stmt>,
        body: Box<Stmt>,
        loc: SourceLoc,
    },
}

impl Stmt {
    /// The source location of this statement.
    pub fn loc(&self) -> SourceLoc {
        match self {
            Stmt::Compound { loc, .. }
            | Stmt::Empty { loc }
            | Stmt::Assignment { loc, .. }
            | Stmt::ExpressionStatement { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::For { loc, .. } => *loc,
        }
    }
}

// ---------------------------------------------------------------------------
// Global initializers
// ---------------------------------------------------------------------------

/// Initial value of a global variable, mirroring the shape of its type.
///
/// Array initializers may contain `None` entries (implicit zero); trailing
/// elements may be omitted entirely. Struct initializers name the fields
/// they set; absent fields are zero-filled. Union initializers set exactly
/// one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    Expr(Expr),
    Array(Vec<Option<Initializer>>),
    Struct(Vec<(String, Initializer)>),
    Union { field: String, value: Box<Initializer> },
}
