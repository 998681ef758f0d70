//! IR instructions, blocks and primitive types.
//!
//! The IR is a typed, block-structured three-address form. Instructions
//! live in a per-function arena; operands and block targets are index
//! newtypes ([`InstrId`], [`BlockId`]), never owning references, so the
//! function is the single ownership root.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Instruction identity within a function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrId(pub u32);

/// Block identity within a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// IR primitive types.
///
/// `Blob` is the type of raw-byte data constants (string images); a blob
/// value is only legal as a `Const` feeding an `Addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrType {
    I8,
    I32,
    F64,
    Ptr,
    Blob,
}

impl IrType {
    /// The value's width in bits, as used by instruction selection.
    /// Pointers take the pointer width of the 32-bit reference targets.
    pub fn bits(self) -> u32 {
        match self {
            IrType::I8 => 8,
            IrType::I32 => 32,
            IrType::F64 => 64,
            IrType::Ptr => 32,
            IrType::Blob => 0,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IrType::I8 => "i8",
            IrType::I32 => "i32",
            IrType::F64 => "f64",
            IrType::Ptr => "ptr",
            IrType::Blob => "blob",
        };
        f.write_str(name)
    }
}

/// Constant payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Blob(Vec<u8>),
}

/// Binary operators. Both operands and the result share one [`IrType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Or,
    And,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Or => "|",
            BinOp::And => "&",
        };
        f.write_str(s)
    }
}

/// Comparison operators used by `CJump`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CondOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CondOp::Eq => "==",
            CondOp::Ne => "!=",
            CondOp::Lt => "<",
            CondOp::Le => "<=",
            CondOp::Gt => ">",
            CondOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: IrType,
}

/// IR instructions.
///
/// Value-producing variants carry a `name` (for the writer) and enough
/// information to answer [`Instr::result_type`]. Operands are [`InstrId`]s
/// into the owning function's arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// Stack slot of `size` bytes; yields a pointer.
    Alloc { name: String, size: u32 },
    /// Integer, float or raw-byte literal.
    Const {
        value: ConstValue,
        name: String,
        ty: IrType,
    },
    /// Address of a previously emitted constant (string literals).
    Addr { of: InstrId, name: String },
    /// The address of a module-level variable.
    GlobalRef { name: String },
    /// The value of the n-th declared parameter.
    Param {
        index: u32,
        name: String,
        ty: IrType,
    },
    /// Typed load through `addr`.
    Load {
        addr: InstrId,
        name: String,
        ty: IrType,
    },
    /// Typed store. A volatile store must not be elided.
    Store {
        value: InstrId,
        addr: InstrId,
        volatile: bool,
    },
    Binop {
        a: InstrId,
        op: BinOp,
        b: InstrId,
        name: String,
        ty: IrType,
    },
    /// Reinterpret an integer as a pointer.
    IntToPtr { value: InstrId, name: String },
    /// Reinterpret a pointer as an integer.
    PtrToInt { value: InstrId, name: String },
    /// Truncate i32 to i8.
    IntToByte { value: InstrId, name: String },
    /// Widen i8 to i32.
    ByteToInt { value: InstrId, name: String },
    Jump { target: BlockId },
    CJump {
        a: InstrId,
        cond: CondOp,
        b: InstrId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Call {
        callee: String,
        args: SmallVec<[InstrId; 4]>,
        name: String,
        ty: IrType,
    },
    Return { value: InstrId },
}

impl Instr {
    /// The IR type of the value this instruction produces, or `None` for
    /// pure control flow and stores.
    pub fn result_type(&self) -> Option<IrType> {
        match self {
            Instr::Alloc { .. } => Some(IrType::Ptr),
            Instr::Const { ty, .. } => Some(*ty),
            Instr::Addr { .. } => Some(IrType::Ptr),
            Instr::GlobalRef { .. } => Some(IrType::Ptr),
            Instr::Param { ty, .. } => Some(*ty),
            Instr::Load { ty, .. } => Some(*ty),
            Instr::Binop { ty, .. } => Some(*ty),
            Instr::IntToPtr { .. } => Some(IrType::Ptr),
            Instr::PtrToInt { .. } => Some(IrType::I32),
            Instr::IntToByte { .. } => Some(IrType::I8),
            Instr::ByteToInt { .. } => Some(IrType::I32),
            Instr::Call { ty, .. } => Some(*ty),
            Instr::Store { .. }
            | Instr::Jump { .. }
            | Instr::CJump { .. }
            | Instr::Return { .. } => None,
        }
    }

    /// Returns `true` if this instruction ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Jump { .. } | Instr::CJump { .. } | Instr::Return { .. }
        )
    }

    /// Returns `true` for instructions with memory or control effects
    /// (stores and calls); instruction selection must not reorder values
    /// across them.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, Instr::Store { .. } | Instr::Call { .. })
    }

    /// The operands this instruction reads, in order.
    pub fn operands(&self) -> SmallVec<[InstrId; 4]> {
        match self {
            Instr::Addr { of, .. } => SmallVec::from_slice(&[*of]),
            Instr::Load { addr, .. } => SmallVec::from_slice(&[*addr]),
            Instr::Store { value, addr, .. } => SmallVec::from_slice(&[*value, *addr]),
            Instr::Binop { a, b, .. } => SmallVec::from_slice(&[*a, *b]),
            Instr::IntToPtr { value, .. }
            | Instr::PtrToInt { value, .. }
            | Instr::IntToByte { value, .. }
            | Instr::ByteToInt { value, .. } => SmallVec::from_slice(&[*value]),
            Instr::CJump { a, b, .. } => SmallVec::from_slice(&[*a, *b]),
            Instr::Call { args, .. } => args.clone(),
            Instr::Return { value } => SmallVec::from_slice(&[*value]),
            Instr::Alloc { .. }
            | Instr::Const { .. }
            | Instr::GlobalRef { .. }
            | Instr::Param { .. }
            | Instr::Jump { .. } => SmallVec::new(),
        }
    }
}

/// An ordered instruction sequence ending in exactly one terminator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub instrs: Vec<InstrId>,
}
