pub mod builder;
pub mod instr;
pub mod module;
pub mod verify;
pub mod write;

// Re-export commonly used types
pub use builder::Builder;
pub use instr::{BinOp, Block, BlockId, CondOp, ConstValue, Instr, InstrId, IrType, Parameter};
pub use module::{Function, FuncId, GlobalVar, Module};
pub use verify::{verify_function, verify_module, VerifyError};
