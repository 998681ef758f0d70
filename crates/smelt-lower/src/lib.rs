pub mod codegen;

// Re-export commonly used types
pub use codegen::{pack_string, CodeGenerator, ExprOutcome, Lowered};
