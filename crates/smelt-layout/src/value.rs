//! Values produced by compile-time evaluation.

use serde::{Deserialize, Serialize};
use smelt_ast::CompileError;

/// Result of evaluating a constant expression. A `Ptr` is a symbolic
/// reference to a global or function, resolved at link time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstVal {
    Int(i64),
    Float(f64),
    Ptr(String),
}

impl ConstVal {
    /// The integer value, or a layout error for floats and symbols.
    pub fn as_int(&self) -> Result<i64, CompileError> {
        match self {
            ConstVal::Int(v) => Ok(*v),
            other => Err(CompileError::layout(
                format!("expected integer constant, got {other:?}"),
                None,
            )),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, ConstVal::Int(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_int_on_int() {
        assert_eq!(ConstVal::Int(9).as_int().unwrap(), 9);
    }

    #[test]
    fn as_int_on_float_errors() {
        assert!(ConstVal::Float(1.0).as_int().is_err());
        assert!(ConstVal::Ptr("g".into()).as_int().is_err());
    }
}
