//! Compilation errors and the diagnostic sink.
//!
//! Errors are grouped by kind rather than by producing component, so the
//! lowering, layout and selection crates share one taxonomy. Statement
//! lowering reports through a [`DiagnosticSink`] and keeps going to
//! surface as many errors as possible; layout, evaluation and selection
//! errors are fatal to the current function and propagate as `Err`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loc::SourceLoc;

/// Errors produced anywhere in the back-end core.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum CompileError {
    /// Incompatible types, non-simple assignment, unequal comparand types.
    #[error("{message}")]
    Type {
        message: String,
        loc: Option<SourceLoc>,
    },

    /// Address-of, assignment or member/index with a non-l-value base.
    #[error("{message}")]
    Lvalue {
        message: String,
        loc: Option<SourceLoc>,
    },

    /// Wrong call argument count.
    #[error("{callee} requires {expected} arguments, {given} given")]
    Arity {
        callee: String,
        expected: usize,
        given: usize,
        loc: Option<SourceLoc>,
    },

    /// Incomplete struct/union/enum, unsized array, unpackable scalar.
    #[error("{message}")]
    Layout {
        message: String,
        loc: Option<SourceLoc>,
    },

    /// Unhandled statement or expression kind.
    #[error("{message}")]
    Unsupported {
        message: String,
        loc: Option<SourceLoc>,
    },

    /// No rule covers a tree; fatal to the function being selected.
    #[error("no covering rule for tree {tree}")]
    Selection { tree: String },

    /// Compile-time evaluation overflowed.
    #[error("constant evaluation overflow")]
    Overflow { loc: Option<SourceLoc> },

    /// The module accumulated statement-level errors and fails as a whole.
    #[error("module '{module}' failed with {errors} error(s)")]
    Invalid { module: String, errors: usize },
}

impl CompileError {
    /// Convenience constructors used throughout the lowering code.
    pub fn type_error(message: impl Into<String>, loc: SourceLoc) -> Self {
        CompileError::Type {
            message: message.into(),
            loc: Some(loc),
        }
    }

    pub fn lvalue(message: impl Into<String>, loc: SourceLoc) -> Self {
        CompileError::Lvalue {
            message: message.into(),
            loc: Some(loc),
        }
    }

    pub fn layout(message: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        CompileError::Layout {
            message: message.into(),
            loc,
        }
    }

    pub fn unsupported(message: impl Into<String>, loc: Option<SourceLoc>) -> Self {
        CompileError::Unsupported {
            message: message.into(),
            loc,
        }
    }

    /// The source location attached to this error, if any.
    pub fn loc(&self) -> Option<SourceLoc> {
        match self {
            CompileError::Type { loc, .. }
            | CompileError::Lvalue { loc, .. }
            | CompileError::Arity { loc, .. }
            | CompileError::Layout { loc, .. }
            | CompileError::Unsupported { loc, .. }
            | CompileError::Overflow { loc } => *loc,
            CompileError::Selection { .. } | CompileError::Invalid { .. } => None,
        }
    }
}

/// Collects statement-level errors so lowering can continue past them.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    errors: Vec<CompileError>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink { errors: Vec::new() }
    }

    /// Records an error; the module is now invalid.
    pub fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors
    }
}
