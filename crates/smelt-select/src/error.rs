//! Selection errors. An uncovered tree is fatal to the function.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectError {
    /// No rule chain reduces the tree to the root goal.
    #[error("no covering rule for tree {tree}")]
    Uncovered { tree: String },

    #[error("terminal {terminal} is not declared")]
    UndeclaredTerminal { terminal: String },

    #[error("terminal {terminal} takes {expected} kids, {given} given")]
    BadArity {
        terminal: String,
        expected: usize,
        given: usize,
    },

    #[error("non-terminal '{non_term}' has no producing rule")]
    MissingProducer { non_term: String },

    #[error("unknown goal non-terminal '{name}'")]
    UnknownGoal { name: String },

    /// An operand crossed a block or side-effect boundary without having
    /// been materialized into a register first.
    #[error("value {instr} was never materialized")]
    Unmaterialized { instr: String },
}
