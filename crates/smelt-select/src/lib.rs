pub mod burs;
pub mod dag;
pub mod demo;
pub mod error;
pub mod frame;
pub mod select;
pub mod selector;
pub mod state;
pub mod tree;

// Re-export commonly used types
pub use burs::{BursSystem, NtId, Pattern, Rule, RuleId};
pub use dag::{block_label, BlockForest, DagSplitter};
pub use error::SelectError;
pub use frame::{Frame, InstructionContext, LitValue, MachInst, RegClass, VReg};
pub use select::InstructionSelector;
pub use selector::TreeSelector;
pub use state::State;
pub use tree::{Bits, TermOp, Terminal, TreeArena, TreeNode, TreeRef, TreeValue};
