//! Instruction selector: consumes a function's DAG block by block and
//! puts instructions into a frame. Selection and scheduling happen
//! together, in block order, with the literal pool drained between
//! blocks.

use tracing::debug;

use smelt_ir::{BlockId, Function};

use crate::burs::BursSystem;
use crate::dag::{block_label, DagSplitter};
use crate::error::SelectError;
use crate::frame::{Frame, InstructionContext, MachInst};
use crate::selector::TreeSelector;
use crate::tree::Terminal;

/// Selector over one target's rule table. Built once per target; the
/// table is read-only afterwards.
pub struct InstructionSelector {
    sys: BursSystem,
}

impl InstructionSelector {
    /// Wraps a checked rule table.
    pub fn new(sys: BursSystem) -> Result<Self, SelectError> {
        sys.check()?;
        Ok(InstructionSelector { sys })
    }

    pub fn sys(&self) -> &BursSystem {
        &self.sys
    }

    /// Selects the instructions of `func` into `frame`.
    pub fn select(&self, func: &Function, frame: &mut Frame) -> Result<(), SelectError> {
        debug!("selecting instructions for {}", func.name);
        let tree_selector = TreeSelector::new(&self.sys);
        let mut splitter = DagSplitter::new(func);

        // Code blocks first, the epilogue last.
        let mut order: Vec<BlockId> = func
            .blocks_iter()
            .map(|(bid, _)| bid)
            .filter(|&bid| bid != func.epilogue)
            .collect();
        order.push(func.epilogue);

        for bid in order {
            frame.emit(MachInst::Label(block_label(&func.name, bid)));
            let forest = splitter.split_block(bid, frame)?;
            for &root in &forest.roots {
                // Entry and exit markers are handled by the prologue and
                // epilogue sequences.
                if matches!(
                    forest.arena.node(root).term,
                    Terminal::Exit | Terminal::Entry
                ) {
                    continue;
                }
                let mut ctx = InstructionContext::new(frame);
                tree_selector.gen(&mut ctx, &forest.arena, root)?;
            }
            // Emit code between blocks:
            frame.between_blocks();
        }

        // Wrap the selected body in the frame's entry and exit
        // sequences, now that the stack layout is final.
        let body = std::mem::take(&mut frame.instrs);
        frame.instrs = frame.prologue();
        frame.instrs.extend(body);
        let exit = frame.epilogue();
        frame.instrs.extend(exit);
        Ok(())
    }
}
