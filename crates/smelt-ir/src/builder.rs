//! Emission cursor over an IR module.
//!
//! The builder tracks a current function, current block and current
//! source location. Lowering points the cursor somewhere and emits;
//! every emitted instruction inherits the cursor's location. Misusing the
//! cursor (emitting with no block selected) is a bug in the caller, not a
//! recoverable condition, and panics.

use smelt_ast::SourceLoc;

use crate::instr::{BlockId, Instr, InstrId, Parameter};
use crate::module::{FuncId, Function, Module};

/// Builder for one IR module at a time.
#[derive(Debug, Default)]
pub struct Builder {
    module: Option<Module>,
    func: Option<FuncId>,
    block: Option<BlockId>,
    loc: Option<SourceLoc>,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    /// Resets per-module state before lowering a new module.
    pub fn prepare(&mut self) {
        self.func = None;
        self.block = None;
        self.loc = None;
    }

    /// Installs the module the cursor emits into.
    pub fn set_module(&mut self, module: Module) {
        self.module = Some(module);
    }

    /// Removes and returns the finished module.
    pub fn take_module(&mut self) -> Module {
        self.module.take().expect("no module installed")
    }

    pub fn module(&self) -> &Module {
        self.module.as_ref().expect("no module installed")
    }

    fn module_mut(&mut self) -> &mut Module {
        self.module.as_mut().expect("no module installed")
    }

    /// Creates a function (with its empty epilogue block) in the current
    /// module.
    pub fn new_function(&mut self, name: &str) -> FuncId {
        self.module_mut().add_function(Function::new(name))
    }

    /// Selects the function to emit into, or clears the selection.
    pub fn set_function(&mut self, func: Option<FuncId>) {
        self.func = func;
        self.block = None;
    }

    pub fn current_function(&self) -> Option<FuncId> {
        self.func
    }

    pub fn func(&self) -> &Function {
        let id = self.func.expect("no current function");
        self.module().function(id)
    }

    fn func_mut(&mut self) -> &mut Function {
        let id = self.func.expect("no current function");
        self.module_mut().function_mut(id)
    }

    /// Allocates a block in the current function. The block is unattached
    /// to control flow until something jumps to it.
    pub fn new_block(&mut self) -> BlockId {
        self.func_mut().new_block()
    }

    /// Points the cursor at a block.
    pub fn set_block(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.block
    }

    /// Sets the source location stamped onto subsequent instructions.
    pub fn set_loc(&mut self, loc: SourceLoc) {
        self.loc = Some(loc);
    }

    /// Appends an instruction to the current block and returns its id so
    /// it can be used as an operand.
    pub fn emit(&mut self, instr: Instr) -> InstrId {
        let block = self.block.expect("no current block");
        let loc = self.loc;
        self.func_mut().push_instr(block, instr, loc)
    }

    /// Declares a parameter on the current function.
    pub fn add_parameter(&mut self, param: Parameter) {
        self.func_mut().params.push(param);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::{ConstValue, IrType};

    #[test]
    fn emit_into_current_block() {
        let mut b = Builder::new();
        b.set_module(Module::new("m"));
        let f = b.new_function("f");
        b.set_function(Some(f));
        let entry = b.new_block();
        b.set_block(entry);

        b.set_loc(SourceLoc::new(2, 1));
        let c = b.emit(Instr::Const {
            value: ConstValue::Int(42),
            name: "cnst".into(),
            ty: IrType::I32,
        });
        let j = b.emit(Instr::Jump {
            target: b.func().epilogue,
        });

        let func = b.func();
        assert_eq!(func.block(entry).instrs, vec![c, j]);
        assert_eq!(func.loc_of(c), Some(SourceLoc::new(2, 1)));
    }

    #[test]
    fn new_function_comes_with_epilogue() {
        let mut b = Builder::new();
        b.set_module(Module::new("m"));
        let f = b.new_function("f");
        b.set_function(Some(f));
        assert!(b.func().block(b.func().epilogue).instrs.is_empty());
    }

    #[test]
    fn prepare_clears_cursors() {
        let mut b = Builder::new();
        b.set_module(Module::new("m"));
        let f = b.new_function("f");
        b.set_function(Some(f));
        let blk = b.new_block();
        b.set_block(blk);
        b.set_loc(SourceLoc::new(1, 1));

        b.prepare();
        assert!(b.current_function().is_none());
        assert!(b.current_block().is_none());
    }

    #[test]
    #[should_panic(expected = "no current block")]
    fn emit_without_block_panics() {
        let mut b = Builder::new();
        b.set_module(Module::new("m"));
        let f = b.new_function("f");
        b.set_function(Some(f));
        b.emit(Instr::Jump { target: BlockId(0) });
    }
}
