//! IR modules and functions.
//!
//! A [`Module`] owns its global variables and functions; a [`Function`]
//! owns its instruction arena and blocks. Source locations are carried in
//! a parallel vector so the instruction enum stays payload-only.

use serde::{Deserialize, Serialize};
use smelt_ast::SourceLoc;

use crate::instr::{Block, BlockId, Instr, InstrId, Parameter};

/// Function identity within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// A module-level variable: a name and its storage size in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub name: String,
    pub size: u32,
}

/// An IR function: parameter declarations, the instruction arena, blocks
/// in creation order, and the distinguished epilogue block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub blocks: Vec<Block>,
    pub epilogue: BlockId,
    instrs: Vec<Instr>,
    locs: Vec<Option<SourceLoc>>,
}

impl Function {
    /// Creates a function with an empty epilogue block and nothing else.
    pub fn new(name: &str) -> Self {
        Function {
            name: name.to_string(),
            params: Vec::new(),
            blocks: vec![Block::default()],
            epilogue: BlockId(0),
            instrs: Vec::new(),
            locs: Vec::new(),
        }
    }

    /// Allocates a new, empty block.
    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::default());
        id
    }

    /// Appends an instruction to the given block and returns its id.
    pub fn push_instr(&mut self, block: BlockId, instr: Instr, loc: Option<SourceLoc>) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(instr);
        self.locs.push(loc);
        self.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    pub fn loc_of(&self, id: InstrId) -> Option<SourceLoc> {
        self.locs[id.0 as usize]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn instr_count(&self) -> usize {
        self.instrs.len()
    }

    /// Blocks in creation order paired with their ids.
    pub fn blocks_iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }
}

/// A compiled module: globals and functions, immutable once lowering
/// returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub variables: Vec<GlobalVar>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            variables: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_variable(&mut self, var: GlobalVar) {
        self.variables.push(var);
    }

    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(func);
        id
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }
}
