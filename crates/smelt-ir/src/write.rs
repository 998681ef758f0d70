//! Text rendering of IR modules.
//!
//! The format is stable so tests can assert on it: one line per
//! instruction, blocks in creation order, the epilogue tagged. Value
//! instructions print as `iN: name:ty = ...`.

use std::fmt;

use crate::instr::{Block, BlockId, Instr, InstrId};
use crate::module::{Function, Module};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}:", self.name)?;
        for var in &self.variables {
            writeln!(f, "  global {} ({} bytes)", var.name, var.size)?;
        }
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        writeln!(f, "  function {}({}):", self.name, params.join(", "))?;
        for (id, block) in self.blocks_iter() {
            self.fmt_block(f, id, block)?;
        }
        Ok(())
    }
}

impl Function {
    fn fmt_block(&self, f: &mut fmt::Formatter<'_>, id: BlockId, block: &Block) -> fmt::Result {
        if id == self.epilogue {
            writeln!(f, "    {} (epilogue):", id)?;
        } else {
            writeln!(f, "    {}:", id)?;
        }
        for &iid in &block.instrs {
            writeln!(f, "      {}", self.render_instr(iid))?;
        }
        Ok(())
    }

    /// Renders one instruction as a single line.
    pub fn render_instr(&self, id: InstrId) -> String {
        match self.instr(id) {
            Instr::Alloc { name, size } => {
                format!("{id}: {name}:ptr = alloc {size} bytes")
            }
            Instr::Const { value, name, ty } => {
                format!("{id}: {name}:{ty} = const {value:?}")
            }
            Instr::Addr { of, name } => {
                format!("{id}: {name}:ptr = addr {of}")
            }
            Instr::GlobalRef { name } => {
                format!("{id}: ptr = global {name}")
            }
            Instr::Param { index, name, ty } => {
                format!("{id}: {name}:{ty} = param {index}")
            }
            Instr::Load { addr, name, ty } => {
                format!("{id}: {name}:{ty} = load {addr}")
            }
            Instr::Store {
                value,
                addr,
                volatile,
            } => {
                let v = if *volatile { " [volatile]" } else { "" };
                format!("{id}: store {value} -> {addr}{v}")
            }
            Instr::Binop { a, op, b, name, ty } => {
                format!("{id}: {name}:{ty} = {a} {op} {b}")
            }
            Instr::IntToPtr { value, name } => {
                format!("{id}: {name}:ptr = int_to_ptr {value}")
            }
            Instr::PtrToInt { value, name } => {
                format!("{id}: {name}:i32 = ptr_to_int {value}")
            }
            Instr::IntToByte { value, name } => {
                format!("{id}: {name}:i8 = int_to_byte {value}")
            }
            Instr::ByteToInt { value, name } => {
                format!("{id}: {name}:i32 = byte_to_int {value}")
            }
            Instr::Jump { target } => {
                format!("{id}: jump {target}")
            }
            Instr::CJump {
                a,
                cond,
                b,
                if_true,
                if_false,
            } => {
                format!("{id}: cjump {a} {cond} {b} ? {if_true} : {if_false}")
            }
            Instr::Call {
                callee,
                args,
                name,
                ty,
            } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                format!("{id}: {name}:{ty} = call {callee}({})", args.join(", "))
            }
            Instr::Return { value } => {
                format!("{id}: return {value}")
            }
        }
    }
}
