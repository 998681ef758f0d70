//! Per-function frames: emitted target instructions, virtual registers,
//! stack slots, and the literal pool.
//!
//! Register allocation happens downstream, so everything here works on
//! virtual registers. The literal pool collects constants referenced by
//! label and drains between basic blocks, keeping the data close to its
//! load sites.

use std::collections::HashMap;
use std::fmt;

/// Register class of a virtual register. `Gpr64` models the register
/// pair that carries 64-bit values on the 32-bit demo target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gpr,
    Gpr64,
}

/// A virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg {
    pub index: u32,
    pub class: RegClass,
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.class {
            RegClass::Gpr => write!(f, "%r{}", self.index),
            RegClass::Gpr64 => write!(f, "%q{}", self.index),
        }
    }
}

/// A constant parked in the literal pool.
#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Int(i64),
    Bytes(Vec<u8>),
}

/// Target instructions as emitted by pattern templates. Virtual
/// registers throughout; the register allocator rewrites them later.
#[derive(Debug, Clone, PartialEq)]
pub enum MachInst {
    Label(String),
    LoadImm {
        dst: VReg,
        value: i64,
    },
    /// Load the address a label resolves to.
    LoadLabel {
        dst: VReg,
        label: String,
    },
    Binary {
        op: &'static str,
        dst: VReg,
        a: VReg,
        b: VReg,
    },
    Load {
        dst: VReg,
        addr: VReg,
        size: u32,
    },
    Store {
        src: VReg,
        addr: VReg,
        size: u32,
    },
    Move {
        dst: VReg,
        src: VReg,
    },
    /// Address of a stack slot at the given frame offset.
    StackAddr {
        dst: VReg,
        offset: u32,
    },
    Jump(String),
    CondJump {
        op: &'static str,
        a: VReg,
        b: VReg,
        if_true: String,
        if_false: String,
    },
    Call {
        callee: String,
        uses: Vec<VReg>,
        defs: Vec<VReg>,
    },
    AdjustSp(i32),
    Align(u32),
    Data(Vec<u8>),
    Word(i64),
}

impl fmt::Display for MachInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachInst::Label(l) => write!(f, "{l}:"),
            MachInst::LoadImm { dst, value } => write!(f, "  ldi {dst}, {value}"),
            MachInst::LoadLabel { dst, label } => write!(f, "  lda {dst}, ={label}"),
            MachInst::Binary { op, dst, a, b } => write!(f, "  {op} {dst}, {a}, {b}"),
            MachInst::Load { dst, addr, size } => write!(f, "  ldr{size} {dst}, [{addr}]"),
            MachInst::Store { src, addr, size } => write!(f, "  str{size} {src}, [{addr}]"),
            MachInst::Move { dst, src } => write!(f, "  mov {dst}, {src}"),
            MachInst::StackAddr { dst, offset } => write!(f, "  lea {dst}, [sp+{offset}]"),
            MachInst::Jump(l) => write!(f, "  jmp {l}"),
            MachInst::CondJump {
                op,
                a,
                b,
                if_true,
                if_false,
            } => write!(f, "  {op} {a}, {b} -> {if_true} / {if_false}"),
            MachInst::Call { callee, uses, defs } => {
                let uses: Vec<String> = uses.iter().map(|r| r.to_string()).collect();
                let defs: Vec<String> = defs.iter().map(|r| r.to_string()).collect();
                write!(
                    f,
                    "  call {callee} uses=[{}] defs=[{}]",
                    uses.join(", "),
                    defs.join(", ")
                )
            }
            MachInst::AdjustSp(n) => write!(f, "  add sp, {n}"),
            MachInst::Align(n) => write!(f, "  .align {n}"),
            MachInst::Data(bytes) => write!(f, "  .data {bytes:02x?}"),
            MachInst::Word(v) => write!(f, "  .word {v}"),
        }
    }
}

/// Per-function record of emitted instructions, virtual registers, stack
/// layout and the literal pool.
#[derive(Debug)]
pub struct Frame {
    pub name: String,
    pub instrs: Vec<MachInst>,
    pub stack_size: u32,
    /// Return value registers for the two classes.
    pub rv: VReg,
    pub rv64: VReg,
    reg_counter: u32,
    loc_vars: HashMap<String, u32>,
    constants: Vec<(String, LitValue)>,
    literal_number: u32,
    arg_regs: Vec<VReg>,
}

impl Frame {
    pub fn new(name: &str) -> Self {
        let mut frame = Frame {
            name: name.to_string(),
            instrs: Vec::new(),
            stack_size: 0,
            rv: VReg {
                index: 0,
                class: RegClass::Gpr,
            },
            rv64: VReg {
                index: 0,
                class: RegClass::Gpr64,
            },
            reg_counter: 0,
            loc_vars: HashMap::new(),
            constants: Vec::new(),
            literal_number: 0,
            arg_regs: Vec::new(),
        };
        frame.rv = frame.new_reg(RegClass::Gpr);
        frame.rv64 = frame.new_reg(RegClass::Gpr64);
        frame
    }

    /// Retrieves a new virtual register.
    pub fn new_reg(&mut self, class: RegClass) -> VReg {
        let index = self.reg_counter;
        self.reg_counter += 1;
        VReg { index, class }
    }

    pub fn emit(&mut self, inst: MachInst) {
        self.instrs.push(inst);
    }

    /// Generates a move from `src` to `dst`.
    pub fn move_reg(&mut self, dst: VReg, src: VReg) {
        self.emit(MachInst::Move { dst, src });
    }

    /// Stack slot for a named local; repeated calls return the same
    /// offset.
    pub fn alloc_var(&mut self, name: &str, size: u32) -> u32 {
        if let Some(&offset) = self.loc_vars.get(name) {
            return offset;
        }
        let offset = self.stack_size;
        self.stack_size += size;
        self.loc_vars.insert(name.to_string(), offset);
        offset
    }

    /// The fixed register an incoming argument arrives in.
    pub fn arg_loc(&mut self, index: u32) -> VReg {
        while self.arg_regs.len() <= index as usize {
            let reg = self.new_reg(RegClass::Gpr);
            self.arg_regs.push(reg);
        }
        self.arg_regs[index as usize]
    }

    /// Adds a constant to the literal pool, reusing the label of an
    /// equal constant already parked there.
    pub fn add_constant(&mut self, value: LitValue) -> String {
        for (label, existing) in &self.constants {
            if *existing == value {
                return label.clone();
            }
        }
        let label = format!("{}_literal_{}", self.name, self.literal_number);
        self.literal_number += 1;
        self.constants.push((label.clone(), value));
        label
    }

    /// Number of constants waiting in the pool.
    pub fn pending_constants(&self) -> usize {
        self.constants.len()
    }

    /// Drains the literal pool into the instruction stream. Targets call
    /// this between basic blocks so constants stay within reach of their
    /// load sites.
    pub fn between_blocks(&mut self) {
        if self.constants.is_empty() {
            return;
        }
        self.emit(MachInst::Align(4));
        let constants = std::mem::take(&mut self.constants);
        for (label, value) in constants {
            self.emit(MachInst::Label(label));
            match value {
                LitValue::Int(v) => self.emit(MachInst::Word(v)),
                LitValue::Bytes(bytes) => {
                    self.emit(MachInst::Data(bytes));
                    self.emit(MachInst::Align(4));
                }
            }
        }
    }

    /// Function entry sequence.
    pub fn prologue(&self) -> Vec<MachInst> {
        let mut seq = vec![MachInst::Label(self.name.clone())];
        if self.stack_size > 0 {
            seq.push(MachInst::AdjustSp(-(self.stack_size as i32)));
        }
        seq
    }

    /// Function exit sequence, including the final literal pool drain.
    pub fn epilogue(&mut self) -> Vec<MachInst> {
        let mut seq = Vec::new();
        if self.stack_size > 0 {
            seq.push(MachInst::AdjustSp(self.stack_size as i32));
        }
        let saved = std::mem::take(&mut self.instrs);
        self.between_blocks();
        seq.extend(std::mem::replace(&mut self.instrs, saved));
        seq.push(MachInst::Align(4));
        seq
    }
}

/// What pattern templates see: a thin proxy over the frame.
#[derive(Debug)]
pub struct InstructionContext<'f> {
    frame: &'f mut Frame,
}

impl<'f> InstructionContext<'f> {
    pub fn new(frame: &'f mut Frame) -> Self {
        InstructionContext { frame }
    }

    /// Generate a new temporary.
    pub fn new_reg(&mut self, class: RegClass) -> VReg {
        self.frame.new_reg(class)
    }

    /// Generate a move.
    pub fn move_reg(&mut self, dst: VReg, src: VReg) {
        self.frame.move_reg(dst, src);
    }

    /// Abstract instruction emitter proxy.
    pub fn emit(&mut self, inst: MachInst) {
        self.frame.emit(inst);
    }

    pub fn frame(&mut self) -> &mut Frame {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_regs_are_distinct() {
        let mut frame = Frame::new("f");
        let a = frame.new_reg(RegClass::Gpr);
        let b = frame.new_reg(RegClass::Gpr);
        assert_ne!(a, b);
        assert_ne!(a, frame.rv);
    }

    #[test]
    fn alloc_var_is_stable_per_name() {
        let mut frame = Frame::new("f");
        let x = frame.alloc_var("var_x", 4);
        let y = frame.alloc_var("var_y", 8);
        assert_eq!(x, 0);
        assert_eq!(y, 4);
        assert_eq!(frame.alloc_var("var_x", 4), 0);
        assert_eq!(frame.stack_size, 12);
    }

    #[test]
    fn arg_locs_are_fixed() {
        let mut frame = Frame::new("f");
        let a0 = frame.arg_loc(0);
        let a1 = frame.arg_loc(1);
        assert_ne!(a0, a1);
        assert_eq!(frame.arg_loc(0), a0);
    }

    #[test]
    fn literal_pool_dedupes_and_drains() {
        let mut frame = Frame::new("f");
        let l1 = frame.add_constant(LitValue::Int(42));
        let l2 = frame.add_constant(LitValue::Int(42));
        let l3 = frame.add_constant(LitValue::Bytes(vec![1, 2]));
        assert_eq!(l1, l2);
        assert_ne!(l1, l3);
        assert_eq!(l1, "f_literal_0");
        assert_eq!(frame.pending_constants(), 2);

        frame.between_blocks();
        assert_eq!(frame.pending_constants(), 0);
        assert!(frame
            .instrs
            .iter()
            .any(|i| matches!(i, MachInst::Label(l) if l == "f_literal_0")));
        assert!(frame.instrs.iter().any(|i| matches!(i, MachInst::Word(42))));

        // Nothing pending, nothing emitted.
        let len = frame.instrs.len();
        frame.between_blocks();
        assert_eq!(frame.instrs.len(), len);
    }

    #[test]
    fn prologue_and_epilogue_adjust_sp() {
        let mut frame = Frame::new("f");
        frame.alloc_var("var_x", 8);

        let prologue = frame.prologue();
        assert!(matches!(prologue[0], MachInst::Label(ref l) if l == "f"));
        assert!(matches!(prologue[1], MachInst::AdjustSp(-8)));

        let epilogue = frame.epilogue();
        assert!(matches!(epilogue[0], MachInst::AdjustSp(8)));
    }

    #[test]
    fn context_proxies_to_frame() {
        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        let r = ctx.new_reg(RegClass::Gpr);
        let s = ctx.new_reg(RegClass::Gpr);
        ctx.move_reg(r, s);
        assert!(matches!(
            frame.instrs.last(),
            Some(MachInst::Move { .. })
        ));
    }
}
