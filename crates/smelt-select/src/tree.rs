//! Expression trees fed to the pattern matcher.
//!
//! Trees are transient, per-block data. Nodes live in a [`TreeArena`] and
//! reference each other by [`TreeRef`]; the matcher keeps its per-node
//! state in a parallel vector indexed the same way.
//!
//! Terminal symbols are the cross product of opcodes and bit widths
//! (`ADDI32`, `LDRI8`, ...) plus the control terminals.

use std::fmt;

use smallvec::SmallVec;
use smelt_ir::CondOp;

use crate::frame::VReg;

/// Tree node identity within an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeRef(pub u32);

/// Opcode half of a sized terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Or,
    Shl,
    Shr,
    And,
    Xor,
    Mov,
    Reg,
    Ldr,
    Str,
    Const,
}

/// Size class half of a sized terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bits {
    B8,
    B16,
    B32,
    B64,
}

impl Bits {
    pub fn bytes(self) -> u32 {
        match self {
            Bits::B8 => 1,
            Bits::B16 => 2,
            Bits::B32 => 4,
            Bits::B64 => 8,
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Bits::B8 => "8",
            Bits::B16 => "16",
            Bits::B32 => "32",
            Bits::B64 => "64",
        };
        f.write_str(n)
    }
}

/// A tree label: a sized opcode or a control terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    Op(TermOp, Bits),
    Call,
    Label,
    Jmp,
    Cjmp,
    Exit,
    Entry,
}

impl Terminal {
    /// Number of kid trees this terminal carries.
    pub fn arity(self) -> usize {
        match self {
            Terminal::Op(op, _) => match op {
                TermOp::Add
                | TermOp::Sub
                | TermOp::Mul
                | TermOp::Div
                | TermOp::Rem
                | TermOp::Or
                | TermOp::Shl
                | TermOp::Shr
                | TermOp::And
                | TermOp::Xor
                | TermOp::Str => 2,
                TermOp::Mov | TermOp::Ldr => 1,
                TermOp::Reg | TermOp::Const => 0,
            },
            Terminal::Cjmp => 2,
            Terminal::Call | Terminal::Label | Terminal::Jmp | Terminal::Exit | Terminal::Entry => {
                0
            }
        }
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminal::Op(op, bits) => {
                let name = match op {
                    TermOp::Add => "ADD",
                    TermOp::Sub => "SUB",
                    TermOp::Mul => "MUL",
                    TermOp::Div => "DIV",
                    TermOp::Rem => "REM",
                    TermOp::Or => "OR",
                    TermOp::Shl => "SHL",
                    TermOp::Shr => "SHR",
                    TermOp::And => "AND",
                    TermOp::Xor => "XOR",
                    TermOp::Mov => "MOV",
                    TermOp::Reg => "REG",
                    TermOp::Ldr => "LDR",
                    TermOp::Str => "STR",
                    TermOp::Const => "CONST",
                };
                write!(f, "{name}I{bits}")
            }
            Terminal::Call => f.write_str("CALL"),
            Terminal::Label => f.write_str("LABEL"),
            Terminal::Jmp => f.write_str("JMP"),
            Terminal::Cjmp => f.write_str("CJMP"),
            Terminal::Exit => f.write_str("EXIT"),
            Terminal::Entry => f.write_str("ENTRY"),
        }
    }
}

/// Payload attached to a tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeValue {
    Int(i64),
    Reg(VReg),
    Label(String),
    Cond {
        op: CondOp,
        if_true: String,
        if_false: String,
    },
    Call {
        callee: String,
        args: Vec<VReg>,
        result: Option<VReg>,
    },
}

/// One tree node.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub term: Terminal,
    pub kids: SmallVec<[TreeRef; 2]>,
    pub value: Option<TreeValue>,
}

/// Arena holding every tree node of one block's forest.
#[derive(Debug, Default)]
pub struct TreeArena {
    nodes: Vec<TreeNode>,
}

impl TreeArena {
    pub fn new() -> Self {
        TreeArena::default()
    }

    pub fn add(
        &mut self,
        term: Terminal,
        kids: impl Into<SmallVec<[TreeRef; 2]>>,
        value: Option<TreeValue>,
    ) -> TreeRef {
        let id = TreeRef(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            term,
            kids: kids.into(),
            value,
        });
        id
    }

    pub fn leaf(&mut self, term: Terminal, value: Option<TreeValue>) -> TreeRef {
        self.add(term, SmallVec::new(), value)
    }

    pub fn node(&self, id: TreeRef) -> &TreeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Renders a tree as `TERM(KID, KID)` for diagnostics.
    pub fn format_tree(&self, id: TreeRef) -> String {
        let node = self.node(id);
        if node.kids.is_empty() {
            return node.term.to_string();
        }
        let kids: Vec<String> = node.kids.iter().map(|&k| self.format_tree(k)).collect();
        format!("{}({})", node.term, kids.join(", "))
    }
}
