//! The demo target: a small RISC-like machine used by the tests.
//!
//! 32-bit registers; 64-bit values (doubles) live in register pairs
//! (`reg64`). The pattern set covers every tree shape the lowering
//! emits for the i8/i32/ptr/f64 value set.

use smelt_ir::CondOp;

use crate::burs::{BursSystem, Pattern};
use crate::frame::{InstructionContext, MachInst, RegClass, VReg};
use crate::tree::{Bits, TermOp, Terminal, TreeArena, TreeRef, TreeValue};

/// Builds the demo target's rule table.
pub fn demo_system() -> BursSystem {
    let mut sys = BursSystem::new();
    let stm = sys.non_term("stm");
    let reg = sys.non_term("reg");
    let reg64 = sys.non_term("reg64");

    // Declare the full terminal alphabet.
    let ops = [
        TermOp::Add,
        TermOp::Sub,
        TermOp::Mul,
        TermOp::Div,
        TermOp::Rem,
        TermOp::Or,
        TermOp::Shl,
        TermOp::Shr,
        TermOp::And,
        TermOp::Xor,
        TermOp::Mov,
        TermOp::Reg,
        TermOp::Ldr,
        TermOp::Str,
        TermOp::Const,
    ];
    let sizes = [Bits::B8, Bits::B16, Bits::B32, Bits::B64];
    for op in ops {
        for bits in sizes {
            sys.add_terminal(Terminal::Op(op, bits));
        }
    }
    for control in [
        Terminal::Call,
        Terminal::Label,
        Terminal::Jmp,
        Terminal::Cjmp,
        Terminal::Exit,
        Terminal::Entry,
    ] {
        sys.add_terminal(control);
    }

    // Register results are valid statement roots.
    sys.add_rule(stm, Pattern::nt(reg), 0, None, templates::discard);
    sys.add_rule(stm, Pattern::nt(reg64), 0, None, templates::discard);

    // Constants.
    sys.add_rule(
        reg,
        Pattern::leaf(Terminal::Op(TermOp::Const, Bits::B32)),
        2,
        None,
        templates::constant,
    );
    sys.add_rule(
        reg,
        Pattern::leaf(Terminal::Op(TermOp::Const, Bits::B8)),
        2,
        None,
        templates::constant,
    );
    sys.add_rule(
        reg64,
        Pattern::leaf(Terminal::Op(TermOp::Const, Bits::B64)),
        3,
        None,
        templates::constant,
    );

    // Materialized register leaves.
    sys.add_rule(
        reg,
        Pattern::leaf(Terminal::Op(TermOp::Reg, Bits::B32)),
        0,
        None,
        templates::reg_leaf,
    );
    sys.add_rule(
        reg,
        Pattern::leaf(Terminal::Op(TermOp::Reg, Bits::B8)),
        0,
        None,
        templates::reg_leaf,
    );
    sys.add_rule(
        reg64,
        Pattern::leaf(Terminal::Op(TermOp::Reg, Bits::B64)),
        0,
        None,
        templates::reg_leaf,
    );

    // Addresses of labels (globals, string data in the literal pool).
    sys.add_rule(
        reg,
        Pattern::leaf(Terminal::Label),
        2,
        None,
        templates::load_label,
    );

    // 32-bit arithmetic.
    for op in [
        TermOp::Add,
        TermOp::Sub,
        TermOp::Mul,
        TermOp::Div,
        TermOp::Or,
        TermOp::Shl,
        TermOp::Shr,
        TermOp::And,
        TermOp::Xor,
    ] {
        sys.add_rule(
            reg,
            Pattern::term(
                Terminal::Op(op, Bits::B32),
                vec![Pattern::nt(reg), Pattern::nt(reg)],
            ),
            2,
            None,
            templates::binary,
        );
    }

    // 64-bit arithmetic on register pairs.
    for op in [TermOp::Add, TermOp::Sub, TermOp::Mul, TermOp::Div] {
        sys.add_rule(
            reg64,
            Pattern::term(
                Terminal::Op(op, Bits::B64),
                vec![Pattern::nt(reg64), Pattern::nt(reg64)],
            ),
            8,
            None,
            templates::binary,
        );
    }

    // Memory.
    sys.add_rule(
        reg,
        Pattern::term(Terminal::Op(TermOp::Ldr, Bits::B8), vec![Pattern::nt(reg)]),
        3,
        None,
        templates::load,
    );
    sys.add_rule(
        reg,
        Pattern::term(Terminal::Op(TermOp::Ldr, Bits::B32), vec![Pattern::nt(reg)]),
        3,
        None,
        templates::load,
    );
    sys.add_rule(
        reg64,
        Pattern::term(Terminal::Op(TermOp::Ldr, Bits::B64), vec![Pattern::nt(reg)]),
        4,
        None,
        templates::load,
    );
    sys.add_rule(
        stm,
        Pattern::term(
            Terminal::Op(TermOp::Str, Bits::B8),
            vec![Pattern::nt(reg), Pattern::nt(reg)],
        ),
        2,
        None,
        templates::store,
    );
    sys.add_rule(
        stm,
        Pattern::term(
            Terminal::Op(TermOp::Str, Bits::B32),
            vec![Pattern::nt(reg), Pattern::nt(reg)],
        ),
        2,
        None,
        templates::store,
    );
    sys.add_rule(
        stm,
        Pattern::term(
            Terminal::Op(TermOp::Str, Bits::B64),
            vec![Pattern::nt(reg), Pattern::nt(reg64)],
        ),
        3,
        None,
        templates::store,
    );

    // Value moves: pointer/int reinterpretation is free, truncation to a
    // byte masks.
    sys.add_rule(
        reg,
        Pattern::term(Terminal::Op(TermOp::Mov, Bits::B32), vec![Pattern::nt(reg)]),
        0,
        Some(accept::no_payload),
        templates::forward,
    );
    sys.add_rule(
        reg,
        Pattern::term(Terminal::Op(TermOp::Mov, Bits::B8), vec![Pattern::nt(reg)]),
        1,
        Some(accept::no_payload),
        templates::truncate_byte,
    );

    // Materialization roots: move the value into the payload register.
    sys.add_rule(
        stm,
        Pattern::term(Terminal::Op(TermOp::Mov, Bits::B8), vec![Pattern::nt(reg)]),
        1,
        Some(accept::reg_payload),
        templates::move_into,
    );
    sys.add_rule(
        stm,
        Pattern::term(Terminal::Op(TermOp::Mov, Bits::B32), vec![Pattern::nt(reg)]),
        1,
        Some(accept::reg_payload),
        templates::move_into,
    );
    sys.add_rule(
        stm,
        Pattern::term(
            Terminal::Op(TermOp::Mov, Bits::B64),
            vec![Pattern::nt(reg64)],
        ),
        1,
        Some(accept::reg_payload),
        templates::move_into,
    );

    // Control flow.
    sys.add_rule(stm, Pattern::leaf(Terminal::Jmp), 2, None, templates::jump);
    sys.add_rule(
        stm,
        Pattern::term(Terminal::Cjmp, vec![Pattern::nt(reg), Pattern::nt(reg)]),
        3,
        None,
        templates::cond_jump,
    );
    sys.add_rule(
        stm,
        Pattern::term(Terminal::Cjmp, vec![Pattern::nt(reg64), Pattern::nt(reg64)]),
        10,
        None,
        templates::cond_jump,
    );
    sys.add_rule(stm, Pattern::leaf(Terminal::Call), 2, None, templates::call);

    sys
}

/// Acceptance predicates shared by the rules above.
mod accept {
    use super::*;

    pub fn reg_payload(arena: &TreeArena, tree: TreeRef) -> bool {
        matches!(arena.node(tree).value, Some(TreeValue::Reg(_)))
    }

    pub fn no_payload(arena: &TreeArena, tree: TreeRef) -> bool {
        arena.node(tree).value.is_none()
    }
}

/// Emission templates. Each reads its payload and size class from the
/// matched tree node.
mod templates {
    use super::*;

    fn term_bits(arena: &TreeArena, tree: TreeRef) -> Bits {
        match arena.node(tree).term {
            Terminal::Op(_, bits) => bits,
            other => panic!("terminal {other} has no size class"),
        }
    }

    fn kid_reg(kids: &[Option<VReg>], index: usize) -> VReg {
        kids[index].expect("kid rule produced no register")
    }

    fn dst_class(bits: Bits) -> RegClass {
        match bits {
            Bits::B64 => RegClass::Gpr64,
            _ => RegClass::Gpr,
        }
    }

    fn mnemonic(op: TermOp, bits: Bits) -> &'static str {
        let wide = bits == Bits::B64;
        match op {
            TermOp::Add => {
                if wide {
                    "add64"
                } else {
                    "add"
                }
            }
            TermOp::Sub => {
                if wide {
                    "sub64"
                } else {
                    "sub"
                }
            }
            TermOp::Mul => {
                if wide {
                    "mul64"
                } else {
                    "mul"
                }
            }
            TermOp::Div => {
                if wide {
                    "div64"
                } else {
                    "div"
                }
            }
            TermOp::Rem => {
                if wide {
                    "rem64"
                } else {
                    "rem"
                }
            }
            TermOp::Or => {
                if wide {
                    "or64"
                } else {
                    "or"
                }
            }
            TermOp::Shl => {
                if wide {
                    "shl64"
                } else {
                    "shl"
                }
            }
            TermOp::Shr => {
                if wide {
                    "shr64"
                } else {
                    "shr"
                }
            }
            TermOp::And => {
                if wide {
                    "and64"
                } else {
                    "and"
                }
            }
            TermOp::Xor => {
                if wide {
                    "xor64"
                } else {
                    "xor"
                }
            }
            other => panic!("{other:?} is not an arithmetic opcode"),
        }
    }

    fn cond_mnemonic(op: CondOp) -> &'static str {
        match op {
            CondOp::Eq => "jeq",
            CondOp::Ne => "jne",
            CondOp::Lt => "jlt",
            CondOp::Le => "jle",
            CondOp::Gt => "jgt",
            CondOp::Ge => "jge",
        }
    }

    pub fn discard(
        _ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        None
    }

    pub fn constant(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let value = match arena.node(tree).value {
            Some(TreeValue::Int(v)) => v,
            ref other => panic!("constant without integer payload: {other:?}"),
        };
        let dst = ctx.new_reg(dst_class(term_bits(arena, tree)));
        ctx.emit(MachInst::LoadImm { dst, value });
        Some(dst)
    }

    pub fn reg_leaf(
        _ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        match arena.node(tree).value {
            Some(TreeValue::Reg(reg)) => Some(reg),
            ref other => panic!("register leaf without register payload: {other:?}"),
        }
    }

    pub fn load_label(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let label = match &arena.node(tree).value {
            Some(TreeValue::Label(l)) => l.clone(),
            other => panic!("label leaf without label payload: {other:?}"),
        };
        let dst = ctx.new_reg(RegClass::Gpr);
        ctx.emit(MachInst::LoadLabel { dst, label });
        Some(dst)
    }

    pub fn binary(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let (op, bits) = match arena.node(tree).term {
            Terminal::Op(op, bits) => (op, bits),
            other => panic!("not an opcode terminal: {other}"),
        };
        let dst = ctx.new_reg(dst_class(bits));
        ctx.emit(MachInst::Binary {
            op: mnemonic(op, bits),
            dst,
            a: kid_reg(kids, 0),
            b: kid_reg(kids, 1),
        });
        Some(dst)
    }

    pub fn load(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let bits = term_bits(arena, tree);
        let dst = ctx.new_reg(dst_class(bits));
        ctx.emit(MachInst::Load {
            dst,
            addr: kid_reg(kids, 0),
            size: bits.bytes(),
        });
        Some(dst)
    }

    pub fn store(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let bits = term_bits(arena, tree);
        ctx.emit(MachInst::Store {
            src: kid_reg(kids, 1),
            addr: kid_reg(kids, 0),
            size: bits.bytes(),
        });
        None
    }

    pub fn forward(
        _ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        kids[0]
    }

    pub fn truncate_byte(
        ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let mask = ctx.new_reg(RegClass::Gpr);
        ctx.emit(MachInst::LoadImm {
            dst: mask,
            value: 0xff,
        });
        let dst = ctx.new_reg(RegClass::Gpr);
        ctx.emit(MachInst::Binary {
            op: "and",
            dst,
            a: kid_reg(kids, 0),
            b: mask,
        });
        Some(dst)
    }

    pub fn move_into(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let dst = match arena.node(tree).value {
            Some(TreeValue::Reg(reg)) => reg,
            ref other => panic!("move root without register payload: {other:?}"),
        };
        ctx.move_reg(dst, kid_reg(kids, 0));
        None
    }

    pub fn jump(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let label = match &arena.node(tree).value {
            Some(TreeValue::Label(l)) => l.clone(),
            other => panic!("jump without label payload: {other:?}"),
        };
        ctx.emit(MachInst::Jump(label));
        None
    }

    pub fn cond_jump(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let (op, if_true, if_false) = match &arena.node(tree).value {
            Some(TreeValue::Cond {
                op,
                if_true,
                if_false,
            }) => (*op, if_true.clone(), if_false.clone()),
            other => panic!("cjump without condition payload: {other:?}"),
        };
        ctx.emit(MachInst::CondJump {
            op: cond_mnemonic(op),
            a: kid_reg(kids, 0),
            b: kid_reg(kids, 1),
            if_true,
            if_false,
        });
        None
    }

    pub fn call(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let (callee, args, result) = match &arena.node(tree).value {
            Some(TreeValue::Call {
                callee,
                args,
                result,
            }) => (callee.clone(), args.clone(), *result),
            other => panic!("call without call payload: {other:?}"),
        };

        // Move arguments into the calling convention's fixed registers.
        let frame = ctx.frame();
        let mut uses = Vec::with_capacity(args.len());
        for (i, &arg) in args.iter().enumerate() {
            let loc = frame.arg_loc(i as u32);
            frame.move_reg(loc, arg);
            uses.push(loc);
        }
        ctx.emit(MachInst::Call {
            callee,
            uses,
            defs: result.into_iter().collect(),
        });
        None
    }
}
