//! Splits per-block IR into a forest of expression trees.
//!
//! The per-function use-def DAG (a petgraph digraph, edges def to user)
//! decides which values can be folded into their single consumer and
//! which must be materialized into a virtual register: multi-use values,
//! values live across block boundaries, and values containing loads that
//! would otherwise float across a store or call.
//!
//! Every resulting tree has a root whose terminal is one of `STRIx`,
//! `CJMP`, `JMP`, `CALL`, `EXIT`, `ENTRY`, or a register-def root
//! (`MOVIx` with a register payload, reduced via the `stm <- reg` chain
//! rule).

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use smelt_ir::{BinOp, BlockId, ConstValue, Function, Instr, InstrId, IrType};

use crate::error::SelectError;
use crate::frame::{Frame, LitValue, MachInst, RegClass, VReg};
use crate::tree::{Bits, TermOp, Terminal, TreeArena, TreeRef, TreeValue};

/// The label of a basic block in the emitted instruction stream.
pub fn block_label(func_name: &str, block: BlockId) -> String {
    format!("{func_name}_{block}")
}

/// One block's worth of trees, in emission order.
pub struct BlockForest {
    pub arena: TreeArena,
    pub roots: Vec<TreeRef>,
}

/// Per-function splitter. Holds the use-def DAG and the registers of
/// already-materialized values, which persist across blocks.
pub struct DagSplitter<'f> {
    func: &'f Function,
    graph: DiGraph<InstrId, ()>,
    cross_block: HashSet<InstrId>,
    materialized: HashMap<InstrId, VReg>,
    started: bool,
}

fn bits_of(ty: IrType) -> Bits {
    match ty.bits() {
        8 => Bits::B8,
        16 => Bits::B16,
        32 => Bits::B32,
        64 => Bits::B64,
        _ => unreachable!("type {ty} has no register width"),
    }
}

fn reg_class(bits: Bits) -> RegClass {
    match bits {
        Bits::B64 => RegClass::Gpr64,
        _ => RegClass::Gpr,
    }
}

fn term_binop(op: BinOp) -> TermOp {
    match op {
        BinOp::Add => TermOp::Add,
        BinOp::Sub => TermOp::Sub,
        BinOp::Mul => TermOp::Mul,
        BinOp::Div => TermOp::Div,
        BinOp::Shl => TermOp::Shl,
        BinOp::Shr => TermOp::Shr,
        BinOp::Or => TermOp::Or,
        BinOp::And => TermOp::And,
    }
}

impl<'f> DagSplitter<'f> {
    pub fn new(func: &'f Function) -> Self {
        let mut graph = DiGraph::new();
        for i in 0..func.instr_count() {
            graph.add_node(InstrId(i as u32));
        }

        let mut def_block: HashMap<InstrId, BlockId> = HashMap::new();
        for (bid, block) in func.blocks_iter() {
            for &iid in &block.instrs {
                def_block.insert(iid, bid);
            }
        }

        let mut cross_block = HashSet::new();
        for (bid, block) in func.blocks_iter() {
            for &iid in &block.instrs {
                for operand in func.instr(iid).operands() {
                    graph.add_edge(
                        NodeIndex::new(operand.0 as usize),
                        NodeIndex::new(iid.0 as usize),
                        (),
                    );
                    if def_block.get(&operand) != Some(&bid) {
                        cross_block.insert(operand);
                    }
                }
            }
        }

        DagSplitter {
            func,
            graph,
            cross_block,
            materialized: HashMap::new(),
            started: false,
        }
    }

    /// Total number of uses of a value across the function.
    fn use_total(&self, iid: InstrId) -> usize {
        self.graph
            .neighbors_directed(NodeIndex::new(iid.0 as usize), Direction::Outgoing)
            .count()
    }

    fn value_type(&self, iid: InstrId) -> Result<IrType, SelectError> {
        self.func
            .instr(iid)
            .result_type()
            .ok_or_else(|| SelectError::Unmaterialized {
                instr: iid.to_string(),
            })
    }

    /// Splits one block into its tree forest. Materialization
    /// instructions for allocs and parameters go straight into the
    /// frame; everything else becomes trees.
    pub fn split_block(
        &mut self,
        bid: BlockId,
        frame: &mut Frame,
    ) -> Result<BlockForest, SelectError> {
        let mut arena = TreeArena::new();
        let mut roots = Vec::new();
        // Unconsumed value trees, with a flag for embedded loads.
        let mut pending: HashMap<InstrId, (TreeRef, bool)> = HashMap::new();

        if !self.started {
            self.started = true;
            roots.push(arena.leaf(Terminal::Entry, None));
        }

        for &iid in &self.func.block(bid).instrs {
            match self.func.instr(iid) {
                Instr::Alloc { name, size } => {
                    let offset = frame.alloc_var(name, *size);
                    let dst = frame.new_reg(RegClass::Gpr);
                    frame.emit(MachInst::StackAddr { dst, offset });
                    self.materialized.insert(iid, dst);
                }
                Instr::Param { index, .. } => {
                    let reg = frame.arg_loc(*index);
                    self.materialized.insert(iid, reg);
                }
                // Blob constants are folded into the `Addr` that
                // references them.
                Instr::Const {
                    value: ConstValue::Blob(_),
                    ..
                } => {}
                Instr::Store { value, addr, .. } => {
                    let bits = bits_of(self.value_type(*value)?);
                    let addr_tree = self.operand_tree(&mut arena, &mut pending, frame, *addr)?;
                    let value_tree = self.operand_tree(&mut arena, &mut pending, frame, *value)?;
                    let root = arena.add(
                        Terminal::Op(TermOp::Str, bits),
                        vec![addr_tree, value_tree],
                        None,
                    );
                    self.flush_loads(&mut arena, &mut pending, &mut roots, frame)?;
                    roots.push(root);
                }
                Instr::Call { callee, args, ty, .. } => {
                    let callee = callee.clone();
                    let ty = *ty;
                    let args = args.clone();
                    let mut arg_regs = Vec::new();
                    for &arg in &args {
                        let reg =
                            self.operand_reg(&mut arena, &mut pending, &mut roots, frame, arg)?;
                        arg_regs.push(reg);
                    }
                    let result = if self.use_total(iid) > 0 {
                        Some(frame.new_reg(reg_class(bits_of(ty))))
                    } else {
                        None
                    };
                    self.flush_loads(&mut arena, &mut pending, &mut roots, frame)?;
                    roots.push(arena.leaf(
                        Terminal::Call,
                        Some(TreeValue::Call {
                            callee,
                            args: arg_regs,
                            result,
                        }),
                    ));
                    if let Some(reg) = result {
                        self.materialized.insert(iid, reg);
                    }
                }
                Instr::Jump { target } => {
                    roots.push(arena.leaf(
                        Terminal::Jmp,
                        Some(TreeValue::Label(block_label(&self.func.name, *target))),
                    ));
                }
                Instr::CJump {
                    a,
                    cond,
                    b,
                    if_true,
                    if_false,
                } => {
                    let (a, cond, b, if_true, if_false) = (*a, *cond, *b, *if_true, *if_false);
                    let ta = self.operand_tree(&mut arena, &mut pending, frame, a)?;
                    let tb = self.operand_tree(&mut arena, &mut pending, frame, b)?;
                    let root = arena.add(
                        Terminal::Cjmp,
                        vec![ta, tb],
                        Some(TreeValue::Cond {
                            op: cond,
                            if_true: block_label(&self.func.name, if_true),
                            if_false: block_label(&self.func.name, if_false),
                        }),
                    );
                    roots.push(root);
                }
                Instr::Return { value } => {
                    let value = *value;
                    let bits = bits_of(self.value_type(value)?);
                    let rv = match bits {
                        Bits::B64 => frame.rv64,
                        _ => frame.rv,
                    };
                    let tree = self.operand_tree(&mut arena, &mut pending, frame, value)?;
                    let mov = arena.add(
                        Terminal::Op(TermOp::Mov, bits),
                        vec![tree],
                        Some(TreeValue::Reg(rv)),
                    );
                    roots.push(mov);
                    roots.push(arena.leaf(Terminal::Exit, None));
                }
                _ => {
                    // A pure value computation.
                    let (tree, has_load) = self.value_tree(&mut arena, &mut pending, frame, iid)?;
                    let uses = self.use_total(iid);
                    if self.cross_block.contains(&iid) || uses > 1 {
                        let bits = bits_of(self.value_type(iid)?);
                        let dst = frame.new_reg(reg_class(bits));
                        let mov = arena.add(
                            Terminal::Op(TermOp::Mov, bits),
                            vec![tree],
                            Some(TreeValue::Reg(dst)),
                        );
                        roots.push(mov);
                        self.materialized.insert(iid, dst);
                    } else if uses == 1 {
                        pending.insert(iid, (tree, has_load));
                    }
                    // A pure value nobody uses just disappears.
                }
            }
        }

        Ok(BlockForest { arena, roots })
    }

    /// Builds the tree for a pure value instruction.
    fn value_tree(
        &mut self,
        arena: &mut TreeArena,
        pending: &mut HashMap<InstrId, (TreeRef, bool)>,
        frame: &mut Frame,
        iid: InstrId,
    ) -> Result<(TreeRef, bool), SelectError> {
        match self.func.instr(iid) {
            Instr::Const { value, ty, .. } => {
                let tree = match value {
                    ConstValue::Int(v) => arena.leaf(
                        Terminal::Op(TermOp::Const, bits_of(*ty)),
                        Some(TreeValue::Int(*v)),
                    ),
                    // Floats travel as their bit pattern in a 64-bit
                    // register pair.
                    ConstValue::Float(v) => arena.leaf(
                        Terminal::Op(TermOp::Const, Bits::B64),
                        Some(TreeValue::Int(v.to_bits() as i64)),
                    ),
                    ConstValue::Blob(_) => {
                        unreachable!("blob constants are consumed by their addr")
                    }
                };
                Ok((tree, false))
            }
            Instr::Addr { of, .. } => {
                let blob = match self.func.instr(*of) {
                    Instr::Const {
                        value: ConstValue::Blob(bytes),
                        ..
                    } => bytes.clone(),
                    other => panic!("addr of non-blob constant {other:?}"),
                };
                let label = frame.add_constant(LitValue::Bytes(blob));
                Ok((
                    arena.leaf(Terminal::Label, Some(TreeValue::Label(label))),
                    false,
                ))
            }
            Instr::GlobalRef { name } => Ok((
                arena.leaf(Terminal::Label, Some(TreeValue::Label(name.clone()))),
                false,
            )),
            Instr::Load { addr, ty, .. } => {
                let (addr, ty) = (*addr, *ty);
                let (addr_tree, _) = self.operand_tree_full(arena, pending, frame, addr)?;
                let tree = arena.add(
                    Terminal::Op(TermOp::Ldr, bits_of(ty)),
                    vec![addr_tree],
                    None,
                );
                Ok((tree, true))
            }
            Instr::Binop { a, op, b, ty, .. } => {
                let (a, op, b, ty) = (*a, *op, *b, *ty);
                let (ta, la) = self.operand_tree_full(arena, pending, frame, a)?;
                let (tb, lb) = self.operand_tree_full(arena, pending, frame, b)?;
                let tree = arena.add(
                    Terminal::Op(term_binop(op), bits_of(ty)),
                    vec![ta, tb],
                    None,
                );
                Ok((tree, la || lb))
            }
            Instr::IntToPtr { value, .. }
            | Instr::PtrToInt { value, .. }
            | Instr::ByteToInt { value, .. } => {
                let value = *value;
                let (kid, load) = self.operand_tree_full(arena, pending, frame, value)?;
                let tree = arena.add(Terminal::Op(TermOp::Mov, Bits::B32), vec![kid], None);
                Ok((tree, load))
            }
            Instr::IntToByte { value, .. } => {
                let value = *value;
                let (kid, load) = self.operand_tree_full(arena, pending, frame, value)?;
                let tree = arena.add(Terminal::Op(TermOp::Mov, Bits::B8), vec![kid], None);
                Ok((tree, load))
            }
            other => unreachable!("not a pure value instruction: {other:?}"),
        }
    }

    /// Resolves an operand: the register of a materialized value, or the
    /// pending tree of its single in-block use.
    fn operand_tree(
        &mut self,
        arena: &mut TreeArena,
        pending: &mut HashMap<InstrId, (TreeRef, bool)>,
        frame: &mut Frame,
        iid: InstrId,
    ) -> Result<TreeRef, SelectError> {
        self.operand_tree_full(arena, pending, frame, iid)
            .map(|(tree, _)| tree)
    }

    fn operand_tree_full(
        &mut self,
        arena: &mut TreeArena,
        pending: &mut HashMap<InstrId, (TreeRef, bool)>,
        _frame: &mut Frame,
        iid: InstrId,
    ) -> Result<(TreeRef, bool), SelectError> {
        if let Some(&reg) = self.materialized.get(&iid) {
            let bits = bits_of(self.value_type(iid)?);
            let tree = arena.leaf(
                Terminal::Op(TermOp::Reg, bits),
                Some(TreeValue::Reg(reg)),
            );
            return Ok((tree, false));
        }
        if let Some(entry) = pending.remove(&iid) {
            return Ok(entry);
        }
        Err(SelectError::Unmaterialized {
            instr: iid.to_string(),
        })
    }

    /// Resolves an operand all the way into a register, materializing
    /// its pending tree if needed (used for call arguments).
    fn operand_reg(
        &mut self,
        arena: &mut TreeArena,
        pending: &mut HashMap<InstrId, (TreeRef, bool)>,
        roots: &mut Vec<TreeRef>,
        frame: &mut Frame,
        iid: InstrId,
    ) -> Result<VReg, SelectError> {
        if let Some(&reg) = self.materialized.get(&iid) {
            return Ok(reg);
        }
        if let Some((tree, _)) = pending.remove(&iid) {
            let bits = bits_of(self.value_type(iid)?);
            let dst = frame.new_reg(reg_class(bits));
            let mov = arena.add(
                Terminal::Op(TermOp::Mov, bits),
                vec![tree],
                Some(TreeValue::Reg(dst)),
            );
            roots.push(mov);
            self.materialized.insert(iid, dst);
            return Ok(dst);
        }
        Err(SelectError::Unmaterialized {
            instr: iid.to_string(),
        })
    }

    /// Materializes every pending tree containing a load, in definition
    /// order, so loads cannot float across the upcoming store or call.
    fn flush_loads(
        &mut self,
        arena: &mut TreeArena,
        pending: &mut HashMap<InstrId, (TreeRef, bool)>,
        roots: &mut Vec<TreeRef>,
        frame: &mut Frame,
    ) -> Result<(), SelectError> {
        let mut loads: Vec<InstrId> = pending
            .iter()
            .filter(|(_, (_, has_load))| *has_load)
            .map(|(&iid, _)| iid)
            .collect();
        loads.sort_by_key(|iid| iid.0);

        for iid in loads {
            let (tree, _) = pending.remove(&iid).expect("still pending");
            let bits = bits_of(self.value_type(iid)?);
            let dst = frame.new_reg(reg_class(bits));
            let mov = arena.add(
                Terminal::Op(TermOp::Mov, bits),
                vec![tree],
                Some(TreeValue::Reg(dst)),
            );
            roots.push(mov);
            self.materialized.insert(iid, dst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smelt_ir::CondOp;

    fn const_i32(func: &mut Function, block: BlockId, v: i64) -> InstrId {
        func.push_instr(
            block,
            Instr::Const {
                value: ConstValue::Int(v),
                name: "cnst".into(),
                ty: IrType::I32,
            },
            None,
        )
    }

    #[test]
    fn single_use_values_fold_into_their_consumer() {
        // store (1 + 2) -> alloc
        let mut f = Function::new("f");
        let entry = f.new_block();
        let slot = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_x".into(),
                size: 4,
            },
            None,
        );
        let a = const_i32(&mut f, entry, 1);
        let b = const_i32(&mut f, entry, 2);
        let sum = f.push_instr(
            entry,
            Instr::Binop {
                a,
                op: BinOp::Add,
                b,
                name: "binop".into(),
                ty: IrType::I32,
            },
            None,
        );
        f.push_instr(
            entry,
            Instr::Store {
                value: sum,
                addr: slot,
                volatile: true,
            },
            None,
        );
        let epilogue = f.epilogue;
        f.push_instr(entry, Instr::Jump { target: epilogue }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        // ENTRY, the store tree, and the jump; the whole sum folded into
        // the store.
        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        assert_eq!(rendered[0], "ENTRY");
        assert_eq!(
            rendered[1],
            "STRI32(REGI32, ADDI32(CONSTI32, CONSTI32))"
        );
        assert_eq!(rendered[2], "JMP");

        // The alloc became a stack slot with a materialized address.
        assert!(frame
            .instrs
            .iter()
            .any(|i| matches!(i, MachInst::StackAddr { .. })));
        assert_eq!(frame.stack_size, 4);
    }

    #[test]
    fn multi_use_value_is_materialized_once() {
        // x = 7; store x -> a; store x -> b  (x used twice)
        let mut f = Function::new("f");
        let entry = f.new_block();
        let a = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_a".into(),
                size: 4,
            },
            None,
        );
        let b = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_b".into(),
                size: 4,
            },
            None,
        );
        let x = const_i32(&mut f, entry, 7);
        f.push_instr(
            entry,
            Instr::Store {
                value: x,
                addr: a,
                volatile: true,
            },
            None,
        );
        f.push_instr(
            entry,
            Instr::Store {
                value: x,
                addr: b,
                volatile: true,
            },
            None,
        );
        let epilogue = f.epilogue;
        f.push_instr(entry, Instr::Jump { target: epilogue }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        // The constant is materialized through a MOV root, then both
        // stores consume the register leaf.
        assert_eq!(rendered[1], "MOVI32(CONSTI32)");
        assert_eq!(rendered[2], "STRI32(REGI32, REGI32)");
        assert_eq!(rendered[3], "STRI32(REGI32, REGI32)");
    }

    #[test]
    fn loads_do_not_float_across_stores() {
        // t = load a; store 1 -> a; store t -> b
        let mut f = Function::new("f");
        let entry = f.new_block();
        let a = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_a".into(),
                size: 4,
            },
            None,
        );
        let b = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_b".into(),
                size: 4,
            },
            None,
        );
        let t = f.push_instr(
            entry,
            Instr::Load {
                addr: a,
                name: "loaded".into(),
                ty: IrType::I32,
            },
            None,
        );
        let one = const_i32(&mut f, entry, 1);
        f.push_instr(
            entry,
            Instr::Store {
                value: one,
                addr: a,
                volatile: true,
            },
            None,
        );
        f.push_instr(
            entry,
            Instr::Store {
                value: t,
                addr: b,
                volatile: true,
            },
            None,
        );
        let epilogue = f.epilogue;
        f.push_instr(entry, Instr::Jump { target: epilogue }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        // The pending load is flushed into a register BEFORE the first
        // store root, so the second store reads the pre-store value.
        assert_eq!(rendered[1], "MOVI32(LDRI32(REGI32))");
        assert_eq!(rendered[2], "STRI32(REGI32, CONSTI32)");
        assert_eq!(rendered[3], "STRI32(REGI32, REGI32)");
    }

    #[test]
    fn cjump_becomes_a_labeled_root() {
        let mut f = Function::new("f");
        let entry = f.new_block();
        let then_b = f.new_block();
        let else_b = f.new_block();
        let a = const_i32(&mut f, entry, 1);
        let b = const_i32(&mut f, entry, 2);
        f.push_instr(
            entry,
            Instr::CJump {
                a,
                cond: CondOp::Gt,
                b,
                if_true: then_b,
                if_false: else_b,
            },
            None,
        );

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        let root = *forest.roots.last().unwrap();
        assert_eq!(
            forest.arena.format_tree(root),
            "CJMP(CONSTI32, CONSTI32)"
        );
        match forest.arena.node(root).value.as_ref().unwrap() {
            TreeValue::Cond {
                op,
                if_true,
                if_false,
            } => {
                assert_eq!(*op, CondOp::Gt);
                assert_eq!(if_true, "f_block2");
                assert_eq!(if_false, "f_block3");
            }
            other => panic!("expected cond payload, got {other:?}"),
        }
    }

    #[test]
    fn string_blob_goes_to_the_literal_pool() {
        let mut f = Function::new("f");
        let entry = f.new_block();
        let slot = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_s".into(),
                size: 4,
            },
            None,
        );
        let blob = f.push_instr(
            entry,
            Instr::Const {
                value: ConstValue::Blob(vec![2, 0, 0, 0, 0x48, 0x69]),
                name: "strval".into(),
                ty: IrType::Blob,
            },
            None,
        );
        let addr = f.push_instr(
            entry,
            Instr::Addr {
                of: blob,
                name: "addroftxt".into(),
            },
            None,
        );
        f.push_instr(
            entry,
            Instr::Store {
                value: addr,
                addr: slot,
                volatile: true,
            },
            None,
        );
        let epilogue = f.epilogue;
        f.push_instr(entry, Instr::Jump { target: epilogue }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        assert_eq!(rendered[1], "STRI32(REGI32, LABEL)");
        assert_eq!(frame.pending_constants(), 1);
    }

    #[test]
    fn call_arguments_are_materialized() {
        let mut f = Function::new("f");
        let entry = f.new_block();
        let a = const_i32(&mut f, entry, 3);
        let call = f.push_instr(
            entry,
            Instr::Call {
                callee: "main_g".into(),
                args: smallvec::SmallVec::from_slice(&[a]),
                name: "main_g_rv".into(),
                ty: IrType::I32,
            },
            None,
        );
        f.push_instr(entry, Instr::Return { value: call }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        let forest = splitter.split_block(entry, &mut frame).unwrap();

        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        // arg mov, call, return-value mov, exit.
        assert_eq!(rendered[1], "MOVI32(CONSTI32)");
        assert_eq!(rendered[2], "CALL");
        assert_eq!(rendered[3], "MOVI32(REGI32)");
        assert_eq!(rendered[4], "EXIT");

        match forest.arena.node(forest.roots[2]).value.as_ref().unwrap() {
            TreeValue::Call {
                callee,
                args,
                result,
            } => {
                assert_eq!(callee, "main_g");
                assert_eq!(args.len(), 1);
                assert!(result.is_some());
            }
            other => panic!("expected call payload, got {other:?}"),
        }
    }

    #[test]
    fn allocs_are_visible_from_later_blocks() {
        let mut f = Function::new("f");
        let entry = f.new_block();
        let body = f.new_block();
        let slot = f.push_instr(
            entry,
            Instr::Alloc {
                name: "var_x".into(),
                size: 4,
            },
            None,
        );
        f.push_instr(entry, Instr::Jump { target: body }, None);
        let v = const_i32(&mut f, body, 9);
        f.push_instr(
            body,
            Instr::Store {
                value: v,
                addr: slot,
                volatile: true,
            },
            None,
        );
        let epilogue = f.epilogue;
        f.push_instr(body, Instr::Jump { target: epilogue }, None);

        let mut frame = Frame::new("f");
        let mut splitter = DagSplitter::new(&f);
        splitter.split_block(entry, &mut frame).unwrap();
        let forest = splitter.split_block(body, &mut frame).unwrap();

        let rendered: Vec<String> = forest
            .roots
            .iter()
            .map(|&r| forest.arena.format_tree(r))
            .collect();
        assert_eq!(rendered[0], "STRI32(REGI32, CONSTI32)");
    }
}
