//! Structural checks over emitted IR.
//!
//! The verifier enforces the block and type invariants the rest of the
//! back-end relies on: proper block termination, operand type agreement,
//! pointer-typed store targets, in-range jump targets, and def-before-use
//! ordering (the arena is in emission order, so a use must reference a
//! lower id). The epilogue block is exempt from the termination check; it
//! is completed by the target's epilogue sequence after selection.

use thiserror::Error;

use crate::instr::{BlockId, Instr, InstrId, IrType};
use crate::module::{Function, Module};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("function {func}: {block} does not end in a terminator")]
    MissingTerminator { func: String, block: BlockId },

    #[error("function {func}: {block} has an instruction after its terminator")]
    InstrAfterTerminator { func: String, block: BlockId },

    #[error("function {func}: {instr}: {detail}")]
    TypeMismatch {
        func: String,
        instr: InstrId,
        detail: String,
    },

    #[error("function {func}: {instr}: store target is not pointer-typed")]
    BadStoreTarget { func: String, instr: InstrId },

    #[error("function {func}: {instr}: jump target {target} out of range")]
    BadJumpTarget {
        func: String,
        instr: InstrId,
        target: BlockId,
    },

    #[error("function {func}: {instr}: operand {operand} does not precede its use")]
    UseBeforeDef {
        func: String,
        instr: InstrId,
        operand: InstrId,
    },

    #[error("function {func}: {instr}: operand {operand} produces no value")]
    ValuelessOperand {
        func: String,
        instr: InstrId,
        operand: InstrId,
    },
}

/// Checks every function of the module.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for func in &module.functions {
        verify_function(func)?;
    }
    Ok(())
}

/// Checks one function against the IR invariants.
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    for (bid, block) in func.blocks_iter() {
        if bid == func.epilogue {
            continue;
        }
        verify_block(func, bid, &block.instrs)?;
    }
    for (bid, block) in func.blocks_iter() {
        for &iid in &block.instrs {
            verify_instr(func, bid, iid)?;
        }
    }
    Ok(())
}

fn verify_block(func: &Function, bid: BlockId, instrs: &[InstrId]) -> Result<(), VerifyError> {
    let last_is_term = instrs
        .last()
        .map(|&i| func.instr(i).is_terminator())
        .unwrap_or(false);
    if !last_is_term {
        return Err(VerifyError::MissingTerminator {
            func: func.name.clone(),
            block: bid,
        });
    }
    for &iid in &instrs[..instrs.len() - 1] {
        if func.instr(iid).is_terminator() {
            return Err(VerifyError::InstrAfterTerminator {
                func: func.name.clone(),
                block: bid,
            });
        }
    }
    Ok(())
}

fn verify_instr(func: &Function, _bid: BlockId, iid: InstrId) -> Result<(), VerifyError> {
    let instr = func.instr(iid);

    for operand in instr.operands() {
        if operand.0 >= iid.0 {
            return Err(VerifyError::UseBeforeDef {
                func: func.name.clone(),
                instr: iid,
                operand,
            });
        }
        if func.instr(operand).result_type().is_none() {
            return Err(VerifyError::ValuelessOperand {
                func: func.name.clone(),
                instr: iid,
                operand,
            });
        }
    }

    match instr {
        Instr::Binop { a, b, ty, .. } => {
            let ta = func.instr(*a).result_type();
            let tb = func.instr(*b).result_type();
            if ta != Some(*ty) || tb != Some(*ty) {
                return Err(VerifyError::TypeMismatch {
                    func: func.name.clone(),
                    instr: iid,
                    detail: format!(
                        "binop operands {:?} and {:?} do not match result type {}",
                        ta, tb, ty
                    ),
                });
            }
        }
        Instr::CJump {
            a,
            b,
            if_true,
            if_false,
            ..
        } => {
            let ta = func.instr(*a).result_type();
            let tb = func.instr(*b).result_type();
            if ta != tb {
                return Err(VerifyError::TypeMismatch {
                    func: func.name.clone(),
                    instr: iid,
                    detail: format!("cjump comparand types {:?} and {:?} differ", ta, tb),
                });
            }
            for target in [*if_true, *if_false] {
                check_target(func, iid, target)?;
            }
        }
        Instr::Jump { target } => check_target(func, iid, *target)?,
        Instr::Store { addr, .. } => {
            if func.instr(*addr).result_type() != Some(IrType::Ptr) {
                return Err(VerifyError::BadStoreTarget {
                    func: func.name.clone(),
                    instr: iid,
                });
            }
        }
        Instr::Load { addr, .. } => {
            if func.instr(*addr).result_type() != Some(IrType::Ptr) {
                return Err(VerifyError::TypeMismatch {
                    func: func.name.clone(),
                    instr: iid,
                    detail: "load address is not pointer-typed".into(),
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_target(func: &Function, iid: InstrId, target: BlockId) -> Result<(), VerifyError> {
    if target.0 as usize >= func.blocks.len() {
        return Err(VerifyError::BadJumpTarget {
            func: func.name.clone(),
            instr: iid,
            target,
        });
    }
    Ok(())
}
