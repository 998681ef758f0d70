//! Bottom-up labeling and top-down application.
//!
//! Labeling computes, for every node of a tree, the minimum cost of
//! reducing it to each non-terminal goal, using dynamic programming over
//! the rule table with chain-rule closure. Application walks back down
//! from the root goal, invoking the winning rules' templates to emit
//! instructions.

use tracing::trace;

use crate::burs::BursSystem;
use crate::error::SelectError;
use crate::frame::{InstructionContext, VReg};
use crate::state::State;
use crate::tree::{TreeArena, TreeRef};

/// Tree matcher that can match a tree and generate instructions.
pub struct TreeSelector<'s> {
    sys: &'s BursSystem,
}

impl<'s> TreeSelector<'s> {
    pub fn new(sys: &'s BursSystem) -> Self {
        TreeSelector { sys }
    }

    /// Tiles the tree with patterns and emits the corresponding code.
    /// The root goal is `stm`.
    pub fn gen(
        &self,
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
    ) -> Result<Option<VReg>, SelectError> {
        self.sys.check_tree_defined(arena, tree)?;

        let mut states: Vec<State> = (0..arena.len()).map(|_| State::new()).collect();
        self.label(arena, tree, &mut states);

        let goal = self
            .sys
            .find_non_term("stm")
            .ok_or_else(|| SelectError::UnknownGoal {
                name: "stm".to_string(),
            })?;
        if !states[tree.0 as usize].has_goal(goal) {
            return Err(SelectError::Uncovered {
                tree: arena.format_tree(tree),
            });
        }
        trace!(tree = %arena.format_tree(tree), "selected");
        Ok(self.apply(ctx, arena, tree, goal, &states))
    }

    /// Labels all nodes in the tree bottom up.
    pub(crate) fn label(&self, arena: &TreeArena, tree: TreeRef, states: &mut Vec<State>) {
        for &kid in arena.node(tree).kids.iter() {
            self.label(arena, kid, states);
        }

        // The kids are labeled; now check every rule rooted at this
        // terminal and keep the cheapest per goal.
        states[tree.0 as usize] = State::new();
        for &rid in self.sys.rules_for_root(arena.node(tree).term) {
            let rule = self.sys.rule(rid);
            if !self.sys.pattern_matches(arena, tree, &rule.pattern) {
                continue;
            }
            if let Some(accept) = rule.acceptance {
                if !accept(arena, tree) {
                    continue;
                }
            }

            let nts = self.sys.pattern_nts(&rule.pattern);
            let kids = self.sys.kids_of(arena, tree, &rule.pattern);

            let mut cost = rule.cost;
            let mut covered = true;
            for (&kid, &nt) in kids.iter().zip(&nts) {
                match states[kid.0 as usize].get_cost(nt) {
                    Some(c) => cost += c,
                    None => {
                        covered = false;
                        break;
                    }
                }
            }
            if !covered {
                continue;
            }

            states[tree.0 as usize].set_cost(rule.non_term, cost, rid);

            // Also set cost for chain rules here:
            for &crid in self.sys.chain_rules_for_nt(rule.non_term) {
                let chain = self.sys.rule(crid);
                states[tree.0 as usize].set_cost(chain.non_term, cost + chain.cost, crid);
            }
        }
    }

    /// Applies the selected rules to the tree, kids first.
    fn apply(
        &self,
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        goal: crate::burs::NtId,
        states: &[State],
    ) -> Option<VReg> {
        let rid = states[tree.0 as usize]
            .get_rule(goal)
            .expect("labeled tree has a rule for its goal");
        let rule = self.sys.rule(rid);

        let kids = self.sys.kids_of(arena, tree, &rule.pattern);
        let nts = self.sys.pattern_nts(&rule.pattern);
        let results: Vec<Option<VReg>> = kids
            .iter()
            .zip(&nts)
            .map(|(&kid, &nt)| self.apply(ctx, arena, kid, nt, states))
            .collect();

        (rule.template)(ctx, arena, tree, &results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burs::Pattern;
    use crate::frame::{Frame, MachInst, RegClass};
    use crate::tree::{Bits, TermOp, Terminal, TreeValue};

    const CONST32: Terminal = Terminal::Op(TermOp::Const, Bits::B32);
    const ADD32: Terminal = Terminal::Op(TermOp::Add, Bits::B32);

    fn const_template(
        ctx: &mut InstructionContext<'_>,
        arena: &TreeArena,
        tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let value = match arena.node(tree).value {
            Some(TreeValue::Int(v)) => v,
            _ => panic!("const tree without integer payload"),
        };
        let dst = ctx.new_reg(RegClass::Gpr);
        ctx.emit(MachInst::LoadImm { dst, value });
        Some(dst)
    }

    fn add_template(
        ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        kids: &[Option<VReg>],
    ) -> Option<VReg> {
        let dst = ctx.new_reg(RegClass::Gpr);
        ctx.emit(MachInst::Binary {
            op: "add",
            dst,
            a: kids[0].expect("register kid"),
            b: kids[1].expect("register kid"),
        });
        Some(dst)
    }

    fn discard_template(
        _ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        None
    }

    /// stm <- reg (chain, cost 0); reg <- CONSTI32 (cost 1);
    /// reg <- ADDI32(reg, reg) (cost 2).
    fn sample_system() -> BursSystem {
        let mut sys = BursSystem::new();
        let stm = sys.non_term("stm");
        let reg = sys.non_term("reg");
        sys.add_terminal(CONST32);
        sys.add_terminal(ADD32);
        sys.add_rule(reg, Pattern::leaf(CONST32), 1, None, const_template);
        sys.add_rule(
            reg,
            Pattern::term(ADD32, vec![Pattern::nt(reg), Pattern::nt(reg)]),
            2,
            None,
            add_template,
        );
        sys.add_rule(stm, Pattern::nt(reg), 0, None, discard_template);
        sys
    }

    #[test]
    fn selects_a_leaf_through_the_chain_rule() {
        let sys = sample_system();
        let selector = TreeSelector::new(&sys);
        let mut arena = TreeArena::new();
        let c = arena.leaf(CONST32, Some(TreeValue::Int(5)));

        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        let result = selector.gen(&mut ctx, &arena, c).unwrap();

        // The chain rule discards the register result at the root.
        assert_eq!(result, None);
        assert!(matches!(
            frame.instrs.as_slice(),
            [MachInst::LoadImm { value: 5, .. }]
        ));
    }

    #[test]
    fn tiles_a_nested_tree_bottom_up() {
        let sys = sample_system();
        let selector = TreeSelector::new(&sys);
        let mut arena = TreeArena::new();
        let a = arena.leaf(CONST32, Some(TreeValue::Int(1)));
        let b = arena.leaf(CONST32, Some(TreeValue::Int(2)));
        let add = arena.add(ADD32, vec![a, b], None);

        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        selector.gen(&mut ctx, &arena, add).unwrap();

        // Two immediate loads, then the add combining them.
        assert_eq!(frame.instrs.len(), 3);
        assert!(matches!(frame.instrs[0], MachInst::LoadImm { value: 1, .. }));
        assert!(matches!(frame.instrs[1], MachInst::LoadImm { value: 2, .. }));
        match &frame.instrs[2] {
            MachInst::Binary { op: "add", a, b, .. } => {
                assert!(matches!(frame.instrs[0], MachInst::LoadImm { dst, .. } if dst == *a));
                assert!(matches!(frame.instrs[1], MachInst::LoadImm { dst, .. } if dst == *b));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }

    #[test]
    fn chain_cost_is_base_cost_plus_chain_cost() {
        let sys = sample_system();
        let selector = TreeSelector::new(&sys);
        let mut arena = TreeArena::new();
        let c = arena.leaf(CONST32, Some(TreeValue::Int(5)));

        let mut states: Vec<State> = (0..arena.len()).map(|_| State::new()).collect();
        selector.label(&arena, c, &mut states);

        let reg = sys.find_non_term("reg").unwrap();
        let stm = sys.find_non_term("stm").unwrap();
        let state = &states[c.0 as usize];
        // reg <- CONSTI32 costs 1; the zero-cost chain makes stm cost 1
        // as well.
        assert_eq!(state.get_cost(reg), Some(1));
        assert_eq!(state.get_cost(stm), Some(1));
    }

    #[test]
    fn uncovered_tree_is_fatal() {
        let mut sys = sample_system();
        // A terminal with no rule at all.
        sys.add_terminal(Terminal::Op(TermOp::Mul, Bits::B32));
        let selector = TreeSelector::new(&sys);

        let mut arena = TreeArena::new();
        let a = arena.leaf(CONST32, Some(TreeValue::Int(1)));
        let b = arena.leaf(CONST32, Some(TreeValue::Int(2)));
        let mul = arena.add(Terminal::Op(TermOp::Mul, Bits::B32), vec![a, b], None);

        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        let err = selector.gen(&mut ctx, &arena, mul).unwrap_err();
        assert!(matches!(err, SelectError::Uncovered { tree } if tree.starts_with("MULI32")));
    }

    #[test]
    fn acceptance_predicate_gates_a_rule() {
        let mut sys = BursSystem::new();
        let stm = sys.non_term("stm");
        let reg = sys.non_term("reg");
        sys.add_terminal(CONST32);
        // Only small constants are accepted by the cheap rule.
        fn small(arena: &TreeArena, tree: TreeRef) -> bool {
            matches!(arena.node(tree).value, Some(TreeValue::Int(v)) if v < 256)
        }
        sys.add_rule(reg, Pattern::leaf(CONST32), 1, Some(small), const_template);
        sys.add_rule(stm, Pattern::nt(reg), 0, None, discard_template);
        let selector = TreeSelector::new(&sys);

        let mut arena = TreeArena::new();
        let small_const = arena.leaf(CONST32, Some(TreeValue::Int(5)));
        let big_const = arena.leaf(CONST32, Some(TreeValue::Int(100_000)));

        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        assert!(selector.gen(&mut ctx, &arena, small_const).is_ok());
        assert!(matches!(
            selector.gen(&mut ctx, &arena, big_const),
            Err(SelectError::Uncovered { .. })
        ));
    }

    #[test]
    fn cheaper_specific_rule_beats_generic_tiling() {
        // A fused add-of-constants rule undercuts the generic tiling.
        fn fused(
            ctx: &mut InstructionContext<'_>,
            _arena: &TreeArena,
            _tree: TreeRef,
            _kids: &[Option<VReg>],
        ) -> Option<VReg> {
            let dst = ctx.new_reg(RegClass::Gpr);
            ctx.emit(MachInst::LoadImm { dst, value: -1 });
            Some(dst)
        }

        let mut sys = sample_system();
        let reg = sys.find_non_term("reg").unwrap();
        sys.add_rule(
            reg,
            Pattern::term(
                ADD32,
                vec![Pattern::leaf(CONST32), Pattern::leaf(CONST32)],
            ),
            1,
            None,
            fused,
        );
        let selector = TreeSelector::new(&sys);

        let mut arena = TreeArena::new();
        let a = arena.leaf(CONST32, Some(TreeValue::Int(1)));
        let b = arena.leaf(CONST32, Some(TreeValue::Int(2)));
        let add = arena.add(ADD32, vec![a, b], None);

        let mut frame = Frame::new("f");
        let mut ctx = InstructionContext::new(&mut frame);
        selector.gen(&mut ctx, &arena, add).unwrap();

        // The fused rule emitted exactly one instruction and consumed the
        // constants without materializing them.
        assert_eq!(frame.instrs.len(), 1);
        assert!(matches!(frame.instrs[0], MachInst::LoadImm { value: -1, .. }));
    }
}
