//! The rule table of the bottom-up rewrite system.
//!
//! Rules pair a goal non-terminal with a tree pattern, a cost, an
//! optional acceptance predicate and an emission template. A rule whose
//! pattern is a bare non-terminal is a *chain rule*, converting between
//! goals (e.g. `stm <- reg` at cost 0). The table is built once per
//! target and is read-only afterwards; templates are plain function
//! pointers, so a built system is `Send + Sync`.

use std::collections::{HashMap, HashSet};

use crate::error::SelectError;
use crate::frame::{InstructionContext, VReg};
use crate::tree::{Terminal, TreeArena, TreeRef};

/// Interned non-terminal identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtId(pub u16);

/// Rule identity within a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub u32);

/// A tree pattern: a terminal with sub-patterns, or an open non-terminal
/// leaf to be satisfied by the kid's own reduction.
#[derive(Debug, Clone)]
pub enum Pattern {
    Term { term: Terminal, kids: Vec<Pattern> },
    NonTerm(NtId),
}

impl Pattern {
    pub fn term(term: Terminal, kids: Vec<Pattern>) -> Self {
        Pattern::Term { term, kids }
    }

    pub fn leaf(term: Terminal) -> Self {
        Pattern::Term {
            term,
            kids: Vec::new(),
        }
    }

    pub fn nt(id: NtId) -> Self {
        Pattern::NonTerm(id)
    }
}

/// Extra per-tree condition a rule may impose beyond terminal shape.
pub type AcceptFn = fn(&TreeArena, TreeRef) -> bool;

/// Emission callback: receives the context, the matched subtree and the
/// per-kid results; returns the produced register, or `None` for
/// statement-typed rules.
pub type TemplateFn =
    fn(&mut InstructionContext<'_>, &TreeArena, TreeRef, &[Option<VReg>]) -> Option<VReg>;

/// One rewrite rule.
pub struct Rule {
    pub non_term: NtId,
    pub pattern: Pattern,
    pub cost: u32,
    pub acceptance: Option<AcceptFn>,
    pub template: TemplateFn,
}

/// The rule table, indexed by root terminal and by chain-rule source.
pub struct BursSystem {
    nt_names: Vec<String>,
    nt_ids: HashMap<String, NtId>,
    terminals: HashSet<Terminal>,
    rules: Vec<Rule>,
    by_root: HashMap<Terminal, Vec<RuleId>>,
    chain_by_nt: HashMap<NtId, Vec<RuleId>>,
}

impl Default for BursSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl BursSystem {
    pub fn new() -> Self {
        BursSystem {
            nt_names: Vec::new(),
            nt_ids: HashMap::new(),
            terminals: HashSet::new(),
            rules: Vec::new(),
            by_root: HashMap::new(),
            chain_by_nt: HashMap::new(),
        }
    }

    /// Interns a non-terminal name.
    pub fn non_term(&mut self, name: &str) -> NtId {
        if let Some(&id) = self.nt_ids.get(name) {
            return id;
        }
        let id = NtId(self.nt_names.len() as u16);
        self.nt_names.push(name.to_string());
        self.nt_ids.insert(name.to_string(), id);
        id
    }

    /// Looks up an already-interned non-terminal.
    pub fn find_non_term(&self, name: &str) -> Option<NtId> {
        self.nt_ids.get(name).copied()
    }

    pub fn nt_name(&self, id: NtId) -> &str {
        &self.nt_names[id.0 as usize]
    }

    pub fn add_terminal(&mut self, terminal: Terminal) {
        self.terminals.insert(terminal);
    }

    /// Adds a rule. Rules whose pattern is a bare non-terminal are
    /// registered as chain rules.
    pub fn add_rule(
        &mut self,
        non_term: NtId,
        pattern: Pattern,
        cost: u32,
        acceptance: Option<AcceptFn>,
        template: TemplateFn,
    ) -> RuleId {
        let id = RuleId(self.rules.len() as u32);
        match &pattern {
            Pattern::NonTerm(source) => {
                self.chain_by_nt.entry(*source).or_default().push(id);
            }
            Pattern::Term { term, .. } => {
                self.by_root.entry(*term).or_default().push(id);
            }
        }
        self.rules.push(Rule {
            non_term,
            pattern,
            cost,
            acceptance,
            template,
        });
        id
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id.0 as usize]
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Rules whose pattern root is the given terminal.
    pub fn rules_for_root(&self, terminal: Terminal) -> &[RuleId] {
        self.by_root
            .get(&terminal)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Chain rules converting *from* the given non-terminal.
    pub fn chain_rules_for_nt(&self, source: NtId) -> &[RuleId] {
        self.chain_by_nt
            .get(&source)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    // -- structural queries ----------------------------------------------

    /// Whether the subject tree has the same terminal shape as the
    /// pattern. Non-terminal leaves match any subtree.
    pub fn pattern_matches(&self, arena: &TreeArena, subject: TreeRef, pattern: &Pattern) -> bool {
        match pattern {
            Pattern::NonTerm(_) => true,
            Pattern::Term { term, kids } => {
                let node = arena.node(subject);
                if node.term != *term || node.kids.len() != kids.len() {
                    return false;
                }
                node.kids
                    .iter()
                    .zip(kids)
                    .all(|(&k, p)| self.pattern_matches(arena, k, p))
            }
        }
    }

    /// The subtrees of `subject` standing where the pattern has open
    /// non-terminal leaves, in pattern order.
    pub fn kids_of(&self, arena: &TreeArena, subject: TreeRef, pattern: &Pattern) -> Vec<TreeRef> {
        let mut out = Vec::new();
        self.collect_kids(arena, subject, pattern, &mut out);
        out
    }

    fn collect_kids(
        &self,
        arena: &TreeArena,
        subject: TreeRef,
        pattern: &Pattern,
        out: &mut Vec<TreeRef>,
    ) {
        match pattern {
            Pattern::NonTerm(_) => out.push(subject),
            Pattern::Term { kids, .. } => {
                for (&k, p) in arena.node(subject).kids.iter().zip(kids) {
                    self.collect_kids(arena, k, p, out);
                }
            }
        }
    }

    /// The goal non-terminals of the pattern's open leaves, in order.
    pub fn pattern_nts(&self, pattern: &Pattern) -> Vec<NtId> {
        let mut out = Vec::new();
        collect_nts(pattern, &mut out);
        out
    }

    // -- validation -------------------------------------------------------

    /// Table sanity: every referenced non-terminal has a producing rule,
    /// every terminal in a pattern is declared, and pattern arities match
    /// the terminals.
    pub fn check(&self) -> Result<(), SelectError> {
        let mut produced: HashSet<NtId> = HashSet::new();
        for rule in &self.rules {
            produced.insert(rule.non_term);
        }
        for rule in &self.rules {
            self.check_pattern(&rule.pattern, &produced)?;
        }
        Ok(())
    }

    fn check_pattern(
        &self,
        pattern: &Pattern,
        produced: &HashSet<NtId>,
    ) -> Result<(), SelectError> {
        match pattern {
            Pattern::NonTerm(id) => {
                if !produced.contains(id) {
                    return Err(SelectError::MissingProducer {
                        non_term: self.nt_name(*id).to_string(),
                    });
                }
                Ok(())
            }
            Pattern::Term { term, kids } => {
                if !self.terminals.contains(term) {
                    return Err(SelectError::UndeclaredTerminal {
                        terminal: term.to_string(),
                    });
                }
                if kids.len() != term.arity() {
                    return Err(SelectError::BadArity {
                        terminal: term.to_string(),
                        expected: term.arity(),
                        given: kids.len(),
                    });
                }
                for kid in kids {
                    self.check_pattern(kid, produced)?;
                }
                Ok(())
            }
        }
    }

    /// Subject tree sanity before labeling: declared terminals, correct
    /// kid counts.
    pub fn check_tree_defined(&self, arena: &TreeArena, tree: TreeRef) -> Result<(), SelectError> {
        let node = arena.node(tree);
        if !self.terminals.contains(&node.term) {
            return Err(SelectError::UndeclaredTerminal {
                terminal: node.term.to_string(),
            });
        }
        if node.kids.len() != node.term.arity() {
            return Err(SelectError::BadArity {
                terminal: node.term.to_string(),
                expected: node.term.arity(),
                given: node.kids.len(),
            });
        }
        for &kid in &node.kids {
            self.check_tree_defined(arena, kid)?;
        }
        Ok(())
    }
}

fn collect_nts(pattern: &Pattern, out: &mut Vec<NtId>) {
    match pattern {
        Pattern::NonTerm(id) => out.push(*id),
        Pattern::Term { kids, .. } => {
            for kid in kids {
                collect_nts(kid, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Bits, TermOp, TreeValue};

    fn nop_template(
        _ctx: &mut InstructionContext<'_>,
        _arena: &TreeArena,
        _tree: TreeRef,
        _kids: &[Option<VReg>],
    ) -> Option<VReg> {
        None
    }

    const ADD32: Terminal = Terminal::Op(TermOp::Add, Bits::B32);
    const CONST32: Terminal = Terminal::Op(TermOp::Const, Bits::B32);

    fn sample_system() -> BursSystem {
        let mut sys = BursSystem::new();
        let stm = sys.non_term("stm");
        let reg = sys.non_term("reg");
        sys.add_terminal(ADD32);
        sys.add_terminal(CONST32);
        sys.add_rule(reg, Pattern::leaf(CONST32), 1, None, nop_template);
        sys.add_rule(
            reg,
            Pattern::term(ADD32, vec![Pattern::nt(reg), Pattern::nt(reg)]),
            2,
            None,
            nop_template,
        );
        sys.add_rule(stm, Pattern::nt(reg), 0, None, nop_template);
        sys
    }

    #[test]
    fn non_terminals_intern_once() {
        let mut sys = BursSystem::new();
        let a = sys.non_term("reg");
        let b = sys.non_term("reg");
        assert_eq!(a, b);
        assert_eq!(sys.nt_name(a), "reg");
    }

    #[test]
    fn chain_rules_index_by_source() {
        let sys = sample_system();
        let reg = sys.find_non_term("reg").unwrap();
        let stm = sys.find_non_term("stm").unwrap();

        let chains = sys.chain_rules_for_nt(reg);
        assert_eq!(chains.len(), 1);
        assert_eq!(sys.rule(chains[0]).non_term, stm);
        assert!(sys.chain_rules_for_nt(stm).is_empty());
    }

    #[test]
    fn rules_index_by_root_terminal() {
        let sys = sample_system();
        assert_eq!(sys.rules_for_root(ADD32).len(), 1);
        assert_eq!(sys.rules_for_root(CONST32).len(), 1);
        assert!(sys
            .rules_for_root(Terminal::Op(TermOp::Mul, Bits::B32))
            .is_empty());
    }

    #[test]
    fn check_accepts_sane_table() {
        assert_eq!(sample_system().check(), Ok(()));
    }

    #[test]
    fn check_rejects_undeclared_terminal() {
        let mut sys = BursSystem::new();
        let reg = sys.non_term("reg");
        sys.add_rule(reg, Pattern::leaf(CONST32), 1, None, nop_template);
        assert!(matches!(
            sys.check(),
            Err(SelectError::UndeclaredTerminal { .. })
        ));
    }

    #[test]
    fn check_rejects_unproduced_non_terminal() {
        let mut sys = BursSystem::new();
        let reg = sys.non_term("reg");
        let ghost = sys.non_term("ghost");
        sys.add_terminal(ADD32);
        sys.add_rule(
            reg,
            Pattern::term(ADD32, vec![Pattern::nt(ghost), Pattern::nt(reg)]),
            1,
            None,
            nop_template,
        );
        assert!(matches!(
            sys.check(),
            Err(SelectError::MissingProducer { .. })
        ));
    }

    #[test]
    fn check_rejects_wrong_arity_pattern() {
        let mut sys = BursSystem::new();
        let reg = sys.non_term("reg");
        sys.add_terminal(ADD32);
        sys.add_rule(
            reg,
            Pattern::term(ADD32, vec![Pattern::nt(reg)]),
            1,
            None,
            nop_template,
        );
        assert!(matches!(sys.check(), Err(SelectError::BadArity { .. })));
    }

    #[test]
    fn kids_and_nts_walk_in_lockstep() {
        let sys = sample_system();
        let reg = sys.find_non_term("reg").unwrap();

        let mut arena = TreeArena::new();
        let a = arena.leaf(CONST32, Some(TreeValue::Int(1)));
        let b = arena.leaf(CONST32, Some(TreeValue::Int(2)));
        let add = arena.add(ADD32, vec![a, b], None);

        let pattern = Pattern::term(ADD32, vec![Pattern::nt(reg), Pattern::nt(reg)]);
        assert!(sys.pattern_matches(&arena, add, &pattern));
        assert_eq!(sys.kids_of(&arena, add, &pattern), vec![a, b]);
        assert_eq!(sys.pattern_nts(&pattern), vec![reg, reg]);

        // A deeper pattern matches through the structure.
        let deep = Pattern::term(
            ADD32,
            vec![Pattern::leaf(CONST32), Pattern::nt(reg)],
        );
        assert!(sys.pattern_matches(&arena, add, &deep));
        assert_eq!(sys.kids_of(&arena, add, &deep), vec![b]);
    }

    #[test]
    fn check_tree_defined_validates_subjects() {
        let sys = sample_system();
        let mut arena = TreeArena::new();
        let ok = arena.leaf(CONST32, Some(TreeValue::Int(1)));
        assert_eq!(sys.check_tree_defined(&arena, ok), Ok(()));

        let bad = arena.leaf(Terminal::Op(TermOp::Rem, Bits::B16), None);
        assert!(matches!(
            sys.check_tree_defined(&arena, bad),
            Err(SelectError::UndeclaredTerminal { .. })
        ));
    }
}
