//! The simplifier: semantics-altering shrinking used by the reducer.
//! Every rewrite here is expected to produce less code.

use crate::ast::{Statement, StmtKind};
use crate::strategy::Frag;
use crate::types::TypeRef;

use super::MutatorData;
use super::literals::LiteralMaker;

pub(crate) struct Simplifier {
  lits: LiteralMaker,
}

impl Simplifier {
  pub(crate) fn new() -> Self {
    Simplifier { lits: LiteralMaker::new() }
  }

  /// Shrinks the statement in place. `can_mutate` is the caller's
  /// placement check (catch clauses, referenced labels, array
  /// constants stay untouched). Returns whether code was simplified.
  pub(crate) fn simplify_stmt(&self, cx: &mut MutatorData<'_>, can_mutate: bool,
      s: &mut Statement) -> bool {
    if !can_mutate { return false }
    if s.kind() == StmtKind::Compound && cx.decision(Frag::EmptyCompound) {
      *s = Statement::Compound(Vec::new());
      return true;
    }

    if self.simplify_compound(cx, s) { return true }

    if s.eval_type() == TypeRef::VOID {
      if s.kind() == StmtKind::Empty { return false }
      *s = Statement::Empty;
      return true;
    }
    *s = self.lits.make_constant(cx, s.eval_type());
    true
  }

  /// Compound-specific shrinking: drop empty children, or delete a
  /// random subset of children outright.
  pub(crate) fn simplify_compound(&self, cx: &mut MutatorData<'_>, s: &mut Statement) -> bool {
    let Statement::Compound(children) = s else { return false };

    if cx.decision(Frag::CleanupCompound) {
      let clean: Vec<Statement> = children.iter()
        .filter(|c| c.kind() != StmtKind::Empty)
        .cloned()
        .collect();
      if clean.len() == children.len() { return false }
      *s = Statement::Compound(clean);
      return true;
    }

    if !cx.decision(Frag::DeleteCompoundStmts) { return false }

    let mut clean: Vec<Statement> = Vec::new();
    for (i, c) in children.iter().enumerate() {
      // Declarations that later siblings still reference must stay.
      let needed = c.declared_var().is_some_and(|v|
        children[i + 1..].iter().any(|sib| sib.uses_id(v.name)));
      if needed || !cx.decision(Frag::DeleteStmtInCompound) {
        clean.push(c.clone());
      }
    }
    if clean.is_empty() { clean.push(Statement::Empty) }
    if clean.len() == children.len() { return false }
    *s = Statement::Compound(clean);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::super::MutatorData;
  use super::*;
  use crate::program::Program;
  use crate::rng::RngSource;
  use crate::strategy::{Strategy, StrategyInstance};
  use crate::{LangOpts, TypeRef};

  fn with_data(f: impl FnOnce(&mut MutatorData<'_>)) {
    let mut p = Program::new(LangOpts::default());
    let mut strat = Strategy::new("test");
    strat.set(Frag::CleanupCompound, 1.0);
    let mut data = MutatorData {
      p: &mut p,
      strat: StrategyInstance::new(strat, RngSource::from_seed(1)),
      rng: RngSource::from_seed(2),
      stmt_stack: Vec::new(),
    };
    f(&mut data);
  }

  #[test]
  fn cleanup_drops_empty_children() {
    with_data(|cx| {
      let simp = Simplifier::new();
      let mut s = Statement::Compound(vec![Statement::Empty, Statement::Break]);
      assert!(simp.simplify_compound(cx, &mut s));
      assert_eq!(s, Statement::Compound(vec![Statement::Break]));
      // Already clean: no further simplification reported.
      assert!(!simp.simplify_compound(cx, &mut s));
    });
  }

  #[test]
  fn void_statement_becomes_empty() {
    with_data(|cx| {
      let simp = Simplifier::new();
      let mut s = Statement::Break;
      assert!(simp.simplify_stmt(cx, true, &mut s));
      assert_eq!(s, Statement::Empty);
      let mut guarded = Statement::Break;
      assert!(!simp.simplify_stmt(cx, false, &mut guarded));
      assert_eq!(guarded, Statement::Break);
    });
  }

  #[test]
  fn expression_becomes_constant() {
    with_data(|cx| {
      let int = cx.p.builtin().signed_int;
      let simp = Simplifier::new();
      let mut e = Statement::Deref {
        ty: int,
        ptr: Box::new(Statement::Constant { text: "0".into(), ty: TypeRef::VOID }),
      };
      assert!(simp.simplify_stmt(cx, true, &mut e));
      assert!(e.is_expr());
      assert_eq!(cx.p.types().strip_cv(e.eval_type()), int);
    });
  }
}
