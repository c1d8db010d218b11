//! Scope information carried alongside a statement under construction
//! or mutation: which variables are visible, whether we are inside a
//! loop, what the containing function returns, and which goto labels
//! exist. None of this is stored in the tree itself, so the mutator
//! rebuilds it while walking.

use crate::ast::Statement;
use crate::idents::NameId;
use crate::program::{Function, Program, Variable};
use crate::types::TypeRef;

#[derive(Debug, Clone)]
pub(crate) struct StatementContext {
  /// Visible variables, in declaration order. Kept as a vector so
  /// that "first convertible variable" draws are deterministic.
  pub(crate) vars: Vec<Variable>,
  /// Whether the current position is inside a loop body.
  pub(crate) in_loop: bool,
  /// The containing function's return type.
  pub(crate) return_type: TypeRef,
  /// Goto labels available in the containing function.
  pub(crate) labels: Vec<NameId>,
}

impl StatementContext {
  /// The context of a global initializer: nothing is visible.
  pub(crate) fn global() -> Self {
    StatementContext {
      vars: Vec::new(), in_loop: false, return_type: TypeRef::VOID, labels: Vec::new(),
    }
  }

  /// Rebuilds the context at the top of a function body.
  ///
  /// For `main`, only the first parameter (`argc`) is made visible;
  /// `argv` has run-dependent contents that would make findings
  /// unstable.
  pub(crate) fn for_function(p: &Program, f: &Function) -> Self {
    let mut cx = StatementContext::global();
    cx.return_type = f.ret;
    for (i, &v) in f.params.iter().enumerate() {
      cx.vars.push(v);
      if p.is_main(f) && i == 0 { break }
    }
    if let Statement::GotoLabel(l) = f.body { cx.labels.push(l) }
    f.body.for_each_child(&mut |c| {
      if let Statement::GotoLabel(l) = c { cx.labels.push(*l) }
    });
    cx
  }

  /// Makes a variable visible.
  pub(crate) fn add_var(&mut self, v: Variable) {
    if let Some(slot) = self.vars.iter_mut().find(|x| x.name == v.name) {
      *slot = v;
    } else {
      self.vars.push(v);
    }
  }

  /// Extends the context with whatever the statement introduces.
  pub(crate) fn expand_with_stmt(&mut self, s: &Statement) {
    if matches!(s, Statement::VarDecl { .. } | Statement::VarDef { .. }) {
      if let Some(v) = s.declared_var() { self.add_var(v) }
    }
  }

  /// The first visible variable whose type converts to `t`, if any.
  pub(crate) fn first_convertible(&self, p: &Program, t: TypeRef) -> Option<Variable> {
    self.vars.iter().copied().find(|v| crate::ast::type_converts(p.types(), v.ty, t))
  }
}
