//! Code-moving mutations: outlining a statement into a fresh function
//! and inlining a called function's body. The reducer can use both to
//! move a misbehaving construct across an inlining boundary.

use crate::ast::{Statement, StmtKind};
use crate::program::{Decl, Function};
use crate::types::TypeRef;

use super::{Modified, MutatorData};

/// Whether the subtree is self-contained enough to move into another
/// function: no references to enclosing locals and no control
/// transfers that would change meaning across the call boundary.
fn is_outlineable(s: &Statement) -> bool {
  let contained = |c: &Statement| !matches!(c.kind(),
    StmtKind::LocalRef | StmtKind::Goto | StmtKind::GotoLabel
    | StmtKind::Break | StmtKind::Return | StmtKind::VoidReturn);
  contained(s) && s.for_all_children(&mut |c| contained(c))
}

/// Replaces a self-contained statement with a call to a fresh
/// zero-argument function holding it.
pub(crate) fn outline_statement(cx: &mut MutatorData<'_>, s: &mut Statement) -> Modified {
  if !is_outlineable(s) { return Modified::No }
  let is_expr = s.is_expr();
  if is_expr && s.kind() == StmtKind::ConstantArray { return Modified::No }
  let ret = s.eval_type();
  if cx.p.types().is_array(ret) { return Modified::No }

  let name = cx.new_id("outlined");
  let mut f = Function::new(ret, name, Vec::new());
  let moved = std::mem::replace(s, Statement::Empty);
  f.body = Statement::Compound(vec![match (is_expr, ret == TypeRef::VOID) {
    (true, false) => Statement::Return(Box::new(moved)),
    (true, true) => Statement::StmtExpr(Box::new(moved)),
    (false, _) => moved,
  }]);
  cx.p.add(Decl::Function(f));

  let call = Statement::Call { ty: ret, func: name, args: Vec::new() };
  *s = if is_expr { call } else { Statement::StmtExpr(Box::new(call)) };
  Modified::Yes
}

/// Replaces a statement-position call to a defined function with a
/// clone of the callee's body. Callees that read their parameters are
/// skipped; everything else is capture-free because identifiers are
/// unique program-wide.
pub(crate) fn inline_call(cx: &mut MutatorData<'_>, s: &mut Statement) -> Modified {
  let Statement::StmtExpr(inner) = s else { return Modified::No };
  let Statement::Call { func, .. } = **inner else { return Modified::No };
  let Some(f) = cx.p.find_function(func) else { return Modified::No };
  if f.is_external() { return Modified::No }
  if f.params.iter().any(|v| f.body.uses_id(v.name)) { return Modified::No }
  *s = f.body.clone();
  Modified::Yes
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::program::Program;
  use crate::rng::RngSource;
  use crate::strategy::{Strategy, StrategyInstance};
  use crate::LangOpts;

  fn with_data(f: impl FnOnce(&mut MutatorData<'_>)) {
    let mut p = Program::new(LangOpts::default());
    let mut data = MutatorData {
      p: &mut p,
      strat: StrategyInstance::new(Strategy::new("test"), RngSource::from_seed(1)),
      rng: RngSource::from_seed(2),
      stmt_stack: Vec::new(),
    };
    f(&mut data);
  }

  #[test]
  fn outlines_self_contained_statement() {
    with_data(|cx| {
      let int = cx.p.builtin().signed_int;
      let mut s = Statement::StmtExpr(Box::new(Statement::Constant {
        text: "7".into(), ty: int,
      }));
      assert_eq!(outline_statement(cx, &mut s), Modified::Yes);
      let Statement::StmtExpr(call) = &s else { panic!("expected call statement") };
      let Statement::Call { func, .. } = **call else { panic!("expected call") };
      let f = cx.p.find_function(func).expect("outlined function exists");
      assert_eq!(f.ret, TypeRef::VOID);
      assert!(cx.p.verify_self().is_ok());
    });
  }

  #[test]
  fn refuses_to_outline_local_references() {
    with_data(|cx| {
      let int = cx.p.builtin().signed_int;
      let v = crate::program::Variable { ty: int, name: cx.new_id("v") };
      let mut s = Statement::StmtExpr(Box::new(Statement::LocalRef(v)));
      assert_eq!(outline_statement(cx, &mut s), Modified::No);
    });
  }

  #[test]
  fn inlines_parameterless_callee() {
    with_data(|cx| {
      let int = cx.p.builtin().signed_int;
      let name = cx.new_id("callee");
      let mut f = Function::new(int, name, Vec::new());
      f.body = Statement::Compound(vec![Statement::VoidReturn]);
      cx.p.add(Decl::Function(f));
      let mut s = Statement::StmtExpr(Box::new(Statement::Call {
        ty: int, func: name, args: Vec::new(),
      }));
      assert_eq!(inline_call(cx, &mut s), Modified::Yes);
      assert_eq!(s, Statement::Compound(vec![Statement::VoidReturn]));
    });
  }
}
