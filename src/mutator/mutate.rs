//! The statement mutator: rewrites a random subtree of an existing
//! function body, plus the attribute-level function mutations.

use if_chain::if_chain;

use crate::ast::{Statement, StmtKind, StmtPath};
use crate::program::{CallConv, FuncAttr, Function, Weight};
use crate::strategy::Frag;

use super::context::StatementContext;
use super::create::StatementCreator;
use super::simplify::Simplifier;
use super::{Modified, MutatorData, moving};

/// Randomizes the attribute-level data of a function: calling
/// convention, attribute list, or branch-weight hint.
pub(crate) fn randomize_func_attrs(cx: &mut MutatorData<'_>, f: &mut Function) -> Modified {
  if cx.decision(Frag::UseNonStdCallingConv) {
    f.conv = Some(*cx.rng.pick(CallConv::ALL));
    return Modified::Yes;
  }
  if cx.decision(Frag::UseFunctionAttr) {
    f.attrs.push(random_func_attr(cx));
    return Modified::Yes;
  }
  if cx.decision(Frag::UseSecondFunctionAttr) {
    f.attrs.push(random_func_attr(cx));
    return Modified::Yes;
  }
  if cx.decision(Frag::DeleteFuncAttrs) {
    if f.attrs.is_empty() { return Modified::No }
    let i = cx.rng.pick_index(f.attrs.len());
    f.attrs.remove(i);
    return Modified::Yes;
  }
  let weight = *cx.rng.pick(&[Weight::None, Weight::Hot, Weight::Cold]);
  if f.weight == weight { return Modified::No }
  f.weight = weight;
  Modified::Yes
}

fn random_func_attr(cx: &mut MutatorData<'_>) -> FuncAttr {
  match cx.rng.below(12) {
    0 => FuncAttr::AllocSize(cx.rng.below(4)),
    1 => FuncAttr::AllocSize2(cx.rng.below(4), cx.rng.below(4)),
    2 => FuncAttr::AlwaysInline,
    // Alignment payloads must be powers of two to be well-formed.
    3 => FuncAttr::AssumeAligned(1 << cx.rng.below(4)),
    4 => FuncAttr::Const,
    5 => FuncAttr::DisableTailCalls,
    6 => FuncAttr::Flatten,
    7 => FuncAttr::Malloc,
    8 => FuncAttr::NoBuiltin,
    9 => FuncAttr::NoInline,
    10 => FuncAttr::Pure,
    _ => FuncAttr::NoCallerSavedRegisters(*cx.rng.pick(CallConv::ALL)),
  }
}

/// Makes an expression usable in statement position.
fn ensure_stmt(c: Statement) -> Statement {
  if c.is_expr() { Statement::StmtExpr(Box::new(c)) } else { c }
}

pub(crate) struct StatementMutator {
  simplifier: Simplifier,
  pub(crate) sc: StatementCreator,
}

impl StatementMutator {
  pub(crate) fn new() -> Self {
    StatementMutator { simplifier: Simplifier::new(), sc: StatementCreator::new() }
  }

  /// Whether the child at `path` may be modified directly.
  ///
  /// Catch clauses only go away with their `try`; labels some `goto`
  /// still targets stay; array constants have placement rules of their
  /// own and are never touched directly.
  fn can_mutate(body: &Statement, path: &StmtPath) -> bool {
    let s = body.at_path(path);
    let parent_kind = if path.len() == 1 {
      body.kind()
    } else {
      body.at_path(&path[..path.len() - 1]).kind()
    };
    if parent_kind == StmtKind::Try
      && matches!(s.kind(), StmtKind::Catch | StmtKind::CatchAll) {
      return false;
    }
    if let Statement::GotoLabel(label) = *s {
      let mut target_used = false;
      if let Statement::Goto(l) = *body { target_used |= l == label }
      body.for_each_child(&mut |c| {
        if let Statement::Goto(l) = c { target_used |= *l == label }
      });
      if target_used { return false }
    }
    s.kind() != StmtKind::ConstantArray
  }

  /// Inserts a fresh statement at a random position of a compound.
  fn mutate_compound(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      s: &mut Statement) -> bool {
    let Statement::Compound(old) = s else { return false };
    let mut ctx = ctx.clone();
    if old.is_empty() {
      let fresh = self.sc.make_stmt(cx, &mut ctx, false);
      *s = Statement::Compound(vec![fresh]);
      return true;
    }
    let insert_after = cx.rng.pick_index(old.len());
    let old = std::mem::take(old);
    let mut children = Vec::with_capacity(old.len() + 1);
    for (i, c) in old.into_iter().enumerate() {
      ctx.expand_with_stmt(&c);
      children.push(c);
      if i == insert_after {
        children.push(self.sc.make_stmt(cx, &mut ctx, false));
      }
    }
    *s = Statement::Compound(children);
    true
  }

  /// Replaces the statement with a block of its direct children.
  fn promote_children(&self, s: &mut Statement) -> bool {
    let new_children: Vec<Statement> = s.children().iter().filter_map(|c| {
      match c.kind() {
        // A catch clause cannot stand alone; its body can.
        StmtKind::Catch | StmtKind::CatchAll =>
          c.children().first().map(|b| (*b).clone()),
        StmtKind::ConstantArray => None,
        _ => Some(ensure_stmt((*c).clone())),
      }
    }).collect();
    *s = Statement::Compound(new_children);
    true
  }

  /// Replaces the statement with one of its children.
  fn promote_child(&self, cx: &mut MutatorData<'_>, s: &mut Statement) -> bool {
    let children = s.children();
    if children.is_empty() { return false }
    let child = (*cx.rng.pick(&children)).clone();
    drop(children);
    if matches!(child.kind(), StmtKind::Catch | StmtKind::CatchAll | StmtKind::ConstantArray) {
      return false;
    }
    *s = ensure_stmt(child);
    true
  }

  /// Surrounds the statement with two random neighbors.
  fn wrap_in_compound(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      s: &mut Statement) -> bool {
    let mut ctx = ctx.clone();
    let before = self.sc.make_stmt(cx, &mut ctx, false);
    let old = std::mem::replace(s, Statement::Empty);
    let after = self.sc.make_stmt(cx, &mut ctx, false);
    *s = Statement::Compound(vec![before, old, after]);
    true
  }

  /// Randomly mutates the given statement in place.
  fn mutate_statement(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      can_mutate: bool, var_used: bool, s: &mut Statement) -> Modified {
    if !can_mutate { return Modified::No }

    if cx.decision(Frag::MutateCompound) && self.mutate_compound(cx, ctx, s) {
      return Modified::Yes;
    }

    if s.is_stmt() {
      if matches!(s.kind(), StmtKind::VarDecl | StmtKind::VarDef) {
        // Swap a definition with a declaration (or back).
        if_chain! {
          if let Some(v) = s.declared_var();
          if !cx.p.types().expects_var_initializer(v.ty);
          if cx.decision(Frag::SwapDefAndDecl);
          then {
            if s.kind() == StmtKind::VarDecl {
              let init = self.sc.make_expr(cx, ctx, v.ty);
              *s = Statement::VarDef { ty: v.ty, name: v.name, init: Box::new(init) };
            } else {
              *s = Statement::VarDecl { ty: v.ty, name: v.name };
            }
            return Modified::Yes;
          }
        }
        // A referenced variable must keep its declaration; anything
        // below this point might delete it.
        if var_used { return Modified::No }
      }

      if cx.decision(Frag::PromoteChild) && self.promote_child(cx, s) {
        return Modified::Yes;
      }
      if cx.decision(Frag::PromoteChildren) && self.promote_children(s) {
        return Modified::Yes;
      }
      if cx.decision(Frag::WrapInCompound) && self.wrap_in_compound(cx, ctx, s) {
        return Modified::Yes;
      }
      if cx.decision(Frag::OutlineStatement)
        && moving::outline_statement(cx, s) == Modified::Yes {
        return Modified::Yes;
      }
      if cx.decision(Frag::InlineCall) && moving::inline_call(cx, s) == Modified::Yes {
        return Modified::Yes;
      }

      // Regenerate, but keep the old statement around for recycling.
      let mut ctx = ctx.clone();
      let old = std::mem::replace(s, Statement::Empty);
      cx.stmt_stack.push(old);
      *s = self.sc.make_stmt(cx, &mut ctx, false);
      return Modified::Yes;
    }

    // Regenerate an expression of the same evaluation type.
    debug_assert!(cx.p.types().is_valid(s.eval_type()), "expression with dead type");
    *s = self.sc.make_expr(cx, ctx, s.eval_type());
    Modified::Yes
  }

  /// Rebuilds the scope context that holds at `path` inside `root`.
  fn rebuild_context_for(ctx: &StatementContext, root: &Statement, path: &StmtPath)
      -> StatementContext {
    let mut ctx = ctx.clone();
    let mut node = root;
    for &i in path {
      match node {
        Statement::While { .. } if i == 1 => ctx.in_loop = true,
        Statement::Catch { ty, name, .. } => {
          ctx.add_var(crate::program::Variable { ty: *ty, name: *name });
        }
        Statement::Compound(children) => {
          for c in &children[..i as usize] {
            ctx.expand_with_stmt(c);
          }
        }
        _ => {}
      }
      node = node.children()[i as usize];
    }
    ctx
  }

  /// Mutates a random child of the given body.
  fn mutate_random_child(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      body: &mut Statement) -> Modified {
    // Give mutation something to select in an empty body. The empty
    // statement changes no semantics, so reporting a modification
    // afterwards stays honest.
    if let Statement::Compound(cs) = body {
      if cs.is_empty() { cs.push(Statement::Empty) }
    }

    if self.simplifier.simplify_compound(cx, body) { return Modified::Yes }

    let paths = body.node_paths();
    if paths.is_empty() { return Modified::No }
    let mut path = cx.rng.pick(&paths).clone();

    // Optionally re-roll expression picks towards statement slots.
    while body.at_path(&path).is_expr() {
      if !cx.decision(Frag::PreferModifyingStmtsOverExprs) { break }
      path = cx.rng.pick(&paths).clone();
    }

    let can_mutate = Self::can_mutate(body, &path);
    let var_used = body.at_path(&path).declared_var().is_some_and(|v| {
      let parent = if path.len() > 1 { body.at_path(&path[..path.len() - 1]) } else { &*body };
      parent.references_var(v.name)
    });

    let ctx = Self::rebuild_context_for(ctx, body, &path);

    if cx.decision(Frag::SimplifyStmt) {
      let simplified = self.simplifier.simplify_stmt(cx, can_mutate, body.at_path_mut(&path));
      return if simplified { Modified::Yes } else { Modified::No };
    }
    if cx.decision(Frag::MutateFoundStatement) {
      return self.mutate_statement(cx, &ctx, can_mutate, var_used, body.at_path_mut(&path));
    }
    Modified::No
  }

  /// Mutates the body of a function (already detached from the
  /// program). Artifacts are cleaned up by the canonicalizer.
  pub(crate) fn mutate_function_body(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      body: &mut Statement) -> Modified {
    if cx.decision(Frag::RegenerateFunctionBody) {
      *body = self.sc.make_compound(cx, ctx.clone());
    }
    if self.mutate_random_child(cx, ctx, body) == Modified::No {
      return Modified::No;
    }
    if let Some(canonical) = super::canon::canonicalize(body) {
      *body = canonical;
    }
    Modified::Yes
  }
}
