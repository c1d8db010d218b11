//! The generator/mutator.
//!
//! A small collection of engines (statement creator, statement
//! mutator, type creator, literal maker, snippets, simplifier,
//! canonicalizer) cooperate over one shared [`MutatorData`] context:
//! the program being mutated, the bound strategy instance, the RNG and
//! the recycling stack. Engines are plain structs and the context is
//! passed explicitly; nothing here is a class hierarchy and nothing is
//! global.
//!
//! The public surface is [`generate`], [`mutate`], [`reduce`] and
//! [`generate_from_entropy`].

mod canon;
mod context;
mod create;
mod limits;
mod literals;
mod moving;
mod mutate;
mod simplify;
mod snippets;
mod type_creator;

use log::{debug, trace};

use crate::ast::{Statement, StmtKind};
use crate::builtins::BuiltinFunc;
use crate::idents::NameId;
use crate::program::{Decl, DeclHandle, Program, Variable};
use crate::rng::{EntropyVec, RngSource};
use crate::strategy::{Decision, Frag, Strategy, StrategyInstance};
use crate::types::{DerivedKind, TypeRef};
use crate::{LangOpts, Result};

use context::StatementContext;
use create::StatementCreator;
use literals::LiteralMaker;
use mutate::{StatementMutator, randomize_func_attrs};

/// Whether a mutation changed anything. `No` means "try another
/// step", never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modified {
  Yes,
  No,
}

/// The context shared by every mutation engine during one step.
pub(crate) struct MutatorData<'p> {
  pub(crate) p: &'p mut Program,
  pub(crate) strat: StrategyInstance,
  pub(crate) rng: RngSource,
  /// Statements displaced by mutations, available for recycling.
  pub(crate) stmt_stack: Vec<Statement>,
}

impl MutatorData<'_> {
  /// Draws the strategy's Bernoulli for a site.
  pub(crate) fn decision(&mut self, f: Frag) -> bool { self.strat.decision(f) }

  /// Interns a fresh identifier.
  pub(crate) fn new_id(&mut self, prefix: &str) -> NameId {
    self.p.idents_mut().make_new_id(prefix)
  }

  /// A call to a builtin library function with the given arguments.
  pub(crate) fn builtin_call(&mut self, kind: BuiltinFunc, args: Vec<Statement>) -> Statement {
    let func = self.p.builtin_func(kind);
    let ret = self.p.find_function(func).expect("builtin installed").ret;
    Statement::Call { ty: ret, func, args }
  }

  /// Puts an expression into statement position, preferring to assign
  /// it to a variable so the value is less likely to be optimized
  /// away unobserved.
  pub(crate) fn wrap_expr_in_stmt(&mut self, c: Statement) -> Statement {
    debug_assert!(c.is_expr(), "already a statement");
    if c.eval_type() != TypeRef::VOID && self.decision(Frag::AssignExprToVar) {
      let name = self.new_id("var");
      return Statement::VarDef { ty: c.eval_type(), name, init: Box::new(c) };
    }
    Statement::StmtExpr(Box::new(c))
  }
}

/// Characters used by the identifier-churn mutation.
const IDENT_CHARS: &str =
  "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_";

/// One mutation step's worth of engines.
struct GeneratorImpl {
  sm: StatementMutator,
  sc: StatementCreator,
}

impl GeneratorImpl {
  fn new() -> Self {
    GeneratorImpl { sm: StatementMutator::new(), sc: StatementCreator::new() }
  }

  fn is_main(p: &Program, h: DeclHandle) -> bool {
    match p.decl(h) {
      Decl::Function(f) => p.is_main(f),
      _ => false,
    }
  }

  fn could_be_safe_to_remove(p: &Program, h: DeclHandle) -> bool {
    match p.decl(h) {
      Decl::Global(g) => !p.is_id_used(g.var.name),
      Decl::Function(f) => !p.is_id_used(f.name),
      Decl::Record(_) => false,
    }
  }

  /// Invalidates one unreferenced non-builtin type.
  fn delete_type(&self, cx: &mut MutatorData<'_>) -> Modified {
    let reachable = cx.p.reachable_types();
    let candidates: Vec<TypeRef> = cx.p.types().iter_refs()
      .filter(|&t| !cx.p.types().is_builtin(t) && !reachable.contains(t.into_usize()))
      .collect();
    for t in candidates {
      if cx.decision(Frag::DeleteTypes) {
        cx.p.types_mut().invalidate(t);
        return Modified::Yes;
      }
    }
    Modified::No
  }

  /// In-place edit of a derived type: retarget an array base or redraw
  /// an array size.
  fn mutate_type(&self, cx: &mut MutatorData<'_>) -> Modified {
    let options: Vec<TypeRef> = cx.p.types().iter_refs()
      .filter(|&t| !cx.p.types().is_builtin(t))
      .filter(|&t| matches!(cx.p.types().get(t),
        crate::types::Type::Pointer(_) | crate::types::Type::Const(_)
        | crate::types::Type::Volatile(_) | crate::types::Type::Array { .. }))
      .collect();
    if options.is_empty() { return Modified::No }

    let other = *cx.rng.pick(&options);
    let t = *cx.rng.pick(&options);
    if matches!(cx.p.types().get(t), crate::types::Type::Array { .. }) {
      if other != t && cx.decision(Frag::MutateTypeBase)
        && cx.p.types_mut().set_array_base(t, other).is_ok() {
        return Modified::Yes;
      }
      if cx.decision(Frag::MutateTypeArraySize) {
        let size = 1 + cx.rng.below(16);
        if cx.p.types_mut().set_array_size(t, size).is_ok() {
          return Modified::Yes;
        }
      }
    }
    Modified::No
  }

  fn mutate_function(&self, cx: &mut MutatorData<'_>, h: DeclHandle) -> Modified {
    let Decl::Function(f) = cx.p.decl(h) else { return Modified::No };
    let mut f = f.clone();
    if f.is_external() {
      // Library prototypes keep their (empty) bodies; wrong attributes
      // on well-known functions are a finding class of their own.
      if cx.decision(Frag::MutateFuncAttrs) {
        let modified = randomize_func_attrs(cx, &mut f);
        *cx.p.decl_mut(h) = Decl::Function(f);
        return modified;
      }
      return Modified::No;
    }
    if cx.decision(Frag::MutateFuncAttrs) {
      let _ = randomize_func_attrs(cx, &mut f);
    }
    let ctx = StatementContext::for_function(cx.p, &f);
    self.sm.mutate_function_body(cx, &ctx, &mut f.body);
    *cx.p.decl_mut(h) = Decl::Function(f);
    Modified::Yes
  }

  fn mutate_global(&self, cx: &mut MutatorData<'_>, h: DeclHandle) -> Modified {
    let Decl::Global(g) = cx.p.decl(h) else { return Modified::No };
    let mut g = g.clone();
    if cx.decision(Frag::SwitchLinkageGlobalVar) {
      g.is_static = !g.is_static;
    } else if !cx.p.types().is_array(g.var.ty) {
      g.init = Some(self.sc.make_constant(cx, g.var.ty));
    }
    *cx.p.decl_mut(h) = Decl::Global(g);
    Modified::Yes
  }

  /// Low-probability identifier churn: nudge a random mutable name
  /// through single-character edits.
  fn change_identifier(&self, cx: &mut MutatorData<'_>) -> Modified {
    let Some(last) = cx.p.idents().last_id() else { return Modified::No };
    for _ in 0..100 {
      let id = NameId::from_usize(cx.rng.pick_index(last.into_usize() + 1));
      if !cx.p.idents().is_valid_id(id) || cx.p.idents().is_fixed(id) { continue }
      let before = cx.p.idents().name(id).to_owned();
      let mut n = before.clone();
      for _ in 0..cx.rng.below(10) + 1 {
        let orig = n.clone();
        let pos = cx.rng.pick_index(n.len());
        if cx.rng.flip_coin() && n.len() < 64 {
          n.insert(pos, cx.rng.pick_char(IDENT_CHARS));
        } else if n.len() > 1 {
          n.remove(pos);
        }
        if !cx.p.idents().is_valid_name(&n) {
          n = orig;
        }
      }
      if n == before || cx.p.idents().has_name(&n) { continue }
      if cx.p.idents_mut().try_change_id(id, &n).is_ok() {
        trace!("renamed identifier {before:?} to {n:?}");
        return Modified::Yes;
      }
    }
    Modified::No
  }

  fn mutate_step(&self, cx: &mut MutatorData<'_>) -> Modified {
    if cx.decision(Frag::ChangeIdentifier) {
      return self.change_identifier(cx);
    }

    let handles = cx.p.decl_handles();
    if handles.is_empty() { return Modified::No }
    let to_mod = *cx.rng.pick(&handles);

    if cx.decision(Frag::MutateOverDelete) || Self::is_main(cx.p, to_mod) {
      return match cx.p.decl(to_mod) {
        Decl::Function(_) => {
          if !cx.decision(Frag::MutateFunction) { return Modified::No }
          self.mutate_function(cx, to_mod)
        }
        Decl::Global(_) => {
          if !cx.decision(Frag::MutateGlobal) { return Modified::No }
          self.mutate_global(cx, to_mod)
        }
        Decl::Record(_) => Modified::No,
      };
    }

    if cx.decision(Frag::ReorderOverDelete) {
      let original = *cx.rng.pick(&handles);
      let decl = cx.p.remove_decl(original);
      let bucket = cx.rng.pick_index(cx.p.storages().len());
      let len = cx.p.storages()[bucket].len();
      let pos = if len == 0 { 0 } else { cx.rng.pick_index(len) };
      cx.p.storage_mut(bucket).store(decl, pos);
      return Modified::Yes;
    }

    if cx.decision(Frag::DeleteTypes) {
      return self.delete_type(cx);
    }
    if cx.decision(Frag::MutateTypes) {
      return self.mutate_type(cx);
    }

    if Self::could_be_safe_to_remove(cx.p, to_mod) {
      cx.p.remove_decl(to_mod);
      return Modified::Yes;
    }
    Modified::No
  }

  /// Ensures `main` ends in a return statement.
  fn fix_main_return(&self, cx: &mut MutatorData<'_>) {
    let Some(main) = cx.p.main_function() else { return };
    let has_return = main.body.children().iter().any(|c| c.kind() == StmtKind::Return);
    if has_return { return }
    let main = main.clone();
    let ctx = StatementContext::for_function(cx.p, &main);
    let ret_val = self.sc.make_expr(cx, &ctx, main.ret);
    let mut new_body = Statement::Compound(vec![
      main.body.clone(),
      Statement::Return(Box::new(ret_val)),
    ]);
    if let Some(canonical) = canon::canonicalize(&new_body) {
      new_body = canonical;
    }
    if let Some(f) = cx.p.find_function_mut(main.name) {
      f.body = new_body;
    }
  }

  /// One whole-program mutation step: up to 200 attempts, stopping on
  /// the first modification, then the main-return fixup and an
  /// optional type GC. Verification is deferred to the end of the
  /// step.
  fn run(&self, cx: &mut MutatorData<'_>) -> Result<()> {
    cx.p.begin_verify();
    for _ in 0..200 {
      if self.mutate_step(cx) == Modified::Yes { break }
    }
    if cx.decision(Frag::FixMainReturn) {
      self.fix_main_return(cx);
    }
    if cx.decision(Frag::GarbageCollectTypes) {
      cx.p.gc_types();
    }
    cx.p.end_verify()
  }
}

/// Creates a new simple program: just a `main` returning a special
/// constant drawn from the entropy source.
#[must_use] pub fn generate(rng: &mut RngSource, opts: LangOpts) -> Program {
  let mut p = Program::new(opts);
  let main_id = p.idents_mut().make_fixed_id("main");
  let int = p.builtin().signed_int;
  let char_t = p.builtin().char_ty;
  let char_ptr = p.types_mut()
    .get_or_create_derived(DerivedKind::Pointer, char_t)
    .expect("char pointer");
  let char_ptr_ptr = p.types_mut()
    .get_or_create_derived(DerivedKind::Pointer, char_ptr)
    .expect("char pointer pointer");
  let argc = Variable { ty: int, name: p.idents_mut().make_new_id("argc") };
  let argv = Variable { ty: char_ptr_ptr, name: p.idents_mut().make_new_id("argv") };
  let mut main = crate::program::Function::new(int, main_id, vec![argc, argv]);
  let text = LiteralMaker::new().special_int(rng);
  main.body = Statement::Compound(vec![Statement::Return(Box::new(Statement::Cast {
    ty: int,
    arg: Box::new(Statement::Constant { text, ty: int }),
  }))]);
  p.add(Decl::Function(main));
  debug_assert!(p.verify_self().is_ok(), "fresh program failed verification");
  p
}

/// Mutates the program in place, `strategy.scale × scale_mul` steps.
///
/// Each step runs on a fresh child RNG, so the outcome of step `k`
/// depends only on the incoming source state and `k`. Returns the
/// ordered record of consulted decision sites.
pub fn mutate(p: &mut Program, rng: &mut RngSource, strat: &Strategy, scale_mul: u32)
    -> Result<Vec<Decision>> {
  assert!(scale_mul > 0, "a zero scale would make the fuzzer do nothing");
  let mut data = MutatorData {
    p,
    strat: StrategyInstance::new(strat.clone(), rng.spawn_child()),
    rng: rng.spawn_child(),
    stmt_stack: Vec::new(),
  };

  if data.decision(Frag::RegenerateProgram) {
    debug!("regenerating program from scratch");
    *data.p = generate(&mut data.rng, data.p.opts());
  }

  for _ in 0..strat.scale * scale_mul {
    data.rng = data.rng.spawn_child();
    let step = GeneratorImpl::new();
    step.run(&mut data)?;
  }
  Ok(data.strat.into_decisions())
}

/// One reduction step: a single mutate step under a reduction-biased
/// strategy.
pub fn reduce(p: &mut Program, rng: &mut RngSource, strat: &Strategy)
    -> Result<Vec<Decision>> {
  let mut data = MutatorData {
    p,
    strat: StrategyInstance::new(strat.clone(), rng.spawn_child()),
    rng: rng.spawn_child(),
    stmt_stack: Vec::new(),
  };
  let step = GeneratorImpl::new();
  step.run(&mut data)?;
  Ok(data.strat.into_decisions())
}

/// Generates a program, then keeps mutating until the entropy buffer
/// is exhausted. The same bytes always produce the same program.
#[must_use] pub fn generate_from_entropy(bytes: &[u8], strat: &Strategy, opts: LangOpts)
    -> Program {
  let mut source = RngSource::from_entropy(EntropyVec::new(bytes.to_vec()));
  let mut program = generate(&mut source, opts);
  while source.has_entropy() {
    // A failed step discards the clone and keeps consuming entropy,
    // so replay stays deterministic either way.
    let mut candidate = program.clone();
    match mutate(&mut candidate, &mut source, strat, 1) {
      Ok(_) => program = candidate,
      Err(e) => debug!("entropy-driven mutation discarded: {e}"),
    }
  }
  program
}
