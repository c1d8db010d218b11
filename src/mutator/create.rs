//! The statement creator: fresh random statements and expressions.

use arrayvec::ArrayVec;

use crate::ast::{BinOp, Statement, StmtKind};
use crate::builtins::BuiltinFunc;
use crate::idents::NameId;
use crate::program::{Decl, FnFlags, Function, GlobalVar, Variable};
use crate::strategy::Frag;
use crate::types::{Type, TypeRef};

use super::MutatorData;
use super::canon;
use super::context::StatementContext;
use super::limits::RecursionLimit;
use super::literals::LiteralMaker;
use super::mutate::randomize_func_attrs;
use super::snippets::Snippets;
use super::type_creator::{TypeCreator, is_valid_return_type};

/// The builtins offered at expression call sites.
const CALLABLE_BUILTINS: &[BuiltinFunc] = BuiltinFunc::ALL;

pub(crate) struct StatementCreator {
  pub(crate) tc: TypeCreator,
  lits: LiteralMaker,
  snippets: Snippets,
  /// How deeply expressions may nest in one mutation step.
  expr_limit: RecursionLimit,
  /// How deeply statements may nest in one mutation step.
  stmt_limit: RecursionLimit,
  /// How deeply function creation may nest in one mutation step.
  func_limit: RecursionLimit,
}

impl StatementCreator {
  pub(crate) fn new() -> Self {
    StatementCreator {
      tc: TypeCreator::new(),
      lits: LiteralMaker::new(),
      snippets: Snippets::new(),
      expr_limit: RecursionLimit::new(2),
      stmt_limit: RecursionLimit::new(3),
      func_limit: RecursionLimit::new(3),
    }
  }

  /// An array variable initializer; fills element by element but may
  /// stop early.
  pub(crate) fn make_array_init(&self, cx: &mut MutatorData<'_>, tref: TypeRef) -> Statement {
    let tref = cx.p.types().strip_cv(tref);
    let Type::Array { base, size, .. } = *cx.p.types().get(tref) else {
      unreachable!("array initializer for non-array type")
    };
    let mut values = Vec::new();
    for _ in 0..size {
      values.push(self.make_constant(cx, base));
      if cx.decision(Frag::DontFillArrayConstant) { break }
    }
    Statement::ConstantArray { elems: values, ty: tref }
  }

  /// The code that initializes a variable of type `t`.
  pub(crate) fn make_var_init(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Statement {
    if cx.p.types().is_array(t) { return self.make_array_init(cx, t) }
    self.make_constant(cx, t)
  }

  /// Gives an incomplete function a body and attributes and installs
  /// it in the program; returns its name.
  fn finish_function_creation(&self, cx: &mut MutatorData<'_>, mut f: Function) -> NameId {
    if cx.decision(Frag::InitWithFuncAttrs) {
      let _ = randomize_func_attrs(cx, &mut f);
    }
    let scope = self.func_limit.scope();
    // A function-generation heavy strategy must not spiral: past the
    // limit the body is just an empty block.
    if !scope.reached() {
      f.body = self.make_function_body(cx, &f);
    }
    if cx.decision(Frag::FunctionIsStatic) { f.flags |= FnFlags::STATIC }
    if cx.p.opts().is_cxx() && cx.decision(Frag::FunctionIsNoExcept) {
      f.flags |= FnFlags::NOEXCEPT;
    }
    let name = f.name;
    cx.p.add(Decl::Function(f));
    name
  }

  /// Creates a function matching a function-pointer type's signature.
  pub(crate) fn create_function_with_type(&self, cx: &mut MutatorData<'_>, tref: TypeRef)
      -> NameId {
    let Type::FuncPtr { ret, args, .. } = cx.p.types().get(tref).clone() else {
      unreachable!("function creation from non-function-pointer type")
    };
    let params = args.iter()
      .map(|&ty| Variable { ty, name: cx.new_id("arg") })
      .collect();
    let f = Function::new(ret, cx.new_id("func"), params);
    self.finish_function_creation(cx, f)
  }

  /// Creates a function with the given return type and random
  /// parameters.
  pub(crate) fn create_function_with_return_type(&self, cx: &mut MutatorData<'_>, t: TypeRef)
      -> NameId {
    let mut params = Vec::new();
    for _ in 0..cx.rng.below(8) {
      let ty = self.tc.existing_defined_type(cx);
      params.push(Variable { ty, name: cx.new_id("arg") });
    }
    let f = Function::new(t, cx.new_id("func"), params);
    self.finish_function_creation(cx, f)
  }

  /// Any function at all, creating one when the program has none.
  fn any_function(&self, cx: &mut MutatorData<'_>) -> NameId {
    let options: Vec<NameId> = cx.p.decls().filter_map(|d| match d {
      Decl::Function(f) => Some(f.name),
      _ => None,
    }).collect();
    if options.is_empty() {
      let ret = self.tc.return_type(cx);
      return self.create_function_with_return_type(cx, ret);
    }
    *cx.rng.pick(&options)
  }

  fn make_throw(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let t = self.tc.defined_type(cx);
    Statement::Throw(Box::new(self.make_expr(cx, ctx, t)))
  }

  fn make_catch(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let ty = self.tc.defined_type(cx);
    let name = cx.new_id("c");
    let mut inner = ctx.clone();
    inner.add_var(Variable { ty, name });
    Statement::Catch { ty, name, body: Box::new(self.make_stmt(cx, &mut inner, false)) }
  }

  fn make_try(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let mut catches = Vec::new();
    for _ in 0..cx.rng.below(4) {
      catches.push(self.make_catch(cx, ctx));
    }
    if cx.decision(Frag::CatchAll) {
      let mut inner = ctx.clone();
      catches.push(Statement::CatchAll {
        body: Box::new(self.make_stmt(cx, &mut inner, false)),
      });
    }
    let mut inner = ctx.clone();
    Statement::Try { body: Box::new(self.make_stmt(cx, &mut inner, false)), catches }
  }

  /// Calls the named function with freshly generated arguments;
  /// variadic callees get extra arguments of arbitrary scalar types.
  pub(crate) fn make_call_to_func(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext,
      func: NameId) -> Statement {
    let f = cx.p.find_function(func).expect("callee exists");
    let (ret, params, variadic) = (f.ret, f.params.clone(), f.is_variadic());
    let mut args = Vec::new();
    for param in &params {
      args.push(self.make_expr(cx, ctx, param.ty));
    }
    if variadic {
      for _ in 0..cx.rng.below(10) {
        let t = self.tc.any_int_or_ptr_or_float_type(cx);
        args.push(self.make_expr(cx, ctx, t));
      }
    }
    Statement::Call { ty: ret, func, args }
  }

  /// A call (direct or through a function pointer) evaluating to `t`.
  fn make_call(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef) -> Statement {
    if cx.decision(Frag::CallFuncPtr) {
      let func_ptr_t = self.tc.make_new_func_ptr_type_with_result(cx, t);
      let target = self.make_expr(cx, ctx, func_ptr_t);
      let Type::FuncPtr { args: arg_types, .. } = cx.p.types().get(func_ptr_t).clone() else {
        unreachable!("fresh function pointer type")
      };
      let args = arg_types.iter().map(|&a| self.make_expr(cx, ctx, a)).collect();
      return Statement::IndirectCall { ty: t, target: Box::new(target), args };
    }
    let func = self.create_function_with_return_type(cx, t);
    self.make_call_to_func(cx, ctx, func)
  }

  /// A constant of the given type.
  pub(crate) fn make_constant(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Statement {
    self.lits.make_constant(cx, t)
  }

  /// Creates a fresh global of type `t`.
  fn make_global(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Variable {
    let name = cx.new_id("global");
    let is_static = cx.decision(Frag::VarIsStatic);
    let init = if cx.p.types().expects_var_initializer(t) || cx.decision(Frag::InitGlobal) {
      Some(self.make_var_init(cx, t))
    } else {
      None
    };
    let var = Variable { ty: t, name };
    cx.p.add(Decl::Global(GlobalVar { var, is_static, init }));
    var
  }

  /// A global of type `t` that may already exist.
  fn make_or_find_global(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Variable {
    let existing: Vec<Variable> = cx.p.decls().filter_map(|d| match d {
      Decl::Global(g) if g.var.ty == t => Some(g.var),
      _ => None,
    }).collect();
    for g in existing {
      if cx.decision(Frag::PickExistingGlobal) { return g }
    }
    self.make_global(cx, t)
  }

  /// An lvalue of type `t`: a variable reference, possibly behind a
  /// chain of dereferences.
  fn make_lvalue(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    if cx.p.types().is_pointer(t) && cx.decision(Frag::TryDerefVar) {
      let ptr_t = self.tc.ptr_type_of(cx, t);
      return Statement::Deref { ty: t, ptr: Box::new(self.make_lvalue(cx, ctx, ptr_t)) };
    }
    self.make_var_ref(cx, ctx, t)
  }

  fn make_binary(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    let (op, lhs_t, rhs_t);
    if cx.p.types().is_int(t) {
      op = *cx.rng.pick(BinOp::INT_OPS);
      lhs_t = self.tc.any_int_type(cx, op != BinOp::Assign);
      rhs_t = self.tc.any_int_type(cx, true);
    } else if cx.p.types().is_float(t) {
      op = *cx.rng.pick(BinOp::FLOAT_OPS);
      lhs_t = self.tc.any_int_or_float_type(cx);
      rhs_t = self.tc.any_int_or_float_type(cx);
    } else if cx.p.types().is_pointer(t) {
      op = *cx.rng.pick(BinOp::PTR_OPS);
      lhs_t = t;
      rhs_t = self.tc.any_int_type(cx, true);
    } else {
      return self.make_constant(cx, t);
    }

    let lhs = if op == BinOp::Assign {
      self.make_lvalue(cx, ctx, lhs_t)
    } else {
      self.make_expr(cx, ctx, lhs_t)
    };
    let rhs = self.make_expr(cx, ctx, rhs_t);
    Statement::binary(cx.p, op, lhs, rhs)
  }

  fn make_deref(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    let ptr_t = self.tc.ptr_type_of(cx, t);
    Statement::Deref { ty: t, ptr: Box::new(self.make_expr(cx, ctx, ptr_t)) }
  }

  fn make_subscript(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    let ptr_t = self.tc.ptr_type_of(cx, t);
    let base = self.make_expr(cx, ctx, ptr_t);
    let idx_t = self.tc.any_int_type(cx, true);
    let index = self.make_expr(cx, ctx, idx_t);
    Statement::Index { ty: t, base: Box::new(base), index: Box::new(index) }
  }

  /// A variable reference of (something convertible to) type `t`.
  fn make_var_ref(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    if cx.decision(Frag::PickLocalVar) {
      if let Some(v) = ctx.first_convertible(cx.p, t) {
        return Statement::LocalRef(v);
      }
    }
    Statement::GlobalRef(self.make_or_find_global(cx, t))
  }

  fn make_expr_impl(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    debug_assert!(cx.p.types().is_valid(t), "expression of invalid type");
    let scope = self.expr_limit.scope();
    if scope.reached() { return self.make_constant(cx, t) }

    let t = cx.p.types().strip_cv(t);
    let is_pointer = cx.p.types().is_pointer(t);

    // Builtins first: try a few draws for one whose return type fits.
    if cx.decision(Frag::CallBuiltin) {
      for _ in 0..10 {
        let kind = *cx.rng.pick(CALLABLE_BUILTINS);
        let func = cx.p.builtin_func(kind);
        let ret = cx.p.find_function(func).expect("builtin installed").ret;
        if ret == t {
          return self.make_call_to_func(cx, ctx, func);
        }
        if is_pointer && cx.p.types().is_pointer(ret) {
          let call = self.make_call_to_func(cx, ctx, func);
          return Statement::Cast { ty: t, arg: Box::new(call) };
        }
      }
    }

    // `void *` just absorbs any int or pointer through a cast.
    if t == cx.p.builtin().void_ptr {
      let src = self.tc.any_int_or_ptr_type(cx);
      return Statement::Cast { ty: t, arg: Box::new(self.make_expr_impl(cx, ctx, src)) };
    }

    if cx.p.types().is_int(t) || cx.p.types().is_float(t) || is_pointer {
      #[derive(Clone, Copy)]
      enum Opt { Constant, Bin, Call, Var, Cast, Deref, Subscript, AddrOf, New }
      let mut options: ArrayVec<Opt, 11> = ArrayVec::from_iter([
        Opt::Constant, Opt::Subscript, Opt::Bin, Opt::Call,
        Opt::Var, Opt::Var, Opt::Var, Opt::Cast, Opt::Deref,
      ]);
      if is_pointer {
        options.push(Opt::AddrOf);
        if cx.p.opts().is_cxx() { options.push(Opt::New) }
      }
      return match *cx.rng.pick(&options) {
        Opt::Constant => self.make_constant(cx, t),
        Opt::Bin => self.make_binary(cx, ctx, t),
        Opt::Deref => self.make_deref(cx, ctx, t),
        Opt::Subscript => self.make_subscript(cx, ctx, t),
        Opt::New => Statement::New { ty: t, args: Vec::new() },
        Opt::Call => {
          // Retry and hope for a different case when `t` cannot be
          // returned from a function.
          if !is_valid_return_type(cx.p.types(), t) {
            self.make_expr_impl(cx, ctx, t)
          } else {
            self.make_call(cx, ctx, t)
          }
        }
        Opt::Var => self.make_var_ref(cx, ctx, t),
        Opt::Cast => {
          let src = if is_pointer {
            self.tc.any_int_or_ptr_type(cx)
          } else {
            self.tc.any_int_type(cx, true)
          };
          Statement::Cast { ty: t, arg: Box::new(self.make_expr_impl(cx, ctx, src)) }
        }
        Opt::AddrOf => {
          let Type::Pointer(base) = *cx.p.types().get(t) else { unreachable!("pointer") };
          Statement::AddrOf { ty: t, place: Box::new(self.make_lvalue(cx, ctx, base)) }
        }
      };
    }

    if cx.p.types().is_array(t) {
      return self.make_var_ref(cx, ctx, t);
    }

    if matches!(cx.p.types().get(t), Type::FuncPtr { .. }) {
      return if cx.rng.flip_coin() {
        let func = self.create_function_with_type(cx, t);
        Statement::AddrOfFunc { ty: t, func }
      } else {
        self.make_constant(cx, t)
      };
    }

    if matches!(cx.p.types().get(t), Type::Record { .. }) {
      return self.make_constant(cx, t);
    }

    if t == cx.p.builtin().void {
      return self.make_call(cx, ctx, t);
    }

    self.make_constant(cx, t)
  }

  /// A random expression evaluating to `t`.
  pub(crate) fn make_expr(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext, t: TypeRef)
      -> Statement {
    let s = self.make_expr_impl(cx, ctx, t);
    debug_assert!(s.is_expr(), "make_expr returned a statement");
    debug_assert!(s.verify_self(cx.p).is_ok(), "fresh expression failed verification");
    s
  }

  pub(crate) fn make_return(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext)
      -> Statement {
    if ctx.return_type == TypeRef::VOID { return Statement::VoidReturn }
    Statement::Return(Box::new(self.make_expr(cx, ctx, ctx.return_type)))
  }

  fn make_if(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let bool_t = self.tc.bool_type(cx);
    let cond = self.make_expr(cx, ctx, bool_t);
    Statement::If {
      cond: Box::new(cond),
      body: Box::new(self.make_compound(cx, ctx.clone())),
    }
  }

  fn make_while(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let bool_t = self.tc.bool_type(cx);
    let cond = self.make_expr(cx, ctx, bool_t);
    let mut inner = ctx.clone();
    inner.in_loop = true;
    Statement::While {
      cond: Box::new(cond),
      body: Box::new(self.make_compound(cx, inner)),
    }
  }

  /// Declares (or defines) a fresh local variable and makes it visible
  /// to subsequent statements.
  fn make_var_decl(&self, cx: &mut MutatorData<'_>, ctx: &mut StatementContext,
      is_definition: bool) -> Statement {
    let mut t = TypeRef::VOID;
    for _ in 0..1000 {
      t = if is_definition {
        self.tc.defined_type(cx)
      } else {
        self.tc.defined_non_const_type(cx)
      };
      if is_definition { break }
      // A plain declaration cannot carry the initializer some types
      // require; redraw.
      if !cx.p.types().expects_var_initializer(t) { break }
    }

    let name = cx.new_id("var");
    let var = Variable { ty: t, name };
    let res = if is_definition {
      let init = if cx.p.types().is_array(t) {
        self.make_array_init(cx, t)
      } else {
        self.make_expr(cx, ctx, t)
      };
      Statement::VarDef { ty: t, name, init: Box::new(init) }
    } else {
      Statement::VarDecl { ty: t, name }
    };
    ctx.add_var(var);
    res
  }

  fn make_builtin_call_stmt(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext)
      -> Statement {
    let kind = *cx.rng.pick(CALLABLE_BUILTINS);
    let func = cx.p.builtin_func(kind);
    let call = self.make_call_to_func(cx, ctx, func);
    cx.wrap_expr_in_stmt(call)
  }

  fn make_stmt_impl(&self, cx: &mut MutatorData<'_>, ctx: &mut StatementContext,
      avoid_decl: bool) -> Statement {
    // Maybe splice a precomputed snippet.
    if cx.decision(Frag::UseSnippet) {
      return self.snippets.create_snippet(cx, ctx);
    }

    // Maybe recycle a statement a previous mutation threw away.
    if cx.decision(Frag::UseMutatedStmtAsChild) {
      if let Some(res) = cx.stmt_stack.pop() {
        return res;
      }
    }

    if cx.decision(Frag::ForceCallBuiltinStmt) {
      return self.make_builtin_call_stmt(cx, ctx);
    }

    // From here on we may be in a recursion; an empty statement is the
    // fallback once the nesting budget runs out.
    let scope = self.stmt_limit.scope();
    if scope.reached() { return Statement::Empty }

    #[derive(Clone, Copy)]
    enum Opt {
      Return, Expr, If, While, VarDecl, VarDef, Break, Asm, Call, Try,
      Throw, Delete, Goto, Label, Compound,
    }
    let mut options: ArrayVec<Opt, 17> = ArrayVec::from_iter([
      Opt::Return, Opt::Expr, Opt::If, Opt::While, Opt::VarDecl,
      Opt::Call, Opt::VarDef, Opt::Asm, Opt::Break, Opt::Goto,
      Opt::Label, Opt::Compound, Opt::Compound, Opt::Compound,
    ]);
    if cx.p.opts().is_cxx() {
      options.push(Opt::Try);
      options.push(Opt::Throw);
      options.push(Opt::Delete);
    }

    match *cx.rng.pick(&options) {
      Opt::Return => self.make_return(cx, ctx),
      Opt::Compound => self.make_compound(cx, ctx.clone()),
      Opt::If => self.make_if(cx, ctx),
      Opt::Break => {
        // `break` only means something inside a loop; redraw outside.
        if ctx.in_loop { Statement::Break } else { self.make_stmt(cx, ctx, avoid_decl) }
      }
      Opt::While => self.make_while(cx, ctx),
      Opt::Delete => {
        let t = self.tc.ptr_type(cx);
        Statement::Delete(Box::new(self.make_expr(cx, ctx, t)))
      }
      Opt::Asm => Statement::Asm("nop".into()),
      Opt::Try => self.make_try(cx, ctx),
      Opt::Throw => self.make_throw(cx, ctx),
      Opt::Goto => {
        if ctx.labels.is_empty() {
          self.make_stmt(cx, ctx, avoid_decl)
        } else {
          Statement::Goto(*cx.rng.pick(&ctx.labels))
        }
      }
      Opt::Label => Statement::GotoLabel(cx.new_id("rng_lbl")),
      Opt::VarDecl => {
        if avoid_decl { self.make_stmt(cx, ctx, avoid_decl) }
        else { self.make_var_decl(cx, ctx, false) }
      }
      Opt::VarDef => {
        if avoid_decl { self.make_stmt(cx, ctx, avoid_decl) }
        else { self.make_var_decl(cx, ctx, true) }
      }
      Opt::Call => {
        let func = self.any_function(cx);
        let call = self.make_call_to_func(cx, ctx, func);
        cx.wrap_expr_in_stmt(call)
      }
      Opt::Expr => {
        let t = self.tc.defined_type(cx);
        let e = self.make_expr(cx, ctx, t);
        cx.wrap_expr_in_stmt(e)
      }
    }
  }

  /// A random statement legal in the given context.
  pub(crate) fn make_stmt(&self, cx: &mut MutatorData<'_>, ctx: &mut StatementContext,
      avoid_decl: bool) -> Statement {
    let s = self.make_stmt_impl(cx, ctx, avoid_decl);
    debug_assert!(s.is_stmt(), "make_stmt returned an expression");
    s
  }

  /// A random block; each child sees the variables its predecessors
  /// declared.
  pub(crate) fn make_compound(&self, cx: &mut MutatorData<'_>, mut ctx: StatementContext)
      -> Statement {
    let mut children = Vec::new();
    for _ in 0..cx.rng.below(16) {
      let c = self.make_stmt(cx, &mut ctx, false);
      if c.kind() == StmtKind::Empty { break }
      ctx.expand_with_stmt(&c);
      children.push(c);
    }
    Statement::Compound(children)
  }

  /// A fresh function body, canonicalized, usually ending in a return.
  pub(crate) fn make_function_body(&self, cx: &mut MutatorData<'_>, f: &Function) -> Statement {
    let mut ctx = StatementContext::for_function(cx.p, f);
    let mut children = Vec::new();
    for _ in 0..1 + cx.rng.below(16) {
      let c = self.make_stmt(cx, &mut ctx, false);
      ctx.expand_with_stmt(&c);
      children.push(c);
    }
    if cx.decision(Frag::EnsureReturnInFunc) {
      children.push(self.make_return(cx, &ctx));
    }
    let mut body = Statement::Compound(children);
    if let Some(canonical) = canon::canonicalize(&body) {
      body = canonical;
    }
    body
  }
}
