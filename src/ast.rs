//! The statement AST.
//!
//! Statements and expressions share one tagged variant, [`Statement`];
//! expressions are the variants that carry an evaluation type. The
//! tree is plain owned data (`Box`/`Vec`), so programs deep-clone for
//! the scheduler population without any arena plumbing; all
//! cross-references go through [`NameId`]/[`TypeRef`] handles.
//!
//! [`Statement::children`] defines the canonical child order used both
//! for printing and for traversal. Random-subtree selection works on
//! [`StmtPath`]s, child-index paths from the root, which is this
//! crate's answer to carrying around child/parent pointer pairs.

use smallvec::SmallVec;

use crate::idents::NameId;
use crate::program::{Program, Variable};
use crate::types::{Type, TypePool, TypeRef};
use crate::{Error, Result};

/// A child-index path from a traversal root to a descendant.
pub type StmtPath = SmallVec<[u16; 8]>;

/// The discriminator of a [`Statement`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StmtKind {
  Empty, Compound, If, While, Return, VoidReturn, Break, VarDecl, VarDef,
  Asm, Try, Catch, CatchAll, Throw, Goto, GotoLabel, StmtExpr, Delete,
  Comment, Constant, ConstantArray, Cast, Binary, Call, IndirectCall, New,
  Deref, AddrOf, AddrOfFunc, Index, LocalRef, GlobalRef,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
  Add, Sub, Mul, Div, Mod, BitAnd, BitOr, BitXor, Shl, Shr,
  Less, Greater, LessEq, GreaterEq, Eq, NotEq, LAnd, LOr, Assign,
}

impl BinOp {
  /// Operators legal on integer operands.
  pub const INT_OPS: &'static [BinOp] = &[
    BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div, BinOp::Mod,
    BinOp::BitAnd, BinOp::BitOr, BinOp::BitXor, BinOp::Shl, BinOp::Shr,
    BinOp::Less, BinOp::Greater, BinOp::LessEq, BinOp::GreaterEq,
    BinOp::Eq, BinOp::NotEq, BinOp::LAnd, BinOp::LOr, BinOp::Assign,
  ];

  /// Integer set minus the bitwise and modulo operators.
  pub const FLOAT_OPS: &'static [BinOp] = &[
    BinOp::Add, BinOp::Sub, BinOp::Mul, BinOp::Div,
    BinOp::Less, BinOp::Greater, BinOp::LessEq, BinOp::GreaterEq,
    BinOp::Eq, BinOp::NotEq, BinOp::LAnd, BinOp::LOr, BinOp::Assign,
  ];

  /// Pointer arithmetic, comparisons and assignment.
  pub const PTR_OPS: &'static [BinOp] = &[
    BinOp::Add, BinOp::Sub,
    BinOp::Less, BinOp::Greater, BinOp::LessEq, BinOp::GreaterEq,
    BinOp::Eq, BinOp::NotEq, BinOp::Assign,
  ];

  /// The C token.
  #[must_use] pub fn token(self) -> &'static str {
    match self {
      BinOp::Add => "+", BinOp::Sub => "-", BinOp::Mul => "*",
      BinOp::Div => "/", BinOp::Mod => "%", BinOp::BitAnd => "&",
      BinOp::BitOr => "|", BinOp::BitXor => "^", BinOp::Shl => "<<",
      BinOp::Shr => ">>", BinOp::Less => "<", BinOp::Greater => ">",
      BinOp::LessEq => "<=", BinOp::GreaterEq => ">=", BinOp::Eq => "==",
      BinOp::NotEq => "!=", BinOp::LAnd => "&&", BinOp::LOr => "||",
      BinOp::Assign => "=",
    }
  }

  /// Whether the result type is `int` regardless of the operands.
  #[must_use] pub fn yields_int(self) -> bool {
    matches!(self, BinOp::Less | BinOp::Greater | BinOp::LessEq | BinOp::GreaterEq
      | BinOp::Eq | BinOp::NotEq | BinOp::LAnd | BinOp::LOr)
  }
}

/// A statement or expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
  /// `;`
  Empty,
  /// `{ ... }`
  Compound(Vec<Statement>),
  /// `if (cond) body`
  If {
    /// The condition expression.
    cond: Box<Statement>,
    /// The then-branch.
    body: Box<Statement>,
  },
  /// `while (cond) body`
  While {
    /// The loop condition.
    cond: Box<Statement>,
    /// The loop body.
    body: Box<Statement>,
  },
  /// `return expr;`
  Return(Box<Statement>),
  /// `return;`
  VoidReturn,
  /// `break;`
  Break,
  /// `T name;`
  VarDecl {
    /// The declared type.
    ty: TypeRef,
    /// The declared variable name.
    name: NameId,
  },
  /// `T name = init;`
  VarDef {
    /// The declared type.
    ty: TypeRef,
    /// The declared variable name.
    name: NameId,
    /// The initializer expression (or array constant).
    init: Box<Statement>,
  },
  /// Inline assembly.
  Asm(Box<str>),
  /// `try body catches...`
  Try {
    /// The guarded body.
    body: Box<Statement>,
    /// `Catch`/`CatchAll` clauses, in order.
    catches: Vec<Statement>,
  },
  /// `catch (T name) body` — only legal directly under [`Statement::Try`].
  Catch {
    /// The caught type.
    ty: TypeRef,
    /// The exception variable.
    name: NameId,
    /// The handler body.
    body: Box<Statement>,
  },
  /// `catch (...) body`
  CatchAll {
    /// The handler body.
    body: Box<Statement>,
  },
  /// `throw expr;`
  Throw(Box<Statement>),
  /// `goto label;`
  Goto(NameId),
  /// `label:;`
  GotoLabel(NameId),
  /// An expression in statement position: `expr;`
  StmtExpr(Box<Statement>),
  /// `delete expr;`
  Delete(Box<Statement>),
  /// `/* text */`
  Comment(Box<str>),

  /// A literal with its source spelling.
  Constant {
    /// Verbatim source text of the literal.
    text: Box<str>,
    /// The literal's type.
    ty: TypeRef,
  },
  /// A braced array initializer. Only legal as a variable initializer.
  ConstantArray {
    /// The element expressions.
    elems: Vec<Statement>,
    /// The array type being initialized.
    ty: TypeRef,
  },
  /// `((T)(arg))`
  Cast {
    /// The target type.
    ty: TypeRef,
    /// The casted expression.
    arg: Box<Statement>,
  },
  /// `(lhs) op (rhs)`
  Binary {
    /// The operator.
    op: BinOp,
    /// Left operand.
    lhs: Box<Statement>,
    /// Right operand.
    rhs: Box<Statement>,
    /// Result type.
    ty: TypeRef,
  },
  /// A direct call `f(args)`.
  Call {
    /// The callee's return type.
    ty: TypeRef,
    /// The callee.
    func: NameId,
    /// Argument expressions.
    args: Vec<Statement>,
  },
  /// A call through a function pointer `(target)(args)`.
  IndirectCall {
    /// The target's return type.
    ty: TypeRef,
    /// The function-pointer expression.
    target: Box<Statement>,
    /// Argument expressions.
    args: Vec<Statement>,
  },
  /// C++ `new` of the pointee of `ty`.
  New {
    /// The resulting pointer type.
    ty: TypeRef,
    /// Constructor arguments (currently always empty).
    args: Vec<Statement>,
  },
  /// `(*ptr)`
  Deref {
    /// The pointee type.
    ty: TypeRef,
    /// The pointer expression.
    ptr: Box<Statement>,
  },
  /// `(&place)`
  AddrOf {
    /// The resulting pointer type.
    ty: TypeRef,
    /// The lvalue expression.
    place: Box<Statement>,
  },
  /// `(&f)` for a function `f`.
  AddrOfFunc {
    /// The function-pointer type.
    ty: TypeRef,
    /// The referenced function.
    func: NameId,
  },
  /// `base[index]`
  Index {
    /// The element type.
    ty: TypeRef,
    /// The array or pointer expression.
    base: Box<Statement>,
    /// The index expression.
    index: Box<Statement>,
  },
  /// A reference to a local variable or parameter.
  LocalRef(Variable),
  /// A reference to a global variable.
  GlobalRef(Variable),
}

impl Statement {
  /// The variant discriminator.
  #[must_use] pub fn kind(&self) -> StmtKind {
    match self {
      Statement::Empty => StmtKind::Empty,
      Statement::Compound(_) => StmtKind::Compound,
      Statement::If { .. } => StmtKind::If,
      Statement::While { .. } => StmtKind::While,
      Statement::Return(_) => StmtKind::Return,
      Statement::VoidReturn => StmtKind::VoidReturn,
      Statement::Break => StmtKind::Break,
      Statement::VarDecl { .. } => StmtKind::VarDecl,
      Statement::VarDef { .. } => StmtKind::VarDef,
      Statement::Asm(_) => StmtKind::Asm,
      Statement::Try { .. } => StmtKind::Try,
      Statement::Catch { .. } => StmtKind::Catch,
      Statement::CatchAll { .. } => StmtKind::CatchAll,
      Statement::Throw(_) => StmtKind::Throw,
      Statement::Goto(_) => StmtKind::Goto,
      Statement::GotoLabel(_) => StmtKind::GotoLabel,
      Statement::StmtExpr(_) => StmtKind::StmtExpr,
      Statement::Delete(_) => StmtKind::Delete,
      Statement::Comment(_) => StmtKind::Comment,
      Statement::Constant { .. } => StmtKind::Constant,
      Statement::ConstantArray { .. } => StmtKind::ConstantArray,
      Statement::Cast { .. } => StmtKind::Cast,
      Statement::Binary { .. } => StmtKind::Binary,
      Statement::Call { .. } => StmtKind::Call,
      Statement::IndirectCall { .. } => StmtKind::IndirectCall,
      Statement::New { .. } => StmtKind::New,
      Statement::Deref { .. } => StmtKind::Deref,
      Statement::AddrOf { .. } => StmtKind::AddrOf,
      Statement::AddrOfFunc { .. } => StmtKind::AddrOfFunc,
      Statement::Index { .. } => StmtKind::Index,
      Statement::LocalRef(_) => StmtKind::LocalRef,
      Statement::GlobalRef(_) => StmtKind::GlobalRef,
    }
  }

  /// Whether this node is an expression (carries an evaluation type).
  #[must_use] pub fn is_expr(&self) -> bool {
    matches!(self.kind(),
      StmtKind::Constant | StmtKind::ConstantArray | StmtKind::Cast | StmtKind::Binary
      | StmtKind::Call | StmtKind::IndirectCall | StmtKind::New | StmtKind::Deref
      | StmtKind::AddrOf | StmtKind::AddrOfFunc | StmtKind::Index
      | StmtKind::LocalRef | StmtKind::GlobalRef)
  }

  /// Whether this node is a statement.
  #[must_use] pub fn is_stmt(&self) -> bool { !self.is_expr() }

  /// The evaluation type; [`TypeRef::VOID`] for statements.
  #[must_use] pub fn eval_type(&self) -> TypeRef {
    match *self {
      Statement::Constant { ty, .. } | Statement::ConstantArray { ty, .. }
      | Statement::Cast { ty, .. } | Statement::Binary { ty, .. }
      | Statement::Call { ty, .. } | Statement::IndirectCall { ty, .. }
      | Statement::New { ty, .. } | Statement::Deref { ty, .. }
      | Statement::AddrOf { ty, .. } | Statement::AddrOfFunc { ty, .. }
      | Statement::Index { ty, .. } => ty,
      Statement::LocalRef(v) | Statement::GlobalRef(v) => v.ty,
      _ => TypeRef::VOID,
    }
  }

  /// The variable a `VarDecl`/`VarDef`/`Catch` declares.
  #[must_use] pub fn declared_var(&self) -> Option<Variable> {
    match *self {
      Statement::VarDecl { ty, name } | Statement::VarDef { ty, name, .. }
      | Statement::Catch { ty, name, .. } => Some(Variable { ty, name }),
      _ => None,
    }
  }

  /// Builds a binary operation, deriving the result type the way C
  /// does for the supported operator set.
  #[must_use] pub fn binary(p: &Program, op: BinOp, lhs: Statement, rhs: Statement) -> Statement {
    let ty = Self::binary_result_type(p, op, &lhs);
    Statement::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), ty }
  }

  fn binary_result_type(p: &Program, op: BinOp, lhs: &Statement) -> TypeRef {
    if op.yields_int() { p.builtin().signed_int }
    else if op == BinOp::Assign { lhs.eval_type() }
    else { p.types().strip_cv(lhs.eval_type()) }
  }

  /// The canonical ordered child list.
  #[must_use] pub fn children(&self) -> SmallVec<[&Statement; 4]> {
    let mut out = SmallVec::new();
    match self {
      Statement::Compound(cs) | Statement::ConstantArray { elems: cs, .. }
      | Statement::New { args: cs, .. } | Statement::Call { args: cs, .. } =>
        out.extend(cs.iter()),
      Statement::If { cond, body } | Statement::While { cond, body } => {
        out.push(cond.as_ref()); out.push(body.as_ref());
      }
      Statement::Return(e) | Statement::Throw(e) | Statement::StmtExpr(e)
      | Statement::Delete(e) | Statement::VarDef { init: e, .. }
      | Statement::Cast { arg: e, .. } | Statement::Deref { ptr: e, .. }
      | Statement::AddrOf { place: e, .. } | Statement::Catch { body: e, .. }
      | Statement::CatchAll { body: e } => out.push(e.as_ref()),
      Statement::Try { body, catches } => {
        out.push(body.as_ref());
        out.extend(catches.iter());
      }
      Statement::Binary { lhs, rhs, .. } => { out.push(lhs.as_ref()); out.push(rhs.as_ref()); }
      Statement::IndirectCall { target, args, .. } => {
        out.push(target.as_ref());
        out.extend(args.iter());
      }
      Statement::Index { base, index, .. } => { out.push(base.as_ref()); out.push(index.as_ref()); }
      _ => {}
    }
    out
  }

  /// Mutable references to the children, in canonical order.
  pub fn children_mut(&mut self) -> SmallVec<[&mut Statement; 4]> {
    let mut out = SmallVec::new();
    match self {
      Statement::Compound(cs) | Statement::ConstantArray { elems: cs, .. }
      | Statement::New { args: cs, .. } | Statement::Call { args: cs, .. } =>
        out.extend(cs.iter_mut()),
      Statement::If { cond, body } | Statement::While { cond, body } => {
        out.push(cond.as_mut()); out.push(body.as_mut());
      }
      Statement::Return(e) | Statement::Throw(e) | Statement::StmtExpr(e)
      | Statement::Delete(e) | Statement::VarDef { init: e, .. }
      | Statement::Cast { arg: e, .. } | Statement::Deref { ptr: e, .. }
      | Statement::AddrOf { place: e, .. } | Statement::Catch { body: e, .. }
      | Statement::CatchAll { body: e } => out.push(e.as_mut()),
      Statement::Try { body, catches } => {
        out.push(body.as_mut());
        out.extend(catches.iter_mut());
      }
      Statement::Binary { lhs, rhs, .. } => { out.push(lhs.as_mut()); out.push(rhs.as_mut()); }
      Statement::IndirectCall { target, args, .. } => {
        out.push(target.as_mut());
        out.extend(args.iter_mut());
      }
      Statement::Index { base, index, .. } => { out.push(base.as_mut()); out.push(index.as_mut()); }
      _ => {}
    }
    out
  }

  /// Pre-order traversal over all descendants (excluding `self`);
  /// short-circuits and returns `false` as soon as `pred` does.
  pub fn for_all_children(&self, pred: &mut impl FnMut(&Statement) -> bool) -> bool {
    for c in self.children() {
      if !pred(c) { return false }
      if !c.for_all_children(pred) { return false }
    }
    true
  }

  /// Pre-order visit of all descendants (excluding `self`).
  pub fn for_each_child(&self, f: &mut impl FnMut(&Statement)) {
    self.for_all_children(&mut |c| { f(c); true });
  }

  /// Paths to all descendants, pre-order, excluding the root.
  #[must_use] pub fn node_paths(&self) -> Vec<StmtPath> {
    fn walk(s: &Statement, prefix: &mut StmtPath, out: &mut Vec<StmtPath>) {
      for (i, c) in s.children().iter().enumerate() {
        prefix.push(u16::try_from(i).expect("oversized child list"));
        out.push(prefix.clone());
        walk(c, prefix, out);
        prefix.pop();
      }
    }
    let mut out = Vec::new();
    walk(self, &mut StmtPath::new(), &mut out);
    out
  }

  /// Resolves a path produced by [`Statement::node_paths`].
  #[must_use] pub fn at_path(&self, path: &[u16]) -> &Statement {
    let mut s = self;
    for &i in path { s = s.children()[i as usize] }
    s
  }

  /// Mutable path resolution.
  pub fn at_path_mut(&mut self, path: &[u16]) -> &mut Statement {
    let mut s = self;
    for &i in path {
      s = s.children_mut().into_iter().nth(i as usize).expect("stale path");
    }
    s
  }

  /// Number of nodes in this subtree, including `self`.
  #[must_use] pub fn count_nodes(&self) -> usize {
    1 + self.children().iter().map(|c| c.count_nodes()).sum::<usize>()
  }

  /// Whether this subtree references the identifier anywhere: as a
  /// variable, callee, label, or declared name.
  #[must_use] pub fn uses_id(&self, id: NameId) -> bool {
    if self.uses_id_local(id) { return true }
    !self.for_all_children(&mut |c| !c.uses_id_local(id))
  }

  fn uses_id_local(&self, id: NameId) -> bool {
    match *self {
      Statement::VarDecl { name, .. } | Statement::VarDef { name, .. }
      | Statement::Catch { name, .. } => name == id,
      Statement::Goto(l) | Statement::GotoLabel(l) => l == id,
      Statement::Call { func, .. } | Statement::AddrOfFunc { func, .. } => func == id,
      Statement::LocalRef(v) | Statement::GlobalRef(v) => v.name == id,
      _ => false,
    }
  }

  /// Whether any local variable reference to `id` occurs in this
  /// subtree (declarations of `id` do not count).
  #[must_use] pub fn references_var(&self, id: NameId) -> bool {
    if matches!(self, Statement::LocalRef(v) if v.name == id) { return true }
    !self.for_all_children(&mut |c| !matches!(c, Statement::LocalRef(v) if v.name == id))
  }

  /// Visits every [`TypeRef`] carried by this subtree.
  pub fn for_each_type(&self, f: &mut impl FnMut(TypeRef)) {
    match *self {
      Statement::VarDecl { ty, .. } | Statement::VarDef { ty, .. }
      | Statement::Catch { ty, .. } | Statement::Constant { ty, .. }
      | Statement::ConstantArray { ty, .. } | Statement::Cast { ty, .. }
      | Statement::Binary { ty, .. } | Statement::Call { ty, .. }
      | Statement::IndirectCall { ty, .. } | Statement::New { ty, .. }
      | Statement::Deref { ty, .. } | Statement::AddrOf { ty, .. }
      | Statement::AddrOfFunc { ty, .. } | Statement::Index { ty, .. } => f(ty),
      Statement::LocalRef(v) | Statement::GlobalRef(v) => f(v.ty),
      _ => {}
    }
    for c in self.children() { c.for_each_type(f) }
  }

  /// Runs the structural invariants over this subtree.
  ///
  /// Scope-sensitive rules (local references resolve, goto targets
  /// exist) are the whole-program verifier's job; everything locally
  /// checkable is checked here. A failure means the generator produced
  /// an illegal tree.
  pub fn verify_self(&self, p: &Program) -> Result<()> {
    self.verify_node(p)?;
    for c in self.children() {
      // Placement rules that need the parent.
      match c.kind() {
        StmtKind::Catch | StmtKind::CatchAll if self.kind() != StmtKind::Try =>
          return Err(Error::InvariantViolation("catch outside try".into())),
        StmtKind::ConstantArray if self.kind() != StmtKind::VarDef =>
          return Err(Error::InvariantViolation("array constant outside initializer".into())),
        _ => {}
      }
      c.verify_self(p)?;
    }
    Ok(())
  }

  fn verify_node(&self, p: &Program) -> Result<()> {
    let pool = p.types();
    let fail = |msg: &str| Err(Error::InvariantViolation(msg.into()));
    let mut ok = true;
    self.for_each_type_shallow(&mut |t| ok &= pool.is_valid(t));
    if !ok { return fail("dead type reference") }
    let mut ids_ok = true;
    self.for_each_id_shallow(&mut |id| ids_ok &= p.idents().is_valid_id(id));
    if !ids_ok { return fail("dangling identifier") }

    match self {
      Statement::Compound(cs) => {
        if cs.iter().any(Statement::is_expr) { return fail("bare expression in compound") }
      }
      Statement::If { cond, body } | Statement::While { cond, body } => {
        if !cond.is_expr() || !body.is_stmt() { return fail("malformed control statement") }
      }
      Statement::Return(e) | Statement::Throw(e) | Statement::StmtExpr(e)
      | Statement::Delete(e) => {
        if !e.is_expr() { return fail("statement wrapping a non-expression") }
      }
      Statement::VarDef { ty, init, .. } => {
        if !init.is_expr() { return fail("non-expression initializer") }
        if !matches!(&**init, Statement::ConstantArray { .. })
          && !type_converts(pool, init.eval_type(), *ty) {
          return fail("initializer type mismatch");
        }
      }
      Statement::Try { body, catches } => {
        if !body.is_stmt() { return fail("malformed try body") }
        if !catches.iter().all(|c| matches!(c.kind(), StmtKind::Catch | StmtKind::CatchAll)) {
          return fail("non-catch in try clause list");
        }
      }
      Statement::ConstantArray { elems, ty } => {
        let Type::Array { base, size, .. } = *pool.get(pool.strip_cv(*ty)) else {
          return fail("array constant of non-array type");
        };
        if elems.is_empty() || elems.len() > size as usize {
          return fail("array constant arity out of range");
        }
        if !elems.iter().all(|e| e.is_expr() && type_converts(pool, e.eval_type(), base)) {
          return fail("array constant element type mismatch");
        }
      }
      Statement::Cast { arg, .. } => {
        if !arg.is_expr() { return fail("cast of a statement") }
      }
      Statement::Binary { op, lhs, rhs, ty } => {
        if !lhs.is_expr() || !rhs.is_expr() { return fail("binary over statements") }
        let expected = Self::binary_result_type(p, *op, lhs);
        if *ty != expected { return fail("binary result type mismatch") }
      }
      Statement::Call { ty, func, args } => {
        let Some(f) = p.find_function(*func) else { return fail("call of unknown function") };
        if f.ret != *ty { return fail("call type mismatch") }
        if args.len() < f.params.len() || (args.len() > f.params.len() && !f.is_variadic()) {
          return fail("call arity mismatch");
        }
        for (a, param) in args.iter().zip(&f.params) {
          if !a.is_expr() || !type_converts(pool, a.eval_type(), param.ty) {
            return fail("call argument type mismatch");
          }
        }
      }
      Statement::IndirectCall { ty, target, args } => {
        let Type::FuncPtr { ret, args: params, .. } =
          pool.get(pool.strip_cv(target.eval_type())) else {
          return fail("indirect call through non-function-pointer");
        };
        if ret != ty || args.len() != params.len() { return fail("indirect call mismatch") }
        if !args.iter().all(Statement::is_expr) { return fail("indirect call argument") }
      }
      Statement::New { ty, .. } => {
        if !pool.is_pointer(*ty) { return fail("new with non-pointer result") }
      }
      Statement::Deref { ty, ptr } => {
        match pool.get(pool.strip_cv(ptr.eval_type())) {
          Type::Pointer(b) | Type::Array { base: b, .. }
            if pool.strip_cv(*b) == pool.strip_cv(*ty) => {}
          _ => return fail("deref operand does not point at the result type"),
        }
      }
      Statement::AddrOf { ty, place } => {
        let Type::Pointer(b) = *pool.get(pool.strip_cv(*ty)) else {
          return fail("address-of with non-pointer result");
        };
        if !place.is_expr() || !type_converts(pool, place.eval_type(), b) {
          return fail("address-of operand mismatch");
        }
      }
      Statement::AddrOfFunc { ty, func } => {
        let Type::FuncPtr { ret, args, .. } = pool.get(pool.strip_cv(*ty)) else {
          return fail("function address with non-function-pointer type");
        };
        let Some(f) = p.find_function(*func) else { return fail("address of unknown function") };
        if f.ret != *ret || f.params.len() != args.len()
          || f.params.iter().zip(args).any(|(v, &a)| v.ty != a) {
          return fail("function address signature mismatch");
        }
      }
      Statement::Index { ty, base, index } => {
        if !pool.is_int(index.eval_type()) { return fail("non-integer subscript") }
        match pool.get(pool.strip_cv(base.eval_type())) {
          Type::Pointer(b) | Type::Array { base: b, .. }
            if pool.strip_cv(*b) == pool.strip_cv(*ty) => {}
          _ => return fail("subscript base does not point at the result type"),
        }
      }
      Statement::GlobalRef(v) => {
        if !p.find_global(v.name).is_some_and(|g| g.var.ty == v.ty) {
          return fail("global reference mismatch");
        }
      }
      _ => {}
    }
    Ok(())
  }

  fn for_each_type_shallow(&self, f: &mut impl FnMut(TypeRef)) {
    match *self {
      Statement::VarDecl { ty, .. } | Statement::VarDef { ty, .. }
      | Statement::Catch { ty, .. } | Statement::Constant { ty, .. }
      | Statement::ConstantArray { ty, .. } | Statement::Cast { ty, .. }
      | Statement::Binary { ty, .. } | Statement::Call { ty, .. }
      | Statement::IndirectCall { ty, .. } | Statement::New { ty, .. }
      | Statement::Deref { ty, .. } | Statement::AddrOf { ty, .. }
      | Statement::AddrOfFunc { ty, .. } | Statement::Index { ty, .. } => f(ty),
      Statement::LocalRef(v) | Statement::GlobalRef(v) => f(v.ty),
      _ => {}
    }
  }

  fn for_each_id_shallow(&self, f: &mut impl FnMut(NameId)) {
    match *self {
      Statement::VarDecl { name, .. } | Statement::VarDef { name, .. }
      | Statement::Catch { name, .. } | Statement::Goto(name)
      | Statement::GotoLabel(name) => f(name),
      Statement::Call { func, .. } | Statement::AddrOfFunc { func, .. } => f(func),
      Statement::LocalRef(v) | Statement::GlobalRef(v) => f(v.name),
      _ => {}
    }
  }
}

/// Whether a value of type `from` implicitly converts to `to`:
/// identical types, array-to-pointer decay, or adding CV qualifiers.
#[must_use] pub fn type_converts(pool: &TypePool, from: TypeRef, to: TypeRef) -> bool {
  if from == to { return true }
  if let (Type::Array { base: fb, .. }, Type::Pointer(tb)) = (pool.get(from), pool.get(to)) {
    return type_converts(pool, *fb, *tb);
  }
  match pool.get(to) {
    Type::Const(b) | Type::Volatile(b) => type_converts(pool, from, *b),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::LangOpts;

  fn test_program() -> Program { Program::new(LangOpts::default()) }

  fn int_const(p: &Program, text: &str) -> Statement {
    Statement::Constant { text: text.into(), ty: p.builtin().signed_int }
  }

  #[test]
  fn children_order_is_canonical() {
    let p = test_program();
    let cond = int_const(&p, "1");
    let body = Statement::Compound(vec![Statement::Break]);
    let w = Statement::While { cond: Box::new(cond.clone()), body: Box::new(body) };
    let cs = w.children();
    assert_eq!(cs.len(), 2);
    assert_eq!(*cs[0], cond);
    assert_eq!(cs[1].kind(), StmtKind::Compound);
  }

  #[test]
  fn paths_round_trip() {
    let p = test_program();
    let inner = Statement::Compound(vec![Statement::Empty, Statement::Break]);
    let root = Statement::Compound(vec![
      Statement::StmtExpr(Box::new(int_const(&p, "0"))), inner,
    ]);
    let paths = root.node_paths();
    // 2 children + 1 grandchild expr + 2 grandchildren stmts.
    assert_eq!(paths.len(), 5);
    for path in &paths {
      let k = root.at_path(path).kind();
      let mut r = root.clone();
      assert_eq!(r.at_path_mut(path).kind(), k);
    }
    assert_eq!(root.at_path(&paths[4]).kind(), StmtKind::Break);
  }

  #[test]
  fn count_nodes_counts_subtree() {
    let p = test_program();
    let s = Statement::Compound(vec![
      Statement::Empty,
      Statement::StmtExpr(Box::new(int_const(&p, "5"))),
    ]);
    assert_eq!(s.count_nodes(), 4);
  }

  #[test]
  fn verify_rejects_catch_outside_try() {
    let p = test_program();
    let catch = Statement::CatchAll { body: Box::new(Statement::Empty) };
    let bad = Statement::Compound(vec![catch]);
    assert!(bad.verify_self(&p).is_err());
  }

  #[test]
  fn verify_rejects_bad_deref() {
    let p = test_program();
    let bad = Statement::Deref {
      ty: p.builtin().signed_int,
      ptr: Box::new(int_const(&p, "0")),
    };
    assert!(bad.verify_self(&p).is_err());
  }

  #[test]
  fn binary_type_derivation() {
    let p = test_program();
    let cmp = Statement::binary(&p, BinOp::Less, int_const(&p, "1"), int_const(&p, "2"));
    assert_eq!(cmp.eval_type(), p.builtin().signed_int);
    assert!(cmp.verify_self(&p).is_ok());
  }
}
