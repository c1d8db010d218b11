//! The program model: declarations and the [`Program`] container.
//!
//! A `Program` owns its identifier table, its type pool and ordered
//! declaration storages. It is plain data and deep-clones, which is
//! how the scheduler keeps a population of candidates without any
//! shared mutable state.

use bit_set::BitSet;
use bitflags::bitflags;
use hashbrown::HashMap;
use std::fmt;

use crate::ast::Statement;
use crate::builtins::BuiltinFunc;
use crate::idents::{IdentTable, NameId};
use crate::types::{BuiltinTypes, TypePool, TypeRef};
use crate::{Error, LangOpts, Result};

/// A typed name: a parameter, local or global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
  /// The variable's type.
  pub ty: TypeRef,
  /// The variable's name.
  pub name: NameId,
}

bitflags! {
  /// Boolean properties of a function.
  #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
  pub struct FnFlags: u8 {
    /// Internal linkage.
    const STATIC = 1 << 0;
    /// C++ `noexcept`.
    const NOEXCEPT = 1 << 1;
    /// Takes extra arguments after the declared parameters.
    const VARIADIC = 1 << 2;
    /// Declared but defined elsewhere; printed as a prototype only.
    const EXTERNAL = 1 << 3;
  }
}

/// Branch-weight hint emitted as an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weight {
  /// No hint.
  #[default]
  None,
  /// `__attribute__((hot))`.
  Hot,
  /// `__attribute__((cold))`.
  Cold,
}

/// Non-standard calling conventions Clang and GCC claim to support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CallConv {
  Stdcall, Regcall, Pascal, MsAbi, SysvAbi, Vectorcall,
}

impl CallConv {
  /// All conventions, for uniform draws.
  pub const ALL: &'static [CallConv] = &[
    CallConv::Stdcall, CallConv::Regcall, CallConv::Pascal,
    CallConv::MsAbi, CallConv::SysvAbi, CallConv::Vectorcall,
  ];

  /// The attribute token.
  #[must_use] pub fn as_str(self) -> &'static str {
    match self {
      CallConv::Stdcall => "stdcall",
      CallConv::Regcall => "regcall",
      CallConv::Pascal => "pascal",
      CallConv::MsAbi => "ms_abi",
      CallConv::SysvAbi => "sysv_abi",
      CallConv::Vectorcall => "vectorcall",
    }
  }
}

/// A function attribute, printed as `__attribute__((<token>))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncAttr {
  /// `alloc_size(n)`.
  AllocSize(u32),
  /// `alloc_size(n, m)`.
  AllocSize2(u32, u32),
  /// `always_inline`.
  AlwaysInline,
  /// `assume_aligned(n)`, `n` a power of two.
  AssumeAligned(u32),
  /// `const`.
  Const,
  /// `disable_tail_calls`.
  DisableTailCalls,
  /// `flatten`.
  Flatten,
  /// `malloc`.
  Malloc,
  /// `no_builtin`.
  NoBuiltin,
  /// `noinline`.
  NoInline,
  /// `pure`.
  Pure,
  /// `no_caller_saved_registers`, combined with a calling convention.
  NoCallerSavedRegisters(CallConv),
}

impl fmt::Display for FuncAttr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      FuncAttr::AllocSize(n) => write!(f, "__attribute__((alloc_size({n})))"),
      FuncAttr::AllocSize2(n, m) => write!(f, "__attribute__((alloc_size({n}, {m})))"),
      FuncAttr::AlwaysInline => write!(f, "__attribute__((always_inline))"),
      FuncAttr::AssumeAligned(n) => write!(f, "__attribute__((assume_aligned ({n})))"),
      FuncAttr::Const => write!(f, "__attribute__((const))"),
      FuncAttr::DisableTailCalls => write!(f, "__attribute__((disable_tail_calls))"),
      FuncAttr::Flatten => write!(f, "__attribute__((flatten))"),
      FuncAttr::Malloc => write!(f, "__attribute__((malloc))"),
      FuncAttr::NoBuiltin => write!(f, "__attribute__((no_builtin))"),
      FuncAttr::NoInline => write!(f, "__attribute__((noinline))"),
      FuncAttr::Pure => write!(f, "__attribute__((pure))"),
      FuncAttr::NoCallerSavedRegisters(cc) =>
        write!(f, "__attribute__((no_caller_saved_registers, {}))", cc.as_str()),
    }
  }
}

/// A function declaration or definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
  /// The function name.
  pub name: NameId,
  /// The return type.
  pub ret: TypeRef,
  /// The parameters, in order.
  pub params: Vec<Variable>,
  /// The body; ignored for external functions.
  pub body: Statement,
  /// Attributes, in emission order.
  pub attrs: Vec<FuncAttr>,
  /// An optional non-standard calling convention.
  pub conv: Option<CallConv>,
  /// Boolean properties.
  pub flags: FnFlags,
  /// Branch-weight hint.
  pub weight: Weight,
}

impl Function {
  /// A fresh function with an empty body and no attributes.
  #[must_use] pub fn new(ret: TypeRef, name: NameId, params: Vec<Variable>) -> Self {
    Function {
      name, ret, params, body: Statement::Compound(Vec::new()),
      attrs: Vec::new(), conv: None, flags: FnFlags::empty(), weight: Weight::None,
    }
  }

  /// Whether the function accepts extra trailing arguments.
  #[must_use] pub fn is_variadic(&self) -> bool { self.flags.contains(FnFlags::VARIADIC) }

  /// Whether the function is defined outside the program.
  #[must_use] pub fn is_external(&self) -> bool { self.flags.contains(FnFlags::EXTERNAL) }

  /// Builds a direct call to this function.
  #[must_use] pub fn call(&self, args: Vec<Statement>) -> Statement {
    Statement::Call { ty: self.ret, func: self.name, args }
  }
}

/// A global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
  /// Type and name.
  pub var: Variable,
  /// Internal linkage.
  pub is_static: bool,
  /// The initializer, if any.
  pub init: Option<Statement>,
}

/// A field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
  /// The field name.
  pub name: NameId,
  /// The field type.
  pub ty: TypeRef,
}

/// A record (struct) declaration. The corresponding
/// [`Type::Record`](crate::types::Type::Record) names this decl; the
/// fields live here so the type graph stays acyclic.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  /// The struct name, shared with the record type.
  pub name: NameId,
  /// The record's interned type.
  pub ty: TypeRef,
  /// The fields, in order.
  pub fields: Vec<Field>,
}

/// A top-level declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
  /// A function.
  Function(Function),
  /// A global variable.
  Global(GlobalVar),
  /// A record.
  Record(Record),
}

impl Decl {
  /// The declared name.
  #[must_use] pub fn name(&self) -> NameId {
    match self {
      Decl::Function(f) => f.name,
      Decl::Global(g) => g.var.name,
      Decl::Record(r) => r.name,
    }
  }
}

/// An ordered bucket of declarations. Bucket order is emission order.
#[derive(Debug, Clone, Default)]
pub struct DeclStorage {
  decls: Vec<Decl>,
}

impl DeclStorage {
  /// Number of declarations in the bucket.
  #[must_use] pub fn len(&self) -> usize { self.decls.len() }
  /// Whether the bucket is empty.
  #[must_use] pub fn is_empty(&self) -> bool { self.decls.is_empty() }
  /// The declarations, in order.
  #[must_use] pub fn decls(&self) -> &[Decl] { &self.decls }
  /// Inserts a declaration at the given position.
  pub fn store(&mut self, decl: Decl, index: usize) {
    self.decls.insert(index.min(self.decls.len()), decl);
  }
}

/// Index of the records bucket.
pub const STORAGE_RECORDS: usize = 0;
/// Index of the globals bucket.
pub const STORAGE_GLOBALS: usize = 1;
/// Index of the functions bucket.
pub const STORAGE_FUNCTIONS: usize = 2;

/// A handle to a declaration: `(bucket, index)`.
pub type DeclHandle = (usize, usize);

/// A complete generated program.
#[derive(Debug, Clone)]
pub struct Program {
  idents: IdentTable,
  types: TypePool,
  builtin: BuiltinTypes,
  builtin_funcs: HashMap<BuiltinFunc, NameId>,
  storages: [DeclStorage; 3],
  opts: LangOpts,
  verify_depth: u32,
}

impl Program {
  /// Creates an empty program with seeded builtin types.
  #[must_use] pub fn new(opts: LangOpts) -> Self {
    let mut types = TypePool::new();
    let builtin = BuiltinTypes::seed(&mut types);
    Program {
      idents: IdentTable::new(opts.is_cxx()),
      types, builtin,
      builtin_funcs: HashMap::new(),
      storages: Default::default(),
      opts,
      verify_depth: 0,
    }
  }

  /// The language options.
  #[must_use] pub fn opts(&self) -> LangOpts { self.opts }

  /// The identifier table.
  #[must_use] pub fn idents(&self) -> &IdentTable { &self.idents }
  /// Mutable identifier table.
  pub fn idents_mut(&mut self) -> &mut IdentTable { &mut self.idents }

  /// The type pool.
  #[must_use] pub fn types(&self) -> &TypePool { &self.types }
  /// Mutable type pool.
  pub fn types_mut(&mut self) -> &mut TypePool { &mut self.types }

  /// Handles to the builtin types.
  #[must_use] pub fn builtin(&self) -> &BuiltinTypes { &self.builtin }

  /// The declaration buckets, in emission order.
  #[must_use] pub fn storages(&self) -> &[DeclStorage; 3] { &self.storages }
  /// Mutable access to one bucket.
  pub fn storage_mut(&mut self, bucket: usize) -> &mut DeclStorage { &mut self.storages[bucket] }

  /// Iterates all declarations in emission order.
  pub fn decls(&self) -> impl Iterator<Item = &Decl> {
    self.storages.iter().flat_map(|s| s.decls.iter())
  }

  /// Handles to all declarations, in emission order.
  #[must_use] pub fn decl_handles(&self) -> Vec<DeclHandle> {
    let mut out = Vec::new();
    for (b, s) in self.storages.iter().enumerate() {
      out.extend((0..s.len()).map(|i| (b, i)));
    }
    out
  }

  /// Resolves a declaration handle.
  #[must_use] pub fn decl(&self, h: DeclHandle) -> &Decl { &self.storages[h.0].decls[h.1] }

  /// Mutable handle resolution.
  pub fn decl_mut(&mut self, h: DeclHandle) -> &mut Decl { &mut self.storages[h.0].decls[h.1] }

  /// Removes and returns the declaration behind a handle. Callers that
  /// might drop a referenced decl check [`Program::is_id_used`] first.
  pub fn remove_decl(&mut self, h: DeclHandle) -> Decl { self.storages[h.0].decls.remove(h.1) }

  /// Appends a declaration to its natural bucket.
  pub fn add(&mut self, decl: Decl) {
    debug_assert!(
      !self.decls().any(|d| std::mem::discriminant(d) == std::mem::discriminant(&decl)
        && d.name() == decl.name()),
      "duplicate declaration of {:?}", decl.name());
    let bucket = match decl {
      Decl::Record(_) => STORAGE_RECORDS,
      Decl::Global(_) => STORAGE_GLOBALS,
      Decl::Function(_) => STORAGE_FUNCTIONS,
    };
    self.storages[bucket].decls.push(decl);
  }

  /// Finds a function declaration by name.
  #[must_use] pub fn find_function(&self, name: NameId) -> Option<&Function> {
    self.decls().find_map(|d| match d {
      Decl::Function(f) if f.name == name => Some(f),
      _ => None,
    })
  }

  /// Mutable function lookup.
  pub fn find_function_mut(&mut self, name: NameId) -> Option<&mut Function> {
    self.storages.iter_mut().flat_map(|s| s.decls.iter_mut()).find_map(|d| match d {
      Decl::Function(f) if f.name == name => Some(f),
      _ => None,
    })
  }

  /// Finds a global variable by name.
  #[must_use] pub fn find_global(&self, name: NameId) -> Option<&GlobalVar> {
    self.decls().find_map(|d| match d {
      Decl::Global(g) if g.var.name == name => Some(g),
      _ => None,
    })
  }

  /// Finds a record by name.
  #[must_use] pub fn find_record(&self, name: NameId) -> Option<&Record> {
    self.decls().find_map(|d| match d {
      Decl::Record(r) if r.name == name => Some(r),
      _ => None,
    })
  }

  /// Whether the function is the program's `main`.
  #[must_use] pub fn is_main(&self, f: &Function) -> bool {
    self.idents.name(f.name) == "main"
  }

  /// Returns the `main` function, if present.
  #[must_use] pub fn main_function(&self) -> Option<&Function> {
    let id = self.idents.id_of("main")?;
    self.find_function(id)
  }

  /// Ensures the builtin function is declared and returns its name.
  ///
  /// The declaration is re-installed if a mutation removed it; the
  /// fixed identifier survives either way.
  pub fn builtin_func(&mut self, kind: BuiltinFunc) -> NameId {
    if let Some(&id) = self.builtin_funcs.get(&kind) {
      if self.find_function(id).is_some() { return id }
      self.install_builtin(kind, id);
      return id;
    }
    let id = self.idents.make_fixed_id(kind.as_str());
    self.builtin_funcs.insert(kind, id);
    self.install_builtin(kind, id);
    id
  }

  fn install_builtin(&mut self, kind: BuiltinFunc, id: NameId) {
    let sig = kind.signature(&mut self.types, &self.builtin);
    let params = sig.params.iter().enumerate()
      .map(|(i, &ty)| Variable { ty, name: self.idents.make_new_id(&format!("p{i}")) })
      .collect();
    let mut f = Function::new(sig.ret, id, params);
    f.flags |= FnFlags::EXTERNAL;
    if sig.variadic { f.flags |= FnFlags::VARIADIC }
    self.add(Decl::Function(f));
  }

  /// Whether any declaration or statement references the identifier
  /// (declarations of the id itself do not count as uses).
  #[must_use] pub fn is_id_used(&self, id: NameId) -> bool {
    for d in self.decls() {
      match d {
        Decl::Function(f) => {
          if !f.is_external() && f.body.uses_id(id) { return true }
        }
        Decl::Global(g) => {
          if g.init.as_ref().is_some_and(|i| i.uses_id(id)) { return true }
        }
        Decl::Record(r) => {
          if r.fields.iter().any(|fld| fld.name == id) { return true }
        }
      }
    }
    false
  }

  /// Total statement-node count over function bodies and global
  /// initializers; the default size score.
  #[must_use] pub fn count_nodes(&self) -> usize {
    self.decls().map(|d| match d {
      Decl::Function(f) if !f.is_external() => f.body.count_nodes(),
      Decl::Global(g) => g.init.as_ref().map_or(0, Statement::count_nodes),
      _ => 0,
    }).sum()
  }

  /// The set of type ids reachable from any declaration, closed over
  /// type components and record fields.
  #[must_use] pub fn reachable_types(&self) -> BitSet {
    let mut marked = BitSet::new();
    for d in self.decls() {
      match d {
        Decl::Function(f) => {
          self.types.mark(f.ret, &mut marked);
          for v in &f.params { self.types.mark(v.ty, &mut marked) }
          f.body.for_each_type(&mut |t| self.types.mark(t, &mut marked));
        }
        Decl::Global(g) => {
          self.types.mark(g.var.ty, &mut marked);
          if let Some(init) = &g.init {
            init.for_each_type(&mut |t| self.types.mark(t, &mut marked));
          }
        }
        Decl::Record(r) => self.types.mark(r.ty, &mut marked),
      }
    }
    // Live record types keep their field types alive, which may reach
    // further records; iterate to a fixpoint.
    loop {
      let before = marked.len();
      for d in self.decls() {
        if let Decl::Record(r) = d {
          if marked.contains(r.ty.into_usize()) {
            for fld in &r.fields { self.types.mark(fld.ty, &mut marked) }
          }
        }
      }
      if marked.len() == before { break }
    }
    marked
  }

  /// Whether the type is referenced (directly or as a component of a
  /// referenced type) by any declaration.
  #[must_use] pub fn is_type_used(&self, t: TypeRef) -> bool {
    self.reachable_types().contains(t.into_usize())
  }

  /// Sweeps unreachable non-builtin types to `Invalid`. Returns the
  /// number of swept entries.
  pub fn gc_types(&mut self) -> usize {
    let marked = self.reachable_types();
    let swept = self.types.sweep(&marked);
    if swept > 0 { log::debug!("type GC swept {swept} entries") }
    swept
  }

  /// Opens a deferred-verification scope. Nested scopes coalesce: only
  /// the outermost [`Program::end_verify`] actually verifies.
  pub fn begin_verify(&mut self) { self.verify_depth += 1 }

  /// Closes a deferred-verification scope, running [`Program::verify_self`]
  /// when this was the outermost one.
  pub fn end_verify(&mut self) -> Result<()> {
    debug_assert!(self.verify_depth > 0, "unbalanced verify scope");
    self.verify_depth = self.verify_depth.saturating_sub(1);
    if self.verify_depth == 0 { self.verify_self() } else { Ok(()) }
  }

  /// Runs every program-level invariant.
  pub fn verify_self(&self) -> Result<()> {
    let mut seen: HashMap<(std::mem::Discriminant<Decl>, NameId), ()> = HashMap::new();
    for d in self.decls() {
      let key = (std::mem::discriminant(d), d.name());
      if seen.insert(key, ()).is_some() {
        return Err(Error::InvariantViolation(
          format!("duplicate declaration of {}", self.idents.name(d.name()))));
      }
      if !self.idents.is_valid_id(d.name()) {
        return Err(Error::InvariantViolation("declaration with dangling name".into()));
      }
      match d {
        Decl::Function(f) => self.verify_function(f)?,
        Decl::Global(g) => {
          if !self.types.is_valid(g.var.ty) {
            return Err(Error::InvariantViolation("global of dead type".into()));
          }
          if let Some(init) = &g.init { init.verify_self(self)? }
        }
        Decl::Record(r) => {
          for fld in &r.fields {
            if !self.types.is_valid(fld.ty) {
              return Err(Error::InvariantViolation("record field of dead type".into()));
            }
          }
        }
      }
    }
    Ok(())
  }

  fn verify_function(&self, f: &Function) -> Result<()> {
    if !self.types.is_valid(f.ret) {
      return Err(Error::InvariantViolation("function with dead return type".into()));
    }
    for v in &f.params {
      if !self.types.is_valid(v.ty) {
        return Err(Error::InvariantViolation("parameter of dead type".into()));
      }
    }
    if f.is_external() { return Ok(()) }
    f.body.verify_self(self)?;

    let mut labels = Vec::new();
    if let Statement::GotoLabel(l) = f.body { labels.push(l) }
    f.body.for_each_child(&mut |c| {
      if let Statement::GotoLabel(l) = c { labels.push(*l) }
    });
    let mut visible: Vec<Variable> = f.params.clone();
    self.verify_scopes(&f.body, &labels, &mut visible)
  }

  fn verify_scopes(&self, s: &Statement, labels: &[NameId], visible: &mut Vec<Variable>)
      -> Result<()> {
    match s {
      Statement::LocalRef(v) => {
        if !visible.contains(v) {
          return Err(Error::InvariantViolation(
            format!("reference to out-of-scope variable {}", self.idents.name(v.name))));
        }
      }
      Statement::Goto(l) => {
        if !labels.contains(l) {
          return Err(Error::InvariantViolation("goto without target label".into()));
        }
      }
      Statement::Compound(cs) => {
        let mark = visible.len();
        for c in cs {
          self.verify_scopes(c, labels, visible)?;
          if let Some(v) = c.declared_var() { visible.push(v) }
        }
        visible.truncate(mark);
        return Ok(());
      }
      Statement::Catch { ty, name, body } => {
        let mark = visible.len();
        visible.push(Variable { ty: *ty, name: *name });
        self.verify_scopes(body, labels, visible)?;
        visible.truncate(mark);
        return Ok(());
      }
      _ => {}
    }
    for c in s.children() {
      self.verify_scopes(c, labels, visible)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_func_is_installed_once() {
    let mut p = Program::new(LangOpts::default());
    let a = p.builtin_func(BuiltinFunc::Malloc);
    let b = p.builtin_func(BuiltinFunc::Malloc);
    assert_eq!(a, b);
    assert_eq!(p.idents().name(a), "malloc");
    assert!(p.idents().is_fixed(a));
    let f = p.find_function(a).unwrap();
    assert!(f.is_external());
    assert_eq!(f.params.len(), 1);
  }

  #[test]
  fn removed_builtin_reinstalls_under_same_id() {
    let mut p = Program::new(LangOpts::default());
    let id = p.builtin_func(BuiltinFunc::Abort);
    let handles = p.decl_handles();
    let h = handles.into_iter().find(|&h| p.decl(h).name() == id).unwrap();
    p.remove_decl(h);
    assert!(p.find_function(id).is_none());
    assert_eq!(p.builtin_func(BuiltinFunc::Abort), id);
    assert!(p.find_function(id).is_some());
  }

  #[test]
  fn verify_scope_catches_dangling_local() {
    let mut p = Program::new(LangOpts::default());
    let int = p.builtin().signed_int;
    let name = p.idents_mut().make_new_id("f");
    let ghost = Variable { ty: int, name: p.idents_mut().make_new_id("ghost") };
    let mut f = Function::new(int, name, Vec::new());
    f.body = Statement::Compound(vec![
      Statement::Return(Box::new(Statement::LocalRef(ghost))),
    ]);
    p.add(Decl::Function(f));
    assert!(p.verify_self().is_err());
  }

  #[test]
  fn verify_scope_respects_compound_boundaries() {
    let mut p = Program::new(LangOpts::default());
    let int = p.builtin().signed_int;
    let fname = p.idents_mut().make_new_id("f");
    let v = Variable { ty: int, name: p.idents_mut().make_new_id("v") };
    let decl = Statement::VarDecl { ty: int, name: v.name };
    let use_v = Statement::StmtExpr(Box::new(Statement::LocalRef(v)));
    // Declaration and use in the same compound: fine.
    let mut f = Function::new(int, fname, Vec::new());
    f.body = Statement::Compound(vec![decl.clone(), use_v.clone(), Statement::VoidReturn]);
    p.add(Decl::Function(f));
    assert!(p.verify_self().is_ok());
    // Declaration nested one compound deeper: the use is out of scope.
    let fname2 = p.idents_mut().make_new_id("g");
    let mut g = Function::new(int, fname2, Vec::new());
    g.body = Statement::Compound(vec![Statement::Compound(vec![decl]), use_v]);
    p.add(Decl::Function(g));
    assert!(p.verify_self().is_err());
  }

  #[test]
  fn deferred_verify_coalesces() {
    let mut p = Program::new(LangOpts::default());
    p.begin_verify();
    p.begin_verify();
    assert!(p.end_verify().is_ok());
    assert!(p.end_verify().is_ok());
  }

  #[test]
  fn gc_keeps_reachable_types() {
    let mut p = Program::new(LangOpts::default());
    let int = p.builtin().signed_int;
    let name = p.idents_mut().make_new_id("arrayT");
    let arr = p.types_mut().add_type(crate::types::Type::Array { base: int, size: 3, name })
      .unwrap();
    let dead_name = p.idents_mut().make_new_id("arrayT");
    let dead = p.types_mut().add_type(crate::types::Type::Array { base: int, size: 7, name: dead_name })
      .unwrap();
    let gname = p.idents_mut().make_new_id("g");
    p.add(Decl::Global(GlobalVar {
      var: Variable { ty: arr, name: gname }, is_static: false, init: None,
    }));
    assert!(p.is_type_used(arr));
    assert!(!p.is_type_used(dead));
    assert_eq!(p.gc_types(), 1);
    assert!(p.types().is_valid(arr));
    assert!(!p.types().is_valid(dead));
  }
}
