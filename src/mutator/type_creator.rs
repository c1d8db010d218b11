//! The type creator: hands out existing types by requested shape and
//! grows new derived types under a per-step budget.

use std::cell::Cell;

use crate::idents::NameId;
use crate::program::{Decl, Field, Record};
use crate::strategy::Frag;
use crate::types::{DerivedKind, Type, TypePool, TypeRef};

use super::MutatorData;
use super::limits::RecursionLimit;

/// Whether a type may be the return type of a function.
pub(crate) fn is_valid_return_type(pool: &TypePool, t: TypeRef) -> bool {
  !pool.is_array(t)
}

pub(crate) struct TypeCreator {
  type_limit: RecursionLimit,
  record_limit: RecursionLimit,
  /// How many types this creator has made. Bounded so that a bad RNG
  /// sequence cannot explode the pool (a function pointer type can
  /// transitively request one new type per argument).
  created: Cell<u32>,
}

/// Per-creator cap on freshly created types.
const MAX_CREATED_TYPES: u32 = 3;

impl TypeCreator {
  pub(crate) fn new() -> Self {
    TypeCreator {
      type_limit: RecursionLimit::new(3),
      record_limit: RecursionLimit::new(3),
      created: Cell::new(0),
    }
  }

  /// Any type at all, void included.
  pub(crate) fn any_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    if cx.decision(Frag::PickVoidForAny) { return cx.p.builtin().void }
    self.defined_type(cx)
  }

  /// The (memoized) pointer type over `t`.
  pub(crate) fn ptr_type_of(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> TypeRef {
    cx.p.types_mut().get_or_create_derived(DerivedKind::Pointer, t).expect("pointer type")
  }

  /// Some existing pointer type. The seeded `void *` guarantees one.
  pub(crate) fn ptr_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let options: Vec<TypeRef> = cx.p.types().iter_refs()
      .filter(|&t| matches!(cx.p.types().get(t), Type::Pointer(_)))
      .collect();
    *cx.rng.pick(&options)
  }

  pub(crate) fn any_float_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    *cx.rng.pick(&cx.p.builtin().float_types)
  }

  /// A random integer type, possibly wrapped in a single CV qualifier.
  pub(crate) fn any_int_type(&self, cx: &mut MutatorData<'_>, allow_const: bool) -> TypeRef {
    let mut result = *cx.rng.pick(&cx.p.builtin().int_types);
    if !cx.p.types().is_const(result) && cx.decision(Frag::VolatileInt) {
      result = cx.p.types_mut().get_or_create_derived(DerivedKind::Volatile, result)
        .expect("volatile int");
    }
    if allow_const && !cx.p.types().is_volatile(result) && cx.decision(Frag::ConstInt) {
      result = cx.p.types_mut().get_or_create_derived(DerivedKind::Const, result)
        .expect("const int");
    }
    result
  }

  pub(crate) fn any_int_or_float_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    if cx.decision(Frag::PickFloatOverInt) { return self.any_float_type(cx) }
    self.any_int_type(cx, false)
  }

  pub(crate) fn any_int_or_ptr_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    if cx.decision(Frag::PickPtrOverInt) { return self.ptr_type(cx) }
    self.any_int_type(cx, false)
  }

  pub(crate) fn any_int_or_ptr_or_float_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    if cx.decision(Frag::PickPtrOverInt) { return self.ptr_type(cx) }
    if cx.decision(Frag::PickFloatOverInt) { return self.any_float_type(cx) }
    self.any_int_type(cx, false)
  }

  /// Any existing non-void type.
  pub(crate) fn existing_defined_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let void = cx.p.builtin().void;
    let options: Vec<TypeRef> = cx.p.types().iter_refs().filter(|&t| t != void).collect();
    *cx.rng.pick(&options)
  }

  /// Any existing non-void, non-array type.
  pub(crate) fn existing_non_array_defined_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let void = cx.p.builtin().void;
    let options: Vec<TypeRef> = cx.p.types().iter_refs()
      .filter(|&t| t != void && !matches!(cx.p.types().get(t), Type::Array { .. }))
      .collect();
    *cx.rng.pick(&options)
  }

  pub(crate) fn make_new_ptr_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let base = self.existing_defined_type(cx);
    self.ptr_type_of(cx, base)
  }

  pub(crate) fn make_new_func_ptr_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let ret = self.return_type(cx);
    self.make_new_func_ptr_type_with_result(cx, ret)
  }

  /// A fresh function pointer type with the given return type and
  /// `below(5)` arguments of existing types.
  pub(crate) fn make_new_func_ptr_type_with_result(&self, cx: &mut MutatorData<'_>, ret: TypeRef)
      -> TypeRef {
    let mut args = smallvec::SmallVec::new();
    for _ in 0..cx.rng.below(5) {
      args.push(self.existing_defined_type(cx));
    }
    let name = cx.new_id("funcPtrT");
    cx.p.types_mut().add_type(Type::FuncPtr { ret, args, name }).expect("function pointer type")
  }

  /// A fresh array type of size `[1, 128]` over a non-array base.
  pub(crate) fn make_new_array_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    loop {
      let base = self.defined_type(cx);
      if cx.p.types().is_array(base) { continue }
      let size = 1 + cx.rng.below(128);
      let name = cx.new_id("arrayT");
      match cx.p.types_mut().add_type(Type::Array { base, size, name }) {
        Ok(t) => return t,
        Err(_) => continue,
      }
    }
  }

  /// An arbitrary newly created type, budget permitting; falls back to
  /// an integer type once the budget or nesting limit is hit.
  pub(crate) fn make_new_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    self.created.set(self.created.get() + 1);
    if self.created.get() > MAX_CREATED_TYPES {
      return self.any_int_type(cx, false);
    }
    let scope = self.type_limit.scope();
    if scope.reached() {
      return self.any_int_type(cx, false);
    }
    #[derive(Clone, Copy)]
    enum Opt { Const, Pointer, FuncPtr, Array, Record }
    // Arrays are where the interesting accesses come from.
    const OPTIONS: &[Opt] = &[
      Opt::Const, Opt::Pointer, Opt::FuncPtr,
      Opt::Array, Opt::Array, Opt::Array, Opt::Array,
      Opt::Record,
    ];
    match *cx.rng.pick(OPTIONS) {
      Opt::Const => {
        let base = self.existing_non_array_defined_type(cx);
        cx.p.types_mut().get_or_create_derived(DerivedKind::Const, base)
          .unwrap_or_else(|_| cx.p.builtin().signed_int)
      }
      Opt::Pointer => self.make_new_ptr_type(cx),
      Opt::FuncPtr => {
        if cx.decision(Frag::CreateFuncPtrType) { self.make_new_func_ptr_type(cx) }
        else { self.make_new_ptr_type(cx) }
      }
      Opt::Array => self.make_new_array_type(cx),
      Opt::Record => self.make_record_type(cx),
    }
  }

  /// A type usable as a function return type.
  pub(crate) fn return_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    loop {
      let t = self.any_type(cx);
      if is_valid_return_type(cx.p.types(), t) { return t }
    }
  }

  /// A defined type that is not const-qualified.
  pub(crate) fn defined_non_const_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    loop {
      let t = self.defined_type(cx);
      if !cx.p.types().is_const(t) { return t }
    }
  }

  /// A complete (sized, non-void) type; may create a new one.
  pub(crate) fn defined_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let can_create = !self.type_limit.scope().reached();
    if can_create && cx.decision(Frag::CreateNewType) {
      return self.make_new_type(cx);
    }
    self.existing_defined_type(cx)
  }

  /// The boolean result type of the target language.
  pub(crate) fn bool_type(&self, cx: &MutatorData<'_>) -> TypeRef {
    cx.p.builtin().signed_int
  }

  fn make_field(&self, cx: &mut MutatorData<'_>, t: Option<TypeRef>) -> Field {
    let ty = t.unwrap_or_else(|| self.defined_non_const_type(cx));
    Field { name: cx.new_id("field"), ty }
  }

  /// Creates a record declaration containing at least one member of
  /// the given type (or of a random arithmetic type).
  pub(crate) fn make_record(&self, cx: &mut MutatorData<'_>, expected: Option<TypeRef>)
      -> NameId {
    let expected = expected.unwrap_or_else(|| self.any_int_or_float_type(cx));
    let scope = self.record_limit.scope();
    let field_limit = if scope.reached() { 0 } else { 10 };
    let name = cx.new_id("record");
    let mut fields = Vec::new();
    if field_limit > 0 {
      for _ in 0..cx.rng.below(field_limit) {
        fields.push(self.make_field(cx, None));
      }
    }
    fields.push(self.make_field(cx, Some(expected)));
    if field_limit > 0 {
      for _ in 0..cx.rng.below(field_limit) {
        fields.push(self.make_field(cx, None));
      }
    }
    let ty = cx.p.types_mut().add_type(Type::Record { name }).expect("record type");
    cx.p.add(Decl::Record(Record { name, ty, fields }));
    name
  }

  /// Creates a record and returns its type.
  pub(crate) fn make_record_type(&self, cx: &mut MutatorData<'_>) -> TypeRef {
    let name = self.make_record(cx, None);
    cx.p.find_record(name).expect("fresh record").ty
  }
}
