//! The type interner.
//!
//! All types live in a [`TypePool`] owned by the program and are
//! addressed through [`TypeRef`] handles. Derived types (pointer,
//! `const`, `volatile`) are memoized so that asking for "pointer to T"
//! twice yields the same handle. The pool enforces the structural
//! rules of the generated language subset: a single CV layer that
//! never wraps an array, and no arrays of arrays.
//!
//! The id space is stable for the lifetime of a program: the garbage
//! collector overwrites unreachable entries with [`Type::Invalid`]
//! instead of reassigning ids.

use bit_set::BitSet;
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::idents::NameId;
use crate::{Error, Result};

/// An interned type handle into a program's [`TypePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);

impl TypeRef {
  /// The `void` type. The pool seeds it first, so the handle is fixed.
  pub const VOID: TypeRef = TypeRef(0);

  /// Converts into an index.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
  /// Converts from an index.
  #[must_use] pub fn from_usize(n: usize) -> Self { TypeRef(u32::try_from(n).expect("type id overflow")) }
}

/// The built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicKind {
  /// `void`.
  Void,
  /// `char` (distinct from both signed and unsigned char).
  Char,
  /// `signed char`.
  SignedChar,
  /// `unsigned char`.
  UnsignedChar,
  /// `short`.
  Short,
  /// `unsigned short`.
  UnsignedShort,
  /// `int`. Doubles as the boolean result type.
  Int,
  /// `unsigned int`.
  UnsignedInt,
  /// `long`.
  Long,
  /// `unsigned long`. Doubles as `size_t`.
  UnsignedLong,
  /// `long long`.
  LongLong,
  /// `unsigned long long`.
  UnsignedLongLong,
  /// `float`.
  Float,
  /// `double`.
  Double,
}

impl BasicKind {
  /// The C spelling of the type.
  #[must_use] pub fn as_str(self) -> &'static str {
    match self {
      BasicKind::Void => "void",
      BasicKind::Char => "char",
      BasicKind::SignedChar => "signed char",
      BasicKind::UnsignedChar => "unsigned char",
      BasicKind::Short => "short",
      BasicKind::UnsignedShort => "unsigned short",
      BasicKind::Int => "int",
      BasicKind::UnsignedInt => "unsigned int",
      BasicKind::Long => "long",
      BasicKind::UnsignedLong => "unsigned long",
      BasicKind::LongLong => "long long",
      BasicKind::UnsignedLongLong => "unsigned long long",
      BasicKind::Float => "float",
      BasicKind::Double => "double",
    }
  }

  /// Whether this is an integer type.
  #[must_use] pub fn is_int(self) -> bool {
    !matches!(self, BasicKind::Void | BasicKind::Float | BasicKind::Double)
  }

  /// Whether this is a floating-point type.
  #[must_use] pub fn is_float(self) -> bool {
    matches!(self, BasicKind::Float | BasicKind::Double)
  }
}

/// A memoized derived-type constructor kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKind {
  /// `base *`.
  Pointer,
  /// `const base`.
  Const,
  /// `volatile base`.
  Volatile,
}

/// A type in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  /// A built-in scalar type.
  Basic(BasicKind),
  /// A pointer to the base type.
  Pointer(TypeRef),
  /// A `const`-qualified base type.
  Const(TypeRef),
  /// A `volatile`-qualified base type.
  Volatile(TypeRef),
  /// A sized array. Emitted as a typedef under `name`.
  Array {
    /// The element type; never itself an array.
    base: TypeRef,
    /// Number of elements, at least 1.
    size: u32,
    /// The typedef name.
    name: NameId,
  },
  /// A function pointer type. Emitted as a typedef under `name`.
  FuncPtr {
    /// The return type.
    ret: TypeRef,
    /// The parameter types.
    args: SmallVec<[TypeRef; 4]>,
    /// The typedef name.
    name: NameId,
  },
  /// A record (struct) type. Fields live on the record declaration,
  /// which this type names; keeping the reference by name rather than
  /// by handle is what keeps the type graph acyclic.
  Record {
    /// The struct name.
    name: NameId,
  },
  /// A swept pool entry. Referencing one is an invariant violation.
  Invalid,
}

impl Type {
  /// The typedef/struct name, for the named type shapes.
  #[must_use] pub fn name_id(&self) -> Option<NameId> {
    match *self {
      Type::Array { name, .. } | Type::FuncPtr { name, .. } | Type::Record { name } => Some(name),
      _ => None,
    }
  }

  /// The base type of pointer, CV and array shapes.
  #[must_use] pub fn base(&self) -> Option<TypeRef> {
    match *self {
      Type::Pointer(b) | Type::Const(b) | Type::Volatile(b) | Type::Array { base: b, .. } => Some(b),
      _ => None,
    }
  }
}

/// The interning pool. Owned by a program; never shared.
#[derive(Debug, Clone)]
pub struct TypePool {
  entries: Vec<Type>,
  derived: HashMap<(DerivedKind, TypeRef), TypeRef>,
  builtin_len: u32,
}

impl TypePool {
  /// Creates an empty pool.
  #[must_use] pub fn new() -> Self {
    TypePool { entries: Vec::new(), derived: HashMap::new(), builtin_len: 0 }
  }

  /// Number of pool entries, including swept ones.
  #[must_use] pub fn len(&self) -> usize { self.entries.len() }

  /// True when the pool holds no entries.
  #[must_use] pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Resolves a handle. Total on every handle the pool ever issued.
  #[must_use] pub fn get(&self, t: TypeRef) -> &Type { &self.entries[t.into_usize()] }

  /// Whether `t` points at a live entry.
  #[must_use] pub fn is_valid(&self, t: TypeRef) -> bool {
    self.entries.get(t.into_usize()).is_some_and(|e| *e != Type::Invalid)
  }

  /// Whether `t` is one of the seeded built-in types.
  #[must_use] pub fn is_builtin(&self, t: TypeRef) -> bool { t.0 < self.builtin_len }

  /// Iterates over all live handles.
  pub fn iter_refs(&self) -> impl Iterator<Item = TypeRef> + '_ {
    (0..self.entries.len()).map(TypeRef::from_usize).filter(|&t| self.is_valid(t))
  }

  /// Whether the top of `t` is `const`.
  #[must_use] pub fn is_const(&self, t: TypeRef) -> bool {
    matches!(self.get(t), Type::Const(_))
  }

  /// Whether the top of `t` is `volatile`.
  #[must_use] pub fn is_volatile(&self, t: TypeRef) -> bool {
    matches!(self.get(t), Type::Volatile(_))
  }

  /// Removes CV qualifiers from the top of `t`.
  #[must_use] pub fn strip_cv(&self, t: TypeRef) -> TypeRef {
    match *self.get(t) {
      Type::Const(b) | Type::Volatile(b) => self.strip_cv(b),
      _ => t,
    }
  }

  /// Whether `t` (after CV stripping) is an integer type.
  #[must_use] pub fn is_int(&self, t: TypeRef) -> bool {
    matches!(self.get(self.strip_cv(t)), Type::Basic(k) if k.is_int())
  }

  /// Whether `t` (after CV stripping) is a floating-point type.
  #[must_use] pub fn is_float(&self, t: TypeRef) -> bool {
    matches!(self.get(self.strip_cv(t)), Type::Basic(k) if k.is_float())
  }

  /// Whether `t` (after CV stripping) is a pointer.
  #[must_use] pub fn is_pointer(&self, t: TypeRef) -> bool {
    matches!(self.get(self.strip_cv(t)), Type::Pointer(_))
  }

  /// Whether `t` (after CV stripping) is an array.
  #[must_use] pub fn is_array(&self, t: TypeRef) -> bool {
    matches!(self.get(self.strip_cv(t)), Type::Array { .. })
  }

  /// Whether a variable of type `t` must be initialized where it is
  /// declared (the type carries `const` somewhere in its spine).
  #[must_use] pub fn expects_var_initializer(&self, t: TypeRef) -> bool {
    match *self.get(t) {
      Type::Const(_) => true,
      Type::Volatile(b) | Type::Array { base: b, .. } => self.expects_var_initializer(b),
      _ => false,
    }
  }

  fn push(&mut self, t: Type) -> TypeRef {
    let r = TypeRef::from_usize(self.entries.len());
    self.entries.push(t);
    r
  }

  /// Returns the memoized derived type `kind` over `base`, creating it
  /// on first request.
  ///
  /// Rejects CV over CV, CV over arrays, and dead bases.
  pub fn get_or_create_derived(&mut self, kind: DerivedKind, base: TypeRef) -> Result<TypeRef> {
    if !self.is_valid(base) {
      return Err(Error::TypeError("derived type over invalid base"));
    }
    if kind != DerivedKind::Pointer {
      if matches!(self.get(base), Type::Const(_) | Type::Volatile(_)) {
        return Err(Error::TypeError("CV qualifiers nest at most once"));
      }
      if matches!(self.get(base), Type::Array { .. }) {
        return Err(Error::TypeError("CV qualifier over array"));
      }
    }
    if let Some(&t) = self.derived.get(&(kind, base)) {
      return Ok(t);
    }
    let t = self.push(match kind {
      DerivedKind::Pointer => Type::Pointer(base),
      DerivedKind::Const => Type::Const(base),
      DerivedKind::Volatile => Type::Volatile(base),
    });
    self.derived.insert((kind, base), t);
    Ok(t)
  }

  /// Adds a non-derived type (array, function pointer, record) under a
  /// fresh id.
  pub fn add_type(&mut self, t: Type) -> Result<TypeRef> {
    match t {
      Type::Array { base, size, .. } => {
        if size == 0 { return Err(Error::TypeError("zero-sized array")) }
        if !self.is_valid(base) { return Err(Error::TypeError("array of invalid type")) }
        if self.is_array(base) { return Err(Error::TypeError("array of array")) }
      }
      Type::FuncPtr { ret, ref args, .. } => {
        if !self.is_valid(ret) || args.iter().any(|&a| !self.is_valid(a)) {
          return Err(Error::TypeError("function pointer over invalid type"));
        }
      }
      Type::Record { .. } => {}
      _ => return Err(Error::TypeError("derived and basic types are interned elsewhere")),
    }
    Ok(self.push(t))
  }

  /// Retargets an array's element type. Fails when the result would
  /// break the array rules. The new base must predate the array in the
  /// pool, which keeps creation order topological for emission.
  pub fn set_array_base(&mut self, t: TypeRef, new_base: TypeRef) -> Result<()> {
    if !self.is_valid(new_base) || self.is_array(new_base) || new_base >= t {
      return Err(Error::TypeError("bad array base"));
    }
    match &mut self.entries[t.into_usize()] {
      Type::Array { base, .. } => { *base = new_base; Ok(()) }
      _ => Err(Error::TypeError("not an array")),
    }
  }

  /// Resizes an array type in place.
  pub fn set_array_size(&mut self, t: TypeRef, new_size: u32) -> Result<()> {
    if new_size == 0 { return Err(Error::TypeError("zero-sized array")) }
    match &mut self.entries[t.into_usize()] {
      Type::Array { size, .. } => { *size = new_size; Ok(()) }
      _ => Err(Error::TypeError("not an array")),
    }
  }

  /// Marks `t` and everything reachable from it in `marked`.
  pub fn mark(&self, t: TypeRef, marked: &mut BitSet) {
    if !marked.insert(t.into_usize()) { return }
    match self.get(t) {
      Type::Pointer(b) | Type::Const(b) | Type::Volatile(b) => self.mark(*b, marked),
      Type::Array { base, .. } => self.mark(*base, marked),
      Type::FuncPtr { ret, args, .. } => {
        self.mark(*ret, marked);
        for &a in args { self.mark(a, marked) }
      }
      _ => {}
    }
  }

  /// Sweeps every unmarked non-builtin entry to [`Type::Invalid`] and
  /// purges stale memo entries. Handles are not reassigned. Returns
  /// the number of swept entries.
  pub fn sweep(&mut self, marked: &BitSet) -> usize {
    let mut swept = 0;
    for i in self.builtin_len as usize..self.entries.len() {
      if !marked.contains(i) && self.entries[i] != Type::Invalid {
        self.entries[i] = Type::Invalid;
        swept += 1;
      }
    }
    if swept > 0 {
      let entries = &self.entries;
      self.derived.retain(|&(_, base), &mut t| {
        entries[base.into_usize()] != Type::Invalid && entries[t.into_usize()] != Type::Invalid
      });
    }
    swept
  }

  /// Overwrites a single entry with [`Type::Invalid`] and purges memo
  /// entries that referenced it. Builtin entries are left alone.
  pub fn invalidate(&mut self, t: TypeRef) {
    if self.is_builtin(t) { return }
    self.entries[t.into_usize()] = Type::Invalid;
    let entries = &self.entries;
    self.derived.retain(|&(_, base), &mut v| {
      entries[base.into_usize()] != Type::Invalid && entries[v.into_usize()] != Type::Invalid
    });
  }

  fn freeze_builtins(&mut self) {
    self.builtin_len = u32::try_from(self.entries.len()).expect("type id overflow");
  }
}

impl Default for TypePool {
  fn default() -> Self { Self::new() }
}

/// Handles to the seeded built-in types.
#[derive(Debug, Clone)]
pub struct BuiltinTypes {
  /// `void`.
  pub void: TypeRef,
  /// `char`.
  pub char_ty: TypeRef,
  /// `int`, also used as the boolean result type.
  pub signed_int: TypeRef,
  /// `unsigned int`.
  pub unsigned_int: TypeRef,
  /// `unsigned long`, standing in for `size_t`.
  pub size_t: TypeRef,
  /// `void *`.
  pub void_ptr: TypeRef,
  /// `const char *`, the type of string literals.
  pub const_char_ptr: TypeRef,
  /// All integer types, for uniform draws.
  pub int_types: Vec<TypeRef>,
  /// All floating-point types, for uniform draws.
  pub float_types: Vec<TypeRef>,
}

impl BuiltinTypes {
  /// Seeds the pool with the built-in types. Must run on an empty pool
  /// so that `void` lands on [`TypeRef::VOID`].
  pub fn seed(pool: &mut TypePool) -> Self {
    assert!(pool.is_empty(), "builtins must be seeded first");
    let mut basic = |k| pool.push(Type::Basic(k));
    let void = basic(BasicKind::Void);
    debug_assert_eq!(void, TypeRef::VOID);
    let char_ty = basic(BasicKind::Char);
    let int_types: Vec<TypeRef> = [
      BasicKind::Char, BasicKind::SignedChar, BasicKind::UnsignedChar,
      BasicKind::Short, BasicKind::UnsignedShort, BasicKind::Int,
      BasicKind::UnsignedInt, BasicKind::Long, BasicKind::UnsignedLong,
      BasicKind::LongLong, BasicKind::UnsignedLongLong,
    ].iter().map(|&k| if k == BasicKind::Char { char_ty } else { pool.push(Type::Basic(k)) })
      .collect();
    let float_types = vec![pool.push(Type::Basic(BasicKind::Float)), pool.push(Type::Basic(BasicKind::Double))];
    let signed_int = int_types[5];
    let unsigned_int = int_types[6];
    let size_t = int_types[8];
    let void_ptr = pool.get_or_create_derived(DerivedKind::Pointer, void).expect("seed");
    let const_char = pool.get_or_create_derived(DerivedKind::Const, char_ty).expect("seed");
    let const_char_ptr = pool.get_or_create_derived(DerivedKind::Pointer, const_char).expect("seed");
    pool.freeze_builtins();
    BuiltinTypes {
      void, char_ty, signed_int, unsigned_int, size_t, void_ptr, const_char_ptr,
      int_types, float_types,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn seeded() -> (TypePool, BuiltinTypes) {
    let mut pool = TypePool::new();
    let b = BuiltinTypes::seed(&mut pool);
    (pool, b)
  }

  #[test]
  fn derived_types_are_memoized() {
    let (mut pool, b) = seeded();
    let p1 = pool.get_or_create_derived(DerivedKind::Pointer, b.signed_int).unwrap();
    let p2 = pool.get_or_create_derived(DerivedKind::Pointer, b.signed_int).unwrap();
    assert_eq!(p1, p2);
    let c = pool.get_or_create_derived(DerivedKind::Const, b.signed_int).unwrap();
    assert_ne!(p1, c);
  }

  #[test]
  fn cv_rules() {
    let (mut pool, b) = seeded();
    let c = pool.get_or_create_derived(DerivedKind::Const, b.signed_int).unwrap();
    assert!(pool.get_or_create_derived(DerivedKind::Volatile, c).is_err());
    assert!(pool.get_or_create_derived(DerivedKind::Const, c).is_err());
    // But pointers can stack freely.
    let p = pool.get_or_create_derived(DerivedKind::Pointer, c).unwrap();
    assert!(pool.get_or_create_derived(DerivedKind::Pointer, p).is_ok());
    assert_eq!(pool.strip_cv(c), b.signed_int);
  }

  #[test]
  fn no_array_of_array() {
    let (mut pool, b) = seeded();
    let name = NameId::from_usize(0);
    let arr = pool.add_type(Type::Array { base: b.signed_int, size: 4, name }).unwrap();
    assert!(pool.add_type(Type::Array { base: arr, size: 2, name }).is_err());
    assert!(pool.get_or_create_derived(DerivedKind::Const, arr).is_err());
  }

  #[test]
  fn sweep_keeps_builtins_and_ids() {
    let (mut pool, b) = seeded();
    let name = NameId::from_usize(0);
    let arr = pool.add_type(Type::Array { base: b.signed_int, size: 4, name }).unwrap();
    let keep = pool.add_type(Type::Array { base: b.char_ty, size: 2, name }).unwrap();
    let mut marked = BitSet::new();
    pool.mark(keep, &mut marked);
    assert_eq!(pool.sweep(&marked), 1);
    assert!(!pool.is_valid(arr));
    assert!(pool.is_valid(keep));
    assert!(pool.is_valid(b.void_ptr));
    // Ids are stable across the sweep.
    assert!(matches!(pool.get(keep), Type::Array { size: 2, .. }));
  }

  #[test]
  fn expects_initializer() {
    let (mut pool, b) = seeded();
    let c = pool.get_or_create_derived(DerivedKind::Const, b.signed_int).unwrap();
    let name = NameId::from_usize(0);
    let arr_c = pool.add_type(Type::Array { base: c, size: 3, name }).unwrap();
    assert!(pool.expects_var_initializer(c));
    assert!(pool.expects_var_initializer(arr_c));
    assert!(!pool.expects_var_initializer(b.signed_int));
  }
}
