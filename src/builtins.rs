//! The builtin C-library function registry.
//!
//! The generator biases programs towards calls into a fixed set of
//! well-known library functions, because that is where sanitizers and
//! optimizers have the most special-case knowledge to get wrong.
//! Builtins are installed lazily as external declarations with fixed
//! identifiers; the printer emits them as prototypes only.

use smallvec::SmallVec;

use crate::types::{BuiltinTypes, DerivedKind, TypePool, TypeRef};

macro_rules! make_prims {
  {$($(#[$attr0:meta])* enum $name:ident {
    $($(#[$attr:meta])* $x:ident: $e:expr,)*
  })* } => {
    $(
      $(#[$attr0])*
      #[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
      pub enum $name { $($(#[$attr])* $x),* }

      impl $name {
        /// All elements of the type, in declaration order.
        pub const ALL: &'static [$name] = &[$($name::$x),*];

        /// Evaluate a function on all elements of the type, with their names.
        pub fn scan(#[allow(unused)] mut f: impl FnMut(Self, &'static str)) {
          $(f($name::$x, $e);)*
        }

        /// Convert a string into this type.
        #[allow(clippy::should_implement_trait)]
        #[must_use] pub fn from_str(s: &str) -> Option<Self> {
          match s {
            $($e => Some(Self::$x),)*
            _ => None
          }
        }

        /// The C name of this element.
        #[must_use] pub fn as_str(self) -> &'static str {
          match self { $($name::$x => $e),* }
        }
      }
    )*
  }
}

make_prims! {
  /// The builtin library functions the generator may call.
  enum BuiltinFunc {
    /// `void *malloc(size_t)`.
    Malloc: "malloc",
    /// `void free(void *)`.
    Free: "free",
    /// `void *calloc(size_t, size_t)`.
    Calloc: "calloc",
    /// `void *realloc(void *, size_t)`.
    Realloc: "realloc",
    /// `void *alloca(size_t)`.
    Alloca: "alloca",
    /// `void *memmove(void *, void *, size_t)`.
    MemMove: "memmove",
    /// `void *memcpy(void *, void *, size_t)`.
    MemCpy: "memcpy",
    /// `void *memchr(void *, int, size_t)`.
    MemChr: "memchr",
    /// `int memcmp(void *, void *, size_t)`.
    MemCmp: "memcmp",
    /// `void *memset(void *, int, size_t)`.
    MemSet: "memset",
    /// `int strcmp(const char *, const char *)`.
    StrCmp: "strcmp",
    /// `int strncmp(const char *, const char *, size_t)`.
    StrNCmp: "strncmp",
    /// `char *strstr(const char *, const char *)`.
    StrStr: "strstr",
    /// `char *strcasestr(const char *, const char *)`.
    StrCaseStr: "strcasestr",
    /// `char *strcpy(char *, const char *)`.
    StrCpy: "strcpy",
    /// `char *strncpy(char *, const char *, size_t)`.
    StrNCpy: "strncpy",
    /// `size_t strlen(const char *)`.
    Strlen: "strlen",
    /// `size_t strnlen(const char *, size_t)`.
    StrNlen: "strnlen",
    /// `void exit(int)`.
    Exit: "exit",
    /// `void abort(void)`.
    Abort: "abort",
    /// `int printf(const char *, ...)`, variadic.
    Printf: "printf",
  }
}

/// A builtin's C prototype: return type, parameter types, variadic flag.
pub struct BuiltinSig {
  /// The return type.
  pub ret: TypeRef,
  /// The fixed parameter types.
  pub params: SmallVec<[TypeRef; 4]>,
  /// Whether extra arguments may follow.
  pub variadic: bool,
}

impl BuiltinFunc {
  /// The canonical prototype, built from the seeded builtin types.
  /// May intern the (memoized) `char *` pointer type.
  pub fn signature(self, pool: &mut TypePool, bt: &BuiltinTypes) -> BuiltinSig {
    let char_ptr = pool.get_or_create_derived(DerivedKind::Pointer, bt.char_ty)
      .expect("char pointer");
    let sig = |ret, params: &[TypeRef], variadic| BuiltinSig {
      ret, params: SmallVec::from_slice(params), variadic,
    };
    match self {
      BuiltinFunc::Malloc | BuiltinFunc::Alloca => sig(bt.void_ptr, &[bt.size_t], false),
      BuiltinFunc::Free => sig(bt.void, &[bt.void_ptr], false),
      BuiltinFunc::Calloc => sig(bt.void_ptr, &[bt.size_t, bt.size_t], false),
      BuiltinFunc::Realloc => sig(bt.void_ptr, &[bt.void_ptr, bt.size_t], false),
      BuiltinFunc::MemMove | BuiltinFunc::MemCpy =>
        sig(bt.void_ptr, &[bt.void_ptr, bt.void_ptr, bt.size_t], false),
      BuiltinFunc::MemChr => sig(bt.void_ptr, &[bt.void_ptr, bt.signed_int, bt.size_t], false),
      BuiltinFunc::MemCmp => sig(bt.signed_int, &[bt.void_ptr, bt.void_ptr, bt.size_t], false),
      BuiltinFunc::MemSet => sig(bt.void_ptr, &[bt.void_ptr, bt.signed_int, bt.size_t], false),
      BuiltinFunc::StrCmp => sig(bt.signed_int, &[bt.const_char_ptr, bt.const_char_ptr], false),
      BuiltinFunc::StrNCmp =>
        sig(bt.signed_int, &[bt.const_char_ptr, bt.const_char_ptr, bt.size_t], false),
      BuiltinFunc::StrStr | BuiltinFunc::StrCaseStr =>
        sig(char_ptr, &[bt.const_char_ptr, bt.const_char_ptr], false),
      BuiltinFunc::StrCpy => sig(char_ptr, &[char_ptr, bt.const_char_ptr], false),
      BuiltinFunc::StrNCpy => sig(char_ptr, &[char_ptr, bt.const_char_ptr, bt.size_t], false),
      BuiltinFunc::Strlen => sig(bt.size_t, &[bt.const_char_ptr], false),
      BuiltinFunc::StrNlen => sig(bt.size_t, &[bt.const_char_ptr, bt.size_t], false),
      BuiltinFunc::Exit => sig(bt.void, &[bt.signed_int], false),
      BuiltinFunc::Abort => sig(bt.void, &[], false),
      BuiltinFunc::Printf => sig(bt.signed_int, &[bt.const_char_ptr], true),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip() {
    BuiltinFunc::scan(|k, name| {
      assert_eq!(BuiltinFunc::from_str(name), Some(k));
      assert_eq!(k.as_str(), name);
    });
    assert_eq!(BuiltinFunc::from_str("nosuchfn"), None);
    assert_eq!(BuiltinFunc::ALL.len(), 21);
  }

  #[test]
  fn signatures_resolve() {
    let mut pool = TypePool::new();
    let bt = BuiltinTypes::seed(&mut pool);
    for &k in BuiltinFunc::ALL {
      let sig = k.signature(&mut pool, &bt);
      assert!(pool.is_valid(sig.ret) || sig.ret == bt.void);
      assert!(sig.params.iter().all(|&p| pool.is_valid(p)));
    }
    let printf = BuiltinFunc::Printf.signature(&mut pool, &bt);
    assert!(printf.variadic);
  }
}
