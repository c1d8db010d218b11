//! The literal maker: constants for a requested type.
//!
//! Integer and float specials are precomputed powers of two and their
//! neighbors, the values where width bugs, carry bugs and
//! sign-extension bugs live.

use crate::ast::Statement;
use crate::rng::RngSource;
use crate::strategy::Frag;
use crate::types::{DerivedKind, Type, TypeRef};

use super::MutatorData;

/// Charset for generated string literals.
const STRING_CHARS: &str = "abcdefghZSDF0123456789 ";

pub(crate) struct LiteralMaker {
  special_ints: Vec<Box<str>>,
  special_floats: Vec<Box<str>>,
}

impl LiteralMaker {
  pub(crate) fn new() -> Self {
    let mut lm = LiteralMaker { special_ints: Vec::new(), special_floats: Vec::new() };
    lm.setup_integers();
    lm.setup_floats();
    lm
  }

  fn setup_integers(&mut self) {
    self.special_ints.push("0".into());
    let mut v: u64 = 1;
    for _ in 0..=64 {
      self.special_ints.push(format!("{v}ULL").into());
      self.special_ints.push(format!("{}ULL", v.wrapping_add(1)).into());
      self.special_ints.push(format!("{}ULL", v.wrapping_sub(1)).into());
      v = v.wrapping_mul(2);
    }
    let mut s: i64 = -1;
    for _ in 0..=62 {
      self.special_ints.push(format!("({s}LL)").into());
      self.special_ints.push(format!("({}LL)", s.wrapping_add(1)).into());
      self.special_ints.push(format!("({}LL)", s.wrapping_sub(1)).into());
      s = s.wrapping_mul(2);
    }
  }

  fn setup_floats(&mut self) {
    self.special_floats.push("0.0".into());
    let mut v: u64 = 1;
    for _ in 0..=64 {
      self.special_floats.push(format!("{v}.0").into());
      self.special_floats.push(format!("{}.0", v.wrapping_add(1)).into());
      self.special_floats.push(format!("{}.0", v.wrapping_sub(1)).into());
      v = v.wrapping_mul(2);
    }
  }

  /// A special integer spelling, for callers outside a mutation step.
  pub(crate) fn special_int(&self, rng: &mut RngSource) -> Box<str> {
    rng.pick(&self.special_ints).clone()
  }

  /// A constant literal of the given type, wrapped in a cast so that
  /// the spelled value lands in the requested representation.
  /// Array-typed requests decay to the element-pointer type.
  pub(crate) fn make_constant(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Statement {
    let t = if let Type::Array { base, .. } = *cx.p.types().get(cx.p.types().strip_cv(t)) {
      cx.p.types_mut().get_or_create_derived(DerivedKind::Pointer, base)
        .expect("pointer over array base")
    } else { t };
    let text = self.make_constant_str(cx, t);
    Statement::Cast { ty: t, arg: Box::new(Statement::Constant { text, ty: t }) }
  }

  fn make_constant_str(&self, cx: &mut MutatorData<'_>, t: TypeRef) -> Box<str> {
    let t = cx.p.types().strip_cv(t);
    debug_assert!(t != cx.p.builtin().void, "void literal requested");
    if cx.p.types().is_int(t) { return cx.rng.pick(&self.special_ints).clone() }
    if cx.p.types().is_float(t) { return cx.rng.pick(&self.special_floats).clone() }
    enum Shape { Ptr, FuncPtr, Array, Record }
    let shape = match cx.p.types().get(t) {
      Type::Pointer(_) => Shape::Ptr,
      Type::FuncPtr { .. } => Shape::FuncPtr,
      Type::Array { .. } => Shape::Array,
      Type::Record { .. } => Shape::Record,
      _ => unreachable!("literal requested for unsupported type"),
    };
    match shape {
      Shape::Ptr => {
        if t == cx.p.builtin().const_char_ptr && cx.decision(Frag::EmitStringLiteral) {
          let mut res = String::from("\"");
          if !cx.decision(Frag::EmitEmptyStringLiteral) {
            for _ in 0..cx.rng.below(10) {
              res.push(cx.rng.pick_char(STRING_CHARS));
            }
          }
          res.push('"');
          return res.into();
        }
        (*cx.rng.pick(&["0", "-1", "1"])).into()
      }
      Shape::FuncPtr => (*cx.rng.pick(&["0", "-1"])).into(),
      Shape::Array => (*cx.rng.pick(&["{0}", "{1, 2}", "{}", "{1}"])).into(),
      Shape::Record => (*cx.rng.pick(&["{0}", "{}"])).into(),
    }
  }
}
