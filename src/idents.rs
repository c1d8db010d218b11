//! The identifier table.
//!
//! Every name in a program is an interned [`NameId`]; declarations,
//! statements and types cross-reference each other through these
//! handles and never through strings. The table distinguishes *fixed*
//! identifiers (reserved names like `main` or `malloc` that mutations
//! must not rename) from mutable ones.

use bit_vec::BitVec;
use hashbrown::HashMap;

use crate::builtins::BuiltinFunc;
use crate::{Error, Result};

/// An interned identifier handle. Only meaningful together with the
/// [`IdentTable`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
  /// Converts into an index.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
  /// Converts from an index.
  #[must_use] pub fn from_usize(n: usize) -> Self { NameId(u32::try_from(n).expect("id overflow")) }
}

/// Keywords that are never valid identifiers, in any supported dialect.
const C_KEYWORDS: &[&str] = &[
  "auto", "break", "case", "char", "const", "continue", "default", "do",
  "double", "else", "enum", "extern", "float", "for", "goto", "if", "inline",
  "int", "long", "register", "restrict", "return", "short", "signed",
  "sizeof", "static", "struct", "switch", "typedef", "union", "unsigned",
  "void", "volatile", "while",
];

/// Additional keywords reserved by the C++ dialects.
const CXX_KEYWORDS: &[&str] = &[
  "bool", "catch", "class", "delete", "false", "friend", "new", "namespace",
  "noexcept", "nullptr", "operator", "private", "protected", "public",
  "template", "this", "throw", "true", "try", "typename", "using", "virtual",
];

/// Maximum length of a generated identifier.
const MAX_NAME_LEN: usize = 64;

/// The bidirectional `NameId` ↔ string table owned by a program.
#[derive(Debug, Clone)]
pub struct IdentTable {
  names: Vec<Box<str>>,
  ids: HashMap<Box<str>, NameId>,
  fixed: BitVec,
  cxx: bool,
}

impl IdentTable {
  /// Creates an empty table. `cxx` widens the reserved-keyword set.
  #[must_use] pub fn new(cxx: bool) -> Self {
    IdentTable { names: Vec::new(), ids: HashMap::new(), fixed: BitVec::new(), cxx }
  }

  /// Number of interned identifiers.
  #[must_use] pub fn len(&self) -> usize { self.names.len() }

  /// True when no identifier has been interned yet.
  #[must_use] pub fn is_empty(&self) -> bool { self.names.is_empty() }

  /// The highest id issued so far, if any.
  #[must_use] pub fn last_id(&self) -> Option<NameId> {
    self.names.len().checked_sub(1).map(NameId::from_usize)
  }

  /// Whether `id` was issued by this table.
  #[must_use] pub fn is_valid_id(&self, id: NameId) -> bool {
    id.into_usize() < self.names.len()
  }

  /// The textual name behind an id.
  #[must_use] pub fn name(&self, id: NameId) -> &str { &self.names[id.into_usize()] }

  /// Looks up an id by its textual name.
  #[must_use] pub fn id_of(&self, name: &str) -> Option<NameId> {
    self.ids.get(name).copied()
  }

  /// Whether the textual name is already interned.
  #[must_use] pub fn has_name(&self, name: &str) -> bool { self.ids.contains_key(name) }

  /// Whether `id` is fixed (reserved; renames are rejected).
  #[must_use] pub fn is_fixed(&self, id: NameId) -> bool {
    self.fixed.get(id.into_usize()).unwrap_or(false)
  }

  fn push(&mut self, name: String, fixed: bool) -> NameId {
    let id = NameId::from_usize(self.names.len());
    let name: Box<str> = name.into();
    self.ids.insert(name.clone(), id);
    self.names.push(name);
    self.fixed.push(fixed);
    id
  }

  /// Interns a fresh mutable identifier.
  ///
  /// The textual name is `prefix` itself when free, otherwise `prefix`
  /// plus a monotonically increasing suffix.
  pub fn make_new_id(&mut self, prefix: &str) -> NameId {
    debug_assert!(self.is_valid_name(prefix), "bad id prefix {prefix:?}");
    if !self.has_name(prefix) {
      return self.push(prefix.to_owned(), false);
    }
    let mut n = self.names.len();
    loop {
      let candidate = format!("{prefix}{n}");
      if !self.has_name(&candidate) {
        return self.push(candidate, false);
      }
      n += 1;
    }
  }

  /// Interns a fixed identifier with exactly the given name.
  ///
  /// Used for reserved names (`main`, builtin library functions). The
  /// name must not be taken yet.
  pub fn make_fixed_id(&mut self, name: &str) -> NameId {
    assert!(!self.has_name(name), "fixed identifier {name:?} already taken");
    self.push(name.to_owned(), true)
  }

  /// Renames `id` to `new_name`.
  ///
  /// Fails with [`Error::RenameConflict`] when the new name is taken,
  /// syntactically invalid for the dialect, or `id` is fixed.
  pub fn try_change_id(&mut self, id: NameId, new_name: &str) -> Result<()> {
    if self.is_fixed(id) || self.has_name(new_name) || !self.is_valid_name(new_name) {
      return Err(Error::RenameConflict);
    }
    let old = std::mem::replace(&mut self.names[id.into_usize()], new_name.into());
    self.ids.remove(&old);
    self.ids.insert(new_name.into(), id);
    Ok(())
  }

  /// Whether `s` is a valid identifier: alphanumerics and underscores,
  /// not starting with a digit, length-bounded, and not a keyword of
  /// the target dialect.
  #[must_use] pub fn is_valid_name(&self, s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_NAME_LEN { return false }
    let mut chars = s.chars();
    let first = chars.next().expect("nonempty");
    if !(first.is_ascii_alphabetic() || first == '_') { return false }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') { return false }
    if C_KEYWORDS.contains(&s) { return false }
    if self.cxx && CXX_KEYWORDS.contains(&s) { return false }
    // Builtin library functions keep their names to themselves.
    if BuiltinFunc::from_str(s).is_some() { return false }
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_ids_are_unique() {
    let mut t = IdentTable::new(false);
    let a = t.make_new_id("var");
    let b = t.make_new_id("var");
    let c = t.make_new_id("var");
    assert_ne!(t.name(a), t.name(b));
    assert_ne!(t.name(b), t.name(c));
    assert_eq!(t.name(a), "var");
  }

  #[test]
  fn rename_discipline() {
    let mut t = IdentTable::new(true);
    let main = t.make_fixed_id("main");
    let v = t.make_new_id("v");
    assert_eq!(t.try_change_id(main, "other"), Err(Error::RenameConflict));
    assert_eq!(t.try_change_id(v, "main"), Err(Error::RenameConflict));
    assert_eq!(t.try_change_id(v, "2bad"), Err(Error::RenameConflict));
    assert_eq!(t.try_change_id(v, "while"), Err(Error::RenameConflict));
    assert!(t.try_change_id(v, "renamed").is_ok());
    assert_eq!(t.name(v), "renamed");
    assert_eq!(t.id_of("renamed"), Some(v));
    assert_eq!(t.id_of("v"), None);
  }

  #[test]
  fn name_validity() {
    let t = IdentTable::new(true);
    assert!(t.is_valid_name("x"));
    assert!(t.is_valid_name("_x9"));
    assert!(!t.is_valid_name(""));
    assert!(!t.is_valid_name("9x"));
    assert!(!t.is_valid_name("a-b"));
    assert!(!t.is_valid_name("try"));
    assert!(!t.is_valid_name(&"a".repeat(65)));
    assert!(IdentTable::new(false).is_valid_name("try"));
  }
}
