//! Core of a differential/sanitizer-oriented fuzzer that grows and
//! shrinks small C/C++ programs to elicit miscompilations or
//! undefined-behavior findings from an external oracle.
//!
//! The crate owns the in-memory program model ([`program::Program`]),
//! the random generator/mutator ([`mutator`]), the canonicalizer and
//! simplifier used by the reducer, and the feedback-driven
//! [`scheduler`]. Everything that talks to the outside world (oracle
//! subprocess, UI, persistence) lives in the surrounding driver and
//! reaches the core only through a feedback callback, a text sink and
//! an explicit entropy source.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::semicolon_if_nothing_returned, clippy::redundant_closure_for_method_calls)]

use std::fmt;

pub mod rng;
pub mod idents;
pub mod types;
pub mod builtins;
pub mod ast;
pub mod program;
pub mod strategy;
pub mod mutator;
pub mod print;
pub mod scheduler;

pub use idents::NameId;
pub use types::TypeRef;

/// The language standard a generated program targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standard {
  /// ISO C 1999.
  C99,
  /// ISO C 2011.
  C11,
  /// ISO C++ 2011.
  #[default]
  Cxx11,
  /// ISO C++ 2014.
  Cxx14,
  /// ISO C++ 2017.
  Cxx17,
  /// ISO C++ 2020.
  Cxx20,
}

/// Language options shared by the generator and the pretty-printer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LangOpts {
  /// The targeted language standard.
  pub standard: Standard,
}

impl LangOpts {
  /// Whether the selected standard is a C++ dialect.
  #[must_use] pub fn is_cxx(&self) -> bool {
    matches!(self.standard, Standard::Cxx11 | Standard::Cxx14 | Standard::Cxx17 | Standard::Cxx20)
  }
}

/// Errors surfaced across the core's public boundaries.
///
/// A reached recursion limit is *not* an error: the generator returns
/// a legal placeholder instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
  /// A structural invariant does not hold. This means a mutation went
  /// wrong; the scheduler discards the offending clone.
  InvariantViolation(String),
  /// A type combination the interner disallows was requested.
  TypeError(&'static str),
  /// `try_change_id` rejected a rename.
  RenameConflict,
  /// The pretty-printer could not serialize the program.
  PrintError(String),
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Error::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
      Error::TypeError(msg) => write!(f, "type error: {msg}"),
      Error::RenameConflict => write!(f, "identifier rename conflict"),
      Error::PrintError(msg) => write!(f, "print error: {msg}"),
    }
  }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
