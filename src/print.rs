//! The pretty-printer: [`Program`] → C/C++ source text.
//!
//! Emission order is chosen so that every forward reference is legal
//! regardless of declaration-storage order: typedefs and struct
//! definitions first (type-pool order is creation order, which is
//! topological), then prototypes for every function, then globals,
//! then function definitions.
//!
//! The output is wrapped in the oracle harness: a leading
//! `#define main wrap_main` and a trailing real `main` that calls the
//! renamed one, shielding the oracle from buggy `main` return paths.

use std::fmt::Write;

use itertools::Itertools;

use crate::ast::Statement;
use crate::program::{Decl, FnFlags, Function, Program, Weight};
use crate::types::{Type, TypeRef};
use crate::{Error, Result};

/// Text prepended to every printed program.
const PREFIX: &str = "#define main wrap_main\n";

/// Text appended to every printed program.
const SUFFIX: &str = "#undef main\n\
  int main(int argc, char **argv) {\n  \
  int res = wrap_main(argc, argv);\n  \
  return argc == 0 ? res : 0;\n\
  }\n";

/// Prints the program to the sink.
pub fn print(p: &Program, out: &mut impl Write) -> Result<()> {
  let mut printer = Printer { p, buf: String::new() };
  printer.run()?;
  out.write_str(&printer.buf).map_err(|_| Error::PrintError("sink write failed".into()))
}

/// Prints the program into a fresh string.
pub fn print_to_string(p: &Program) -> Result<String> {
  let mut out = String::new();
  print(p, &mut out)?;
  Ok(out)
}

impl Program {
  /// Convenience wrapper around [`print`].
  pub fn print(&self, out: &mut impl Write) -> Result<()> { print(self, out) }

  /// Convenience wrapper around [`print_to_string`].
  pub fn to_source(&self) -> Result<String> { print_to_string(self) }
}

struct Printer<'a> {
  p: &'a Program,
  buf: String,
}

impl Printer<'_> {
  fn run(&mut self) -> Result<()> {
    self.buf.push_str(PREFIX);
    self.types()?;
    self.prototypes()?;
    self.globals()?;
    self.definitions()?;
    self.buf.push_str(SUFFIX);
    Ok(())
  }

  fn err(msg: &str) -> Error { Error::PrintError(msg.into()) }

  /// The C spelling of a type at a use site.
  fn type_name(&self, t: TypeRef) -> Result<String> {
    let pool = self.p.types();
    Ok(match pool.get(t) {
      Type::Invalid => return Err(Self::err("reference to invalid type")),
      Type::Basic(k) => k.as_str().to_owned(),
      Type::Pointer(b) => format!("{} *", self.type_name(*b)?),
      Type::Const(b) => format!("const {}", self.type_name(*b)?),
      Type::Volatile(b) => format!("volatile {}", self.type_name(*b)?),
      Type::Array { name, .. } | Type::FuncPtr { name, .. } | Type::Record { name } =>
        self.p.idents().name(*name).to_owned(),
    })
  }

  /// Typedefs and struct definitions, in pool (creation) order.
  fn types(&mut self) -> Result<()> {
    for t in self.p.types().iter_refs().collect::<Vec<_>>() {
      match self.p.types().get(t).clone() {
        Type::Array { base, size, name } => {
          let base = self.type_name(base)?;
          let name = self.p.idents().name(name);
          writeln!(self.buf, "typedef {base} {name}[{size}];").expect("string write");
        }
        Type::FuncPtr { ret, args, name } => {
          let ret = self.type_name(ret)?;
          let name = self.p.idents().name(name).to_owned();
          let args = if args.is_empty() {
            "void".to_owned()
          } else {
            args.iter().map(|&a| self.type_name(a)).collect::<Result<Vec<_>>>()?
              .into_iter().format(", ").to_string()
          };
          writeln!(self.buf, "typedef {ret} (*{name})({args});").expect("string write");
        }
        Type::Record { name } => {
          let r = self.p.find_record(name)
            .ok_or_else(|| Self::err("record type without declaration"))?;
          let mut fields = String::new();
          for fld in &r.fields {
            let ty = self.type_name(fld.ty)?;
            write!(fields, " {} {};", ty, self.p.idents().name(fld.name))
              .expect("string write");
          }
          let name = self.p.idents().name(name);
          writeln!(self.buf, "typedef struct {{{fields} }} {name};").expect("string write");
        }
        _ => {}
      }
    }
    Ok(())
  }

  fn signature(&self, f: &Function) -> Result<String> {
    let mut sig = String::new();
    if f.flags.contains(FnFlags::STATIC) { sig.push_str("static ") }
    match f.weight {
      Weight::None => {}
      Weight::Hot => sig.push_str("__attribute__((hot)) "),
      Weight::Cold => sig.push_str("__attribute__((cold)) "),
    }
    if let Some(cc) = f.conv {
      write!(sig, "__attribute__(({})) ", cc.as_str()).expect("string write");
    }
    for attr in &f.attrs {
      write!(sig, "{attr} ").expect("string write");
    }
    write!(sig, "{} {}(", self.type_name(f.ret)?, self.p.idents().name(f.name))
      .expect("string write");
    if f.params.is_empty() && !f.is_variadic() {
      sig.push_str("void");
    } else {
      let params = f.params.iter()
        .map(|v| Ok(format!("{} {}", self.type_name(v.ty)?, self.p.idents().name(v.name))))
        .collect::<Result<Vec<_>>>()?;
      sig.push_str(&params.into_iter().format(", ").to_string());
      if f.is_variadic() { sig.push_str(", ...") }
    }
    sig.push(')');
    if f.flags.contains(FnFlags::NOEXCEPT) && self.p.opts().is_cxx() {
      sig.push_str(" noexcept");
    }
    Ok(sig)
  }

  fn prototypes(&mut self) -> Result<()> {
    for d in self.p.decls() {
      if let Decl::Function(f) = d {
        let sig = self.signature(f)?;
        writeln!(self.buf, "{sig};").expect("string write");
      }
    }
    Ok(())
  }

  fn globals(&mut self) -> Result<()> {
    for d in self.p.decls() {
      if let Decl::Global(g) = d {
        let mut line = String::new();
        if g.is_static { line.push_str("static ") }
        write!(line, "{} {}", self.type_name(g.var.ty)?, self.p.idents().name(g.var.name))
          .expect("string write");
        if let Some(init) = &g.init {
          write!(line, " = {}", self.expr(init)?).expect("string write");
        }
        writeln!(self.buf, "{line};").expect("string write");
      }
    }
    Ok(())
  }

  fn definitions(&mut self) -> Result<()> {
    for d in self.p.decls() {
      if let Decl::Function(f) = d {
        if f.is_external() { continue }
        let sig = self.signature(f)?;
        let mut body = String::new();
        self.block(&mut body, &f.body, 0)?;
        writeln!(self.buf, "{sig} {body}").expect("string write");
      }
    }
    Ok(())
  }

  fn indent(out: &mut String, level: usize) {
    for _ in 0..level { out.push_str("  ") }
  }

  /// Prints a statement (without leading indentation; `level` governs
  /// the children).
  fn stmt(&self, out: &mut String, s: &Statement, level: usize) -> Result<()> {
    match s {
      Statement::Empty => out.push(';'),
      Statement::Compound(children) => {
        out.push_str("{\n");
        for c in children {
          Self::indent(out, level + 1);
          self.stmt(out, c, level + 1)?;
          out.push('\n');
        }
        Self::indent(out, level);
        out.push('}');
      }
      Statement::If { cond, body } => {
        write!(out, "if ({}) ", self.expr(cond)?).expect("string write");
        self.stmt(out, body, level)?;
      }
      Statement::While { cond, body } => {
        write!(out, "while ({}) ", self.expr(cond)?).expect("string write");
        self.stmt(out, body, level)?;
      }
      Statement::Return(e) => {
        write!(out, "return {};", self.expr(e)?).expect("string write");
      }
      Statement::VoidReturn => out.push_str("return;"),
      Statement::Break => out.push_str("break;"),
      Statement::VarDecl { ty, name } => {
        write!(out, "{} {};", self.type_name(*ty)?, self.p.idents().name(*name))
          .expect("string write");
      }
      Statement::VarDef { ty, name, init } => {
        write!(out, "{} {} = {};", self.type_name(*ty)?, self.p.idents().name(*name),
          self.expr(init)?).expect("string write");
      }
      Statement::Asm(text) => {
        write!(out, "__asm__(\"{text}\");").expect("string write");
      }
      Statement::Try { body, catches } => {
        out.push_str("try ");
        self.block(out, body, level)?;
        for c in catches {
          out.push(' ');
          self.stmt(out, c, level)?;
        }
      }
      Statement::Catch { ty, name, body } => {
        write!(out, "catch ({} {}) ", self.type_name(*ty)?, self.p.idents().name(*name))
          .expect("string write");
        self.block(out, body, level)?;
      }
      Statement::CatchAll { body } => {
        out.push_str("catch (...) ");
        self.block(out, body, level)?;
      }
      Statement::Throw(e) => {
        write!(out, "throw {};", self.expr(e)?).expect("string write");
      }
      Statement::Goto(l) => {
        write!(out, "goto {};", self.p.idents().name(*l)).expect("string write");
      }
      Statement::GotoLabel(l) => {
        write!(out, "{}:;", self.p.idents().name(*l)).expect("string write");
      }
      Statement::StmtExpr(e) => {
        write!(out, "{};", self.expr(e)?).expect("string write");
      }
      Statement::Delete(e) => {
        write!(out, "delete {};", self.expr(e)?).expect("string write");
      }
      Statement::Comment(text) => {
        write!(out, "/* {text} */").expect("string write");
      }
      _ => return Err(Self::err("expression in statement position")),
    }
    Ok(())
  }

  /// Prints a statement as a braced block; `try` and `catch` require
  /// compound bodies even when a mutation left something else there.
  fn block(&self, out: &mut String, s: &Statement, level: usize) -> Result<()> {
    if matches!(s, Statement::Compound(_)) {
      return self.stmt(out, s, level);
    }
    out.push_str("{\n");
    Self::indent(out, level + 1);
    self.stmt(out, s, level + 1)?;
    out.push('\n');
    Self::indent(out, level);
    out.push('}');
    Ok(())
  }

  fn args(&self, args: &[Statement]) -> Result<String> {
    Ok(args.iter().map(|a| self.expr(a)).collect::<Result<Vec<_>>>()?
      .into_iter().format(", ").to_string())
  }

  fn expr(&self, s: &Statement) -> Result<String> {
    Ok(match s {
      Statement::Constant { text, .. } => text.to_string(),
      Statement::ConstantArray { elems, .. } => format!("{{{}}}", self.args(elems)?),
      Statement::Cast { ty, arg } => {
        let ty = self.type_name(*ty)?;
        // Braced literals cast as compound literals, not parenthesized
        // expressions.
        match &**arg {
          Statement::Constant { text, .. } if text.starts_with('{') =>
            format!("(({ty}){text})"),
          _ => format!("(({ty})({}))", self.expr(arg)?),
        }
      }
      Statement::Binary { op, lhs, rhs, .. } =>
        format!("({}){}({})", self.expr(lhs)?, op.token(), self.expr(rhs)?),
      Statement::Call { func, args, .. } =>
        format!("{}({})", self.p.idents().name(*func), self.args(args)?),
      Statement::IndirectCall { target, args, .. } =>
        format!("({})({})", self.expr(target)?, self.args(args)?),
      Statement::New { ty, .. } => {
        let Type::Pointer(base) = *self.p.types().get(self.p.types().strip_cv(*ty)) else {
          return Err(Self::err("new with non-pointer type"));
        };
        format!("(new {})", self.type_name(base)?)
      }
      Statement::Deref { ptr, .. } => format!("(*{})", self.expr(ptr)?),
      Statement::AddrOf { place, .. } => format!("(&{})", self.expr(place)?),
      Statement::AddrOfFunc { func, .. } => format!("(&{})", self.p.idents().name(*func)),
      Statement::Index { base, index, .. } => {
        let base_str = self.expr(base)?;
        // Keep plain names unparenthesized so subscripts read
        // naturally.
        if matches!(&**base,
          Statement::LocalRef(_) | Statement::GlobalRef(_)
          | Statement::Call { .. } | Statement::Index { .. }) {
          format!("{base_str}[{}]", self.expr(index)?)
        } else {
          format!("({base_str})[{}]", self.expr(index)?)
        }
      }
      Statement::LocalRef(v) | Statement::GlobalRef(v) =>
        self.p.idents().name(v.name).to_owned(),
      _ => return Err(Self::err("statement in expression position")),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::LangOpts;
  use crate::rng::RngSource;

  #[test]
  fn fresh_program_prints_harness_and_main() {
    let mut rng = RngSource::from_seed(123);
    let p = crate::mutator::generate(&mut rng, LangOpts::default());
    let text = print_to_string(&p).expect("printable");
    assert!(text.starts_with("#define main wrap_main\n"));
    assert!(text.contains("int main"));
    assert!(text.contains("return"));
    assert!(text.ends_with("return argc == 0 ? res : 0;\n}\n"));
  }

  #[test]
  fn invalid_type_reference_is_a_print_error() {
    let mut p = Program::new(LangOpts::default());
    let int = p.builtin().signed_int;
    let name = p.idents_mut().make_new_id("arrayT");
    let arr = p.types_mut().add_type(Type::Array { base: int, size: 2, name }).unwrap();
    let gname = p.idents_mut().make_new_id("g");
    p.add(Decl::Global(crate::program::GlobalVar {
      var: crate::program::Variable { ty: arr, name: gname },
      is_static: false, init: None,
    }));
    p.types_mut().invalidate(arr);
    assert!(print_to_string(&p).is_err());
  }
}
