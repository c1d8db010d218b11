//! The canonicalizer: a pure rewrite that strips structural
//! redundancy without touching semantics. Empty statements disappear
//! from blocks and trivially nested blocks are flattened, so the
//! mutator never accumulates towers of `{{{...}}}`.

use crate::ast::{Statement, StmtKind};

fn has_var_decls(s: &Statement) -> bool {
  debug_assert_eq!(s.kind(), StmtKind::Compound, "can only scan compounds");
  s.children().iter().any(|c| matches!(c.kind(), StmtKind::VarDecl | StmtKind::VarDef))
}

/// Tries to simplify the statement without changing semantics.
/// Returns `None` when nothing changed.
pub(crate) fn canonicalize(s: &Statement) -> Option<Statement> {
  match s {
    Statement::Compound(children) => {
      let mut has_changes = false;
      let mut new_children = Vec::new();
      let flatten = !has_var_decls(s);
      for child in children {
        if child.kind() == StmtKind::Empty {
          has_changes = true;
          continue;
        }
        let mut new_child = child.clone();
        if let Some(canonical) = canonicalize(child) {
          new_child = canonical;
          has_changes = true;
        }
        if let Statement::Compound(nested) = new_child {
          if flatten {
            new_children.extend(nested);
            has_changes = true;
          } else {
            new_children.push(Statement::Compound(nested));
          }
        } else {
          new_children.push(new_child);
        }
      }
      has_changes.then_some(Statement::Compound(new_children))
    }
    Statement::If { cond, body } => canonicalize(body).map(|b| Statement::If {
      cond: cond.clone(), body: Box::new(b),
    }),
    Statement::While { cond, body } => canonicalize(body).map(|b| Statement::While {
      cond: cond.clone(), body: Box::new(b),
    }),
    Statement::Try { body, catches } => {
      let mut changed = false;
      let new_body = canonicalize(body).map_or_else(|| (*body.clone()), |b| { changed = true; b });
      let new_catches: Vec<Statement> = catches.iter().map(|c| {
        canonicalize(c).map_or_else(|| c.clone(), |n| { changed = true; n })
      }).collect();
      changed.then_some(Statement::Try { body: Box::new(new_body), catches: new_catches })
    }
    Statement::Catch { ty, name, body } => canonicalize(body).map(|b| Statement::Catch {
      ty: *ty, name: *name, body: Box::new(b),
    }),
    Statement::CatchAll { body } => canonicalize(body).map(|b| Statement::CatchAll {
      body: Box::new(b),
    }),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flattens_nested_compounds() {
    let c = Statement::Compound(vec![Statement::Compound(vec![Statement::Break])]);
    let res = canonicalize(&c).expect("should simplify");
    let Statement::Compound(children) = &res else { panic!("not a compound") };
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].kind(), StmtKind::Break);
  }

  #[test]
  fn drops_empty_statements() {
    let c = Statement::Compound(vec![Statement::Empty, Statement::Break, Statement::Empty]);
    let res = canonicalize(&c).expect("should simplify");
    assert_eq!(res, Statement::Compound(vec![Statement::Break]));
  }

  #[test]
  fn keeps_scopes_with_declarations() {
    // The outer block declares a variable, so the inner block is left
    // alone (flattening could move declarations across scopes).
    let decl = Statement::VarDecl {
      ty: crate::types::TypeRef::VOID, name: crate::idents::NameId::from_usize(0),
    };
    let inner = Statement::Compound(vec![Statement::Break]);
    let c = Statement::Compound(vec![decl, inner.clone()]);
    assert_eq!(canonicalize(&c), None);
  }

  #[test]
  fn is_idempotent() {
    let deep = Statement::Compound(vec![
      Statement::Empty,
      Statement::Compound(vec![
        Statement::Compound(vec![Statement::Break, Statement::Empty]),
        Statement::Empty,
      ]),
      Statement::Compound(vec![]),
    ]);
    let once = canonicalize(&deep).expect("should simplify");
    assert_eq!(canonicalize(&once), None, "second pass must be a fixpoint");
  }

  #[test]
  fn recurses_into_control_flow() {
    let body = Statement::Compound(vec![Statement::Compound(vec![Statement::Break])]);
    let w = Statement::While {
      cond: Box::new(Statement::Constant { text: "1".into(), ty: crate::types::TypeRef::VOID }),
      body: Box::new(body),
    };
    let res = canonicalize(&w).expect("should simplify");
    let Statement::While { body, .. } = &res else { panic!("not a while") };
    assert_eq!(**body, Statement::Compound(vec![Statement::Break]));
  }
}
