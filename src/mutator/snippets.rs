//! Precomputed code patterns spliced as atomic units.
//!
//! Each snippet is a shape with a known track record of flushing out
//! bug classes: jump threading (goto pairs), allocator special-casing
//! (malloc/free), loop optimizations (counter/infinite/dead loops),
//! out-of-bounds tolerance (array cross-assignments) and escaping
//! lifetimes (use-after-return). Only snippets legal in the current
//! function context are offered.

use arrayvec::ArrayVec;

use crate::ast::{BinOp, Statement};
use crate::builtins::BuiltinFunc;
use crate::program::Variable;
use crate::types::Type;

use super::MutatorData;
use super::context::StatementContext;
use super::type_creator::TypeCreator;

pub(crate) struct Snippets {
  tc: TypeCreator,
}

#[derive(Clone, Copy, PartialEq)]
enum Option_ {
  ForwardJump,
  BackwardsJump,
  MallocFree,
  CounterLoop,
  InfLoop,
  NoLoop,
  ArrayWithUse,
  UseAfterReturn,
}

impl Snippets {
  pub(crate) fn new() -> Self {
    Snippets { tc: TypeCreator::new() }
  }

  /// Creates a random predefined piece of code.
  pub(crate) fn create_snippet(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext)
      -> Statement {
    let res = self.create_snippet_impl(cx, ctx);
    debug_assert!(res.verify_self(cx.p).is_ok(), "snippet failed verification");
    res
  }

  fn create_snippet_impl(&self, cx: &mut MutatorData<'_>, ctx: &StatementContext) -> Statement {
    let mut options: ArrayVec<Option_, 8> = ArrayVec::from_iter([
      Option_::ForwardJump, Option_::BackwardsJump, Option_::MallocFree,
      Option_::InfLoop, Option_::NoLoop, Option_::CounterLoop, Option_::ArrayWithUse,
    ]);

    // A function returning a non-void pointer can return the address
    // of a local.
    let ret = ctx.return_type;
    if let Type::Pointer(base) = *cx.p.types().get(ret) {
      if base != cx.p.builtin().void && !cx.p.types().expects_var_initializer(base) {
        options.push(Option_::UseAfterReturn);
      }
    }

    let int = cx.p.builtin().signed_int;
    match *cx.rng.pick(&options) {
      Option_::ForwardJump => {
        let l = cx.new_id("lbl");
        Statement::Compound(vec![
          Statement::Goto(l), Statement::Empty, Statement::GotoLabel(l),
        ])
      }
      Option_::BackwardsJump => {
        let l = cx.new_id("lbl");
        Statement::Compound(vec![
          Statement::GotoLabel(l), Statement::Empty, Statement::Goto(l),
        ])
      }
      Option_::MallocFree => {
        let t = self.tc.ptr_type(cx);
        let l = cx.new_id("var");
        let var = Variable { ty: t, name: l };
        let size_t = cx.p.builtin().size_t;
        let malloc_call = cx.builtin_call(BuiltinFunc::Malloc,
          vec![Statement::Constant { text: "128".into(), ty: size_t }]);
        let alloc = Statement::VarDef {
          ty: t, name: l,
          init: Box::new(Statement::Cast { ty: t, arg: Box::new(malloc_call) }),
        };
        let void_ptr = cx.p.builtin().void_ptr;
        let free_call = cx.builtin_call(BuiltinFunc::Free,
          vec![Statement::Cast { ty: void_ptr, arg: Box::new(Statement::LocalRef(var)) }]);
        let dealloc = Statement::StmtExpr(Box::new(free_call));
        Statement::Compound(vec![alloc, dealloc])
      }
      Option_::ArrayWithUse => {
        let array_ty = self.tc.make_new_array_type(cx);
        let Type::Array { base, size, .. } = *cx.p.types().get(array_ty) else {
          unreachable!("fresh array type")
        };
        if cx.p.types().is_const(base) || cx.p.types().is_array(base) {
          return Statement::Empty;
        }
        let l = cx.new_id("localArray");
        let var = Variable { ty: array_ty, name: l };
        let uint = cx.p.builtin().unsigned_int;
        let mut subscript = |cx: &mut MutatorData<'_>| Statement::Index {
          ty: base,
          base: Box::new(Statement::LocalRef(var)),
          index: Box::new(Statement::Constant {
            text: cx.rng.below(size).to_string().into(), ty: uint,
          }),
        };
        let mut children = vec![Statement::VarDecl { ty: array_ty, name: l }];
        for _ in 0..cx.rng.below(10) {
          let (lhs, rhs) = (subscript(cx), subscript(cx));
          let assign = Statement::binary(cx.p, BinOp::Assign, lhs, rhs);
          children.push(Statement::StmtExpr(Box::new(assign)));
        }
        Statement::Compound(children)
      }
      Option_::CounterLoop => {
        let t = self.tc.any_int_type(cx, false);
        let l = cx.new_id("var");
        let var_ref = Statement::LocalRef(Variable { ty: t, name: l });
        let constant = |text: &str| Statement::Constant { text: text.into(), ty: t };
        let maybe_break = |cx: &mut MutatorData<'_>| {
          if cx.rng.success_chance(0.2) { Statement::Empty } else { Statement::Break }
        };
        let step = Statement::binary(cx.p, BinOp::Assign, var_ref.clone(),
          Statement::binary(cx.p, BinOp::Add, var_ref.clone(), constant("1")));
        let first_break = maybe_break(cx);
        let second_break = maybe_break(cx);
        Statement::Compound(vec![
          Statement::VarDef { ty: t, name: l, init: Box::new(constant("0")) },
          Statement::While {
            cond: Box::new(Statement::binary(cx.p, BinOp::Less, var_ref, constant("10"))),
            body: Box::new(Statement::Compound(vec![
              first_break,
              Statement::StmtExpr(Box::new(step)),
              second_break,
            ])),
          },
        ])
      }
      Option_::InfLoop => Statement::While {
        cond: Box::new(Statement::Constant { text: "1".into(), ty: int }),
        body: Box::new(Statement::Compound(vec![Statement::Break])),
      },
      Option_::NoLoop => Statement::While {
        cond: Box::new(Statement::Constant { text: "0".into(), ty: int }),
        body: Box::new(Statement::Compound(vec![Statement::Break])),
      },
      Option_::UseAfterReturn => {
        let Type::Pointer(underlying) = *cx.p.types().get(ret) else {
          unreachable!("checked when building the option list")
        };
        let l = cx.new_id("var");
        let var = Variable { ty: underlying, name: l };
        Statement::Compound(vec![
          Statement::VarDecl { ty: underlying, name: l },
          Statement::Return(Box::new(Statement::AddrOf {
            ty: ret, place: Box::new(Statement::LocalRef(var)),
          })),
        ])
      }
    }
  }
}
