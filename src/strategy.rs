//! Mutation strategies.
//!
//! A [`Strategy`] is a named vector of probabilities, one per
//! [`Frag`] decision site. The mutator consults a per-call
//! [`StrategyInstance`], which binds a strategy to an RNG and records
//! every consulted site so findings can later be attributed to the
//! decisions that produced them.

use crate::rng::RngSource;

macro_rules! decisions {
  ($($(#[$attr:meta])* $x:ident,)*) => {
    /// A decision site: a named Bernoulli draw inside the generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[allow(missing_docs)]
    pub enum Frag { $($(#[$attr])* $x),* }

    impl Frag {
      /// All decision sites, in declaration order.
      pub const ALL: &'static [Frag] = &[$(Frag::$x),*];

      /// The user-readable site name.
      #[must_use] pub fn name(self) -> &'static str {
        match self { $(Frag::$x => stringify!($x)),* }
      }
    }
  }
}

decisions! {
  AssignExprToVar,
  CallBuiltin,
  CallFuncPtr,
  CatchAll,
  ChangeIdentifier,
  CleanupCompound,
  ConstInt,
  CreateFuncPtrType,
  CreateNewType,
  DeleteCompoundStmts,
  DeleteFuncAttrs,
  DeleteStmtInCompound,
  DeleteTypes,
  DontFillArrayConstant,
  EmitEmptyStringLiteral,
  EmitStringLiteral,
  EmptyCompound,
  EnsureReturnInFunc,
  FixMainReturn,
  ForceCallBuiltinStmt,
  FunctionIsNoExcept,
  FunctionIsStatic,
  GarbageCollectTypes,
  InitGlobal,
  InitWithFuncAttrs,
  InlineCall,
  MutateCompound,
  MutateFoundStatement,
  MutateFuncAttrs,
  MutateFunction,
  MutateGlobal,
  MutateOverDelete,
  MutateTypeArraySize,
  MutateTypeBase,
  MutateTypes,
  OutlineStatement,
  PickExistingGlobal,
  PickFloatOverInt,
  PickLocalVar,
  PickPtrOverInt,
  PickVoidForAny,
  PreferModifyingStmtsOverExprs,
  PromoteChild,
  PromoteChildren,
  RegenerateFunctionBody,
  RegenerateProgram,
  ReorderOverDelete,
  SimplifyStmt,
  SwapDefAndDecl,
  SwitchLinkageGlobalVar,
  TryDerefVar,
  UseFunctionAttr,
  UseMutatedStmtAsChild,
  UseNonStdCallingConv,
  UseSecondFunctionAttr,
  UseSnippet,
  VarIsStatic,
  VolatileInt,
  WrapInCompound,
}

/// Every site's probability before a strategy biases it.
const DEFAULT_WEIGHT: f32 = 0.5;

/// A named probability vector over the decision sites.
#[derive(Debug, Clone)]
pub struct Strategy {
  /// The strategy's display name.
  pub name: Box<str>,
  values: Vec<f32>,
  /// How many mutate steps one `mutate` call applies (multiplied by
  /// the caller's scale).
  pub scale: u32,
}

impl Strategy {
  /// A strategy with every site at the default weight.
  #[must_use] pub fn new(name: &str) -> Self {
    Strategy { name: name.into(), values: vec![DEFAULT_WEIGHT; Frag::ALL.len()], scale: 5 }
  }

  /// The probability of a site.
  #[must_use] pub fn get(&self, f: Frag) -> f32 { self.values[f as usize] }

  /// Overrides the probability of a site.
  pub fn set(&mut self, f: Frag, p: f32) { self.values[f as usize] = p }

  /// Sets every site to the same probability.
  pub fn set_all(&mut self, p: f32) { self.values.fill(p) }

  fn base_mutate(name: &str) -> Strategy {
    let mut s = Strategy::new(name);
    s.set(Frag::CallBuiltin, 0.2);
    s.set(Frag::CatchAll, 0.2);
    s.set(Frag::CleanupCompound, 0.2);
    s.set(Frag::CreateFuncPtrType, 0.05);
    s.set(Frag::CreateNewType, 0.5);
    s.set(Frag::DeleteFuncAttrs, 0.4);
    s.set(Frag::DeleteStmtInCompound, 0.3);
    s.set(Frag::DeleteTypes, 0.2);
    s.set(Frag::DontFillArrayConstant, 0.5);
    s.set(Frag::EmitStringLiteral, 0.5);
    s.set(Frag::EmptyCompound, 0.02);
    s.set(Frag::EnsureReturnInFunc, 0.96);
    s.set(Frag::MutateCompound, 0.5);
    s.set(Frag::PromoteChild, 0.1);
    s.set(Frag::PromoteChildren, 0.1);
    s.set(Frag::WrapInCompound, 0.1);
    s.set(Frag::MutateFuncAttrs, 0.005);
    s.set(Frag::UseNonStdCallingConv, 0.4);
    s.set(Frag::InitWithFuncAttrs, 0.01);
    s.set(Frag::DeleteCompoundStmts, 0.01);
    s.set(Frag::SimplifyStmt, 0.02);
    s.set(Frag::PickPtrOverInt, 0.8);
    s.set(Frag::UseSnippet, 0.03);
    s.set(Frag::AssignExprToVar, 0.9);
    s.set(Frag::InitGlobal, 0.8);
    s.set(Frag::MutateFunction, 1.0);
    s.set(Frag::MutateGlobal, 0.05);
    s.set(Frag::ChangeIdentifier, 0.001);
    s.set(Frag::RegenerateProgram, 0.02);
    s.set(Frag::FixMainReturn, 0.9);
    s.set(Frag::InlineCall, 0.02);
    s.set(Frag::OutlineStatement, 0.02);
    s
  }

  fn base_reduction() -> Strategy {
    let mut s = Strategy::new("reduce");
    s.set_all(0.05);
    s.scale = 1;
    s.set(Frag::MutateOverDelete, 0.8);
    s.set(Frag::MutateFuncAttrs, 0.003);
    s.set(Frag::DeleteFuncAttrs, 0.3);
    for f in [Frag::CleanupCompound, Frag::DeleteStmtInCompound, Frag::DeleteTypes,
              Frag::SimplifyStmt, Frag::EmptyCompound, Frag::DeleteCompoundStmts] {
      s.set(f, 0.2);
    }
    s
  }

  /// The mutation strategy family the scheduler round-robins over.
  #[must_use] pub fn make_mutate_strategies() -> Vec<Strategy> {
    const NEARLY_ALWAYS: f32 = 0.96;
    const NEVER: f32 = 0.01;
    let mut result = vec![Strategy::base_mutate("generic mutate"), Strategy::base_reduction()];

    let mut s = Strategy::base_mutate("mutate function attributes");
    s.set(Frag::MutateFunction, NEARLY_ALWAYS);
    s.set(Frag::MutateGlobal, NEVER);
    s.set(Frag::MutateFuncAttrs, NEARLY_ALWAYS);
    result.push(s);

    let mut s = Strategy::base_mutate("mutate global variable");
    s.set(Frag::MutateGlobal, NEARLY_ALWAYS);
    s.set(Frag::MutateFunction, NEVER);
    result.push(s);

    let mut s = Strategy::base_mutate("mutate stmt");
    s.set(Frag::MutateFunction, NEARLY_ALWAYS);
    s.set(Frag::MutateGlobal, NEVER);
    s.set(Frag::MutateFuncAttrs, NEVER);
    s.set(Frag::PreferModifyingStmtsOverExprs, NEARLY_ALWAYS);
    result.push(s);

    let mut s = Strategy::base_mutate("mutate expr");
    s.set(Frag::MutateFunction, NEARLY_ALWAYS);
    s.set(Frag::MutateGlobal, NEVER);
    s.set(Frag::MutateFuncAttrs, NEVER);
    s.set(Frag::PreferModifyingStmtsOverExprs, NEVER);
    result.push(s);

    let mut s = Strategy::base_mutate("mutate types");
    s.set(Frag::MutateOverDelete, NEVER);
    s.set(Frag::ReorderOverDelete, NEVER);
    s.set(Frag::MutateTypes, NEARLY_ALWAYS);
    result.push(s);

    let mut s = Strategy::base_mutate("reorder types");
    s.set(Frag::ReorderOverDelete, NEARLY_ALWAYS);
    result.push(s);

    result
  }

  /// The reduction strategy family.
  #[must_use] pub fn make_reduction_strategies() -> Vec<Strategy> {
    vec![Strategy::base_reduction()]
  }
}

/// One consulted decision site and its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
  /// The consulted site.
  pub site: Frag,
  /// Whether the Bernoulli draw succeeded.
  pub taken: bool,
}

/// A strategy bound to an RNG for the duration of one mutate call.
#[derive(Debug)]
pub struct StrategyInstance {
  strat: Strategy,
  rng: RngSource,
  taken: Vec<Decision>,
}

impl StrategyInstance {
  /// Binds a strategy to a (usually freshly spawned) RNG.
  #[must_use] pub fn new(strat: Strategy, rng: RngSource) -> Self {
    StrategyInstance { strat, rng, taken: Vec::new() }
  }

  /// Draws the site's Bernoulli and records the outcome.
  pub fn decision(&mut self, f: Frag) -> bool {
    let taken = self.rng.success_chance(self.strat.get(f));
    self.taken.push(Decision { site: f, taken });
    taken
  }

  /// The ordered record of all consulted sites.
  #[must_use] pub fn decisions(&self) -> &[Decision] { &self.taken }

  /// Consumes the instance, yielding the decision record.
  #[must_use] pub fn into_decisions(self) -> Vec<Decision> { self.taken }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_and_overrides() {
    let mut s = Strategy::new("test");
    assert_eq!(s.get(Frag::UseSnippet), DEFAULT_WEIGHT);
    s.set(Frag::UseSnippet, 0.25);
    assert_eq!(s.get(Frag::UseSnippet), 0.25);
  }

  #[test]
  fn families_are_nonempty_and_named() {
    let muts = Strategy::make_mutate_strategies();
    assert!(muts.len() >= 8);
    assert_eq!(&*muts[0].name, "generic mutate");
    let reds = Strategy::make_reduction_strategies();
    assert_eq!(&*reds[0].name, "reduce");
    // Reduction elevates the shrinking sites above the floor.
    assert!(reds[0].get(Frag::DeleteStmtInCompound) > reds[0].get(Frag::UseSnippet));
    assert!(reds[0].get(Frag::MutateOverDelete) > 0.5);
  }

  #[test]
  fn instance_records_decisions_in_order() {
    let mut inst = StrategyInstance::new(Strategy::new("test"), RngSource::from_seed(1));
    let _ = inst.decision(Frag::UseSnippet);
    let _ = inst.decision(Frag::CallBuiltin);
    let d = inst.decisions();
    assert_eq!(d.len(), 2);
    assert_eq!(d[0].site, Frag::UseSnippet);
    assert_eq!(d[1].site, Frag::CallBuiltin);
  }

  #[test]
  fn decisions_are_deterministic() {
    let mk = || StrategyInstance::new(Strategy::base_mutate("x"), RngSource::from_seed(9));
    let (mut a, mut b) = (mk(), mk());
    for &f in Frag::ALL {
      assert_eq!(a.decision(f), b.decision(f));
    }
  }
}
