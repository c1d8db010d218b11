//! End-to-end generator tests: determinism, invariant closure, and
//! reachability of the constructs the generator is supposed to emit.

use regex::Regex;

use ubgen::LangOpts;
use ubgen::mutator;
use ubgen::program::Program;
use ubgen::rng::RngSource;
use ubgen::scheduler::{Feedback, Scheduler};
use ubgen::strategy::Strategy;

/// Generates two programs from the same entropy input.
#[test]
fn generate_from_same_inputs() {
  let input = b"some fairly long entropy input string";
  let strat = Strategy::new("default");
  let p1 = mutator::generate_from_entropy(input, &strat, LangOpts::default());
  let p2 = mutator::generate_from_entropy(input, &strat, LangOpts::default());
  assert_eq!(p1.to_source().unwrap(), p2.to_source().unwrap());
}

/// Generates two programs from different entropy inputs.
#[test]
fn generate_from_different_input() {
  let strat = Strategy::new("default");
  let p1 = mutator::generate_from_entropy(b"this is the first input entropy!", &strat,
    LangOpts::default());
  let p2 = mutator::generate_from_entropy(b"this is the second input entropy", &strat,
    LangOpts::default());
  assert_ne!(p1.to_source().unwrap(), p2.to_source().unwrap());
}

#[test]
fn generate_is_deterministic_per_seed() {
  let print = |seed| {
    let mut rng = RngSource::from_seed(seed);
    mutator::generate(&mut rng, LangOpts::default()).to_source().unwrap()
  };
  assert_eq!(print(123), print(123));
  // Not every seed pair differs, but the generator is not constant.
  let outputs: std::collections::HashSet<String> = (0..16).map(print).collect();
  assert!(outputs.len() > 1, "generator output never varies with the seed");
}

/// Seeded generation produces the harnessed `main` shape.
#[test]
fn seeded_program_has_main_and_return() {
  let mut rng = RngSource::from_seed(123);
  let p = mutator::generate(&mut rng, LangOpts::default());
  let text = p.to_source().unwrap();
  assert!(text.contains("int main"));
  assert!(text.contains("return"));
}

/// Every successful mutation leaves the program's invariants intact.
#[test]
fn mutation_preserves_invariants() {
  let mut rng = RngSource::from_seed(5);
  let mut p = mutator::generate(&mut rng, LangOpts::default());
  let strategies = Strategy::make_mutate_strategies();
  let strat = &strategies[0];
  let mut successes = 0;
  for _ in 0..30 {
    let mut candidate = p.clone();
    if mutator::mutate(&mut candidate, &mut rng, strat, 1).is_ok() {
      candidate.verify_self().expect("mutated program failed verification");
      p = candidate;
      successes += 1;
    }
  }
  assert!(successes > 0, "no mutation ever succeeded");
  assert!(p.count_nodes() > 0);
}

/// Mutation decision records are returned per call.
#[test]
fn mutate_records_decisions() {
  let strategies = Strategy::make_mutate_strategies();
  for seed in 0..10 {
    let mut rng = RngSource::from_seed(seed);
    let mut p = mutator::generate(&mut rng, LangOpts::default());
    if let Ok(decisions) = mutator::mutate(&mut p, &mut rng, &strategies[0], 1) {
      assert!(!decisions.is_empty());
      return;
    }
  }
  panic!("mutation never succeeded for any seed");
}

/// How many scheduler iterations reachability searches get before
/// giving up and failing a test.
const MAX_ITERS_TO_FIND: u64 = 20000;

/// Generates programs until the string shows up in a printed program.
fn try_find(needle: &str) {
  let feedback = |p: &Program| {
    let text = p.to_source().unwrap_or_default();
    Feedback { score: p.count_nodes() as u64, interesting: text.contains(needle) }
  };
  let mut scheduler = Scheduler::new(feedback, 123);
  assert!(scheduler.step_until_finding(MAX_ITERS_TO_FIND),
    "never generated a program containing {needle:?}");
}

/// Generates programs until the regex matches a printed program. The
/// example just double-checks the regex itself.
fn try_find_regex(pattern: &str, example: &str) {
  let re = Regex::new(pattern).expect("valid regex");
  assert!(re.is_match(example), "regex does not match its own example");
  let feedback = move |p: &Program| {
    let text = p.to_source().unwrap_or_default();
    Feedback { score: p.count_nodes() as u64, interesting: re.is_match(&text) }
  };
  let mut scheduler = Scheduler::new(feedback, 123);
  assert!(scheduler.step_until_finding(MAX_ITERS_TO_FIND),
    "never generated a program matching {pattern:?}");
}

// Builtin-call reachability: the generator must be able to reach every
// library function it advertises.

#[test]
fn generate_printf() { try_find("printf(") }

#[test]
fn generate_malloc() { try_find("malloc(") }

#[test]
fn generate_calloc() { try_find("calloc(") }

#[test]
fn generate_realloc() { try_find("realloc(") }

#[test]
fn generate_free() { try_find("free(") }

#[test]
fn generate_abort() { try_find("abort(") }

#[test]
fn generate_exit() { try_find("exit(") }

#[test]
fn generate_strlen() { try_find("strlen(") }

#[test]
fn generate_strstr() { try_find("strstr(") }

#[test]
fn generate_memcmp() { try_find("memcmp(") }

#[test]
fn generate_memcpy() { try_find("memcpy(") }

#[test]
fn generate_memset() { try_find("memset(") }

#[test]
fn generate_strcpy() { try_find("strcpy(") }

// Attribute reachability.

#[test]
fn generate_pure_attr() { try_find("(pure)") }

#[test]
fn generate_const_attr() { try_find("(const)") }

#[test]
fn generate_always_inline_attr() { try_find("(always_inline)") }

#[test]
fn generate_no_builtin_attr() { try_find("(no_builtin)") }

// Literal and structural reachability.

#[test]
fn generate_str_literal() {
  try_find_regex("\"[a-zA-Z0-9 ]+\"", "\"abc\"");
}

#[test]
fn generate_subscript() {
  try_find_regex(r"[a-zA-Z0-9]\[", "array2[123]");
}

#[test]
fn generate_array_typedef() {
  try_find_regex("typedef [a-zA-Z0-9 *]+", "typedef int foo[2];");
}

#[test]
fn generate_while_loop() { try_find("while (") }

#[test]
fn generate_if_cond() { try_find("if (") }

#[test]
fn generate_array_init() { try_find("= {") }

#[test]
fn generate_assign() { try_find(" = ") }
