//! Scheduler growth and reducer shrink behavior.

use ubgen::program::Program;
use ubgen::scheduler::{Feedback, Reducer, Scheduler};

fn size_feedback(p: &Program) -> Feedback {
  Feedback { score: p.count_nodes() as u64, interesting: false }
}

fn always_interesting(p: &Program) -> Feedback {
  Feedback { score: p.count_nodes() as u64, interesting: true }
}

/// Grows a program with the scheduler, then shrinks it with the
/// reducer. The reduced program should end up at least halved; a
/// reasonable expectation rather than a hard bound, so the seed is
/// pinned.
#[test]
fn generate_and_reduce() {
  let seed = 123;
  let mut scheduler = Scheduler::new(size_feedback, seed);
  scheduler.steps(100);
  let best = scheduler.best_program().clone();
  let max_nodes = best.count_nodes();
  assert!(max_nodes > 10, "scheduler never grew the program");

  let reduced_factor = 2;
  let mut reducer = Reducer::new(always_interesting, seed, best);
  for _ in 0..100 {
    reducer.step();
    let min_nodes = reducer.program().count_nodes();
    // The kept program never grows.
    assert!(min_nodes <= max_nodes);
    if min_nodes * reduced_factor < max_nodes { break }
  }
  let min_nodes = reducer.program().count_nodes();
  assert!(min_nodes * reduced_factor < max_nodes,
    "reducer got stuck at {min_nodes} of {max_nodes} nodes");
}

/// With an always-interesting oracle the reducer is monotone by
/// construction: consecutive kept programs never grow.
#[test]
fn reducer_is_monotone() {
  let seed = 9;
  let mut scheduler = Scheduler::new(size_feedback, seed);
  scheduler.steps(40);
  let mut reducer = Reducer::new(always_interesting, seed, scheduler.best_program().clone());
  let mut last = reducer.program().count_nodes();
  for _ in 0..50 {
    reducer.step();
    let now = reducer.program().count_nodes();
    assert!(now <= last, "reducer grew the program from {last} to {now} nodes");
    last = now;
  }
}

/// The reducer reports being done after enough consecutive failures.
#[test]
fn reducer_gives_up_eventually() {
  let never_interesting = |p: &Program| Feedback {
    score: p.count_nodes() as u64, interesting: false,
  };
  let mut scheduler = Scheduler::new(size_feedback, 7);
  scheduler.steps(10);
  let mut reducer = Reducer::with_tries(never_interesting, 7,
    scheduler.best_program().clone(), 20);
  let before = reducer.program().count_nodes();
  reducer.run_to_fixpoint();
  assert!(reducer.done());
  assert_eq!(reducer.program().count_nodes(), before);
}

/// `stop_after_hit` halts the stepping loop.
#[test]
fn scheduler_stops_after_hit() {
  let mut opts = ubgen::scheduler::SchedulerOpts { seed: 3, ..Default::default() };
  opts.stop_after_hit = true;
  let mut scheduler = Scheduler::with_opts(always_interesting, opts,
    ubgen::LangOpts::default());
  scheduler.steps(50);
  assert_eq!(scheduler.hits(), 1);
  assert!(scheduler.done());
}

/// Findings are handed to the output callback together with their
/// printed source.
#[test]
fn output_callback_sees_findings() {
  use std::cell::RefCell;
  let found: RefCell<Vec<String>> = RefCell::new(Vec::new());
  {
    let mut scheduler = Scheduler::new(always_interesting, 11);
    scheduler.set_output_callback(|_, text| found.borrow_mut().push(text.to_owned()));
    scheduler.steps(3);
  }
  let found = found.into_inner();
  assert!(!found.is_empty());
  assert!(found[0].starts_with("#define main wrap_main\n"));
}
