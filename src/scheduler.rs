//! The feedback-driven scheduler and the reducer.
//!
//! The scheduler keeps a bounded, score-ordered population of
//! programs. Each step it clones a promising seed program, mutates the
//! clone under one of the strategy family members, prints it, asks the
//! feedback callback (the oracle boundary) for a verdict, and folds
//! the result back into the queue. The reducer is the same engine
//! pointed at a single program with a shrink-biased strategy, keeping
//! a candidate only when it stays interesting and strictly shrinks.

use log::debug;

use crate::LangOpts;
use crate::mutator;
use crate::program::Program;
use crate::rng::RngSource;
use crate::strategy::Strategy;

/// The oracle's verdict on one candidate program.
#[derive(Debug, Clone, Copy, Default)]
pub struct Feedback {
  /// Scalar score; higher keeps the candidate in the queue longer.
  pub score: u64,
  /// Whether this candidate is a finding.
  pub interesting: bool,
}

/// The feedback callback type.
pub type FeedbackFn<'a> = Box<dyn FnMut(&Program) -> Feedback + 'a>;

/// Scheduler knobs. All optional, all documented defaults.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOpts {
  /// Root seed for all randomness.
  pub seed: u64,
  /// Maximum population size.
  pub queue_size: usize,
  /// Mutation attempts per step before the step is abandoned.
  pub tries: u32,
  /// Extra multiplier on every strategy's step scale.
  pub mutator_scale: u32,
  /// Stop once this many findings accumulated (0 = never).
  pub stop_after: u32,
  /// Stop at the first finding.
  pub stop_after_hit: bool,
  /// Consecutive failed shrink attempts before the reducer gives up.
  pub reducer_tries: u32,
}

impl Default for SchedulerOpts {
  fn default() -> Self {
    SchedulerOpts {
      seed: 0,
      queue_size: 25,
      tries: 10,
      mutator_scale: 1,
      stop_after: 0,
      stop_after_hit: false,
      reducer_tries: 100,
    }
  }
}

struct QueueEntry {
  program: Program,
  score: u64,
  seq: u64,
}

/// EMA weight for per-strategy hit rates.
const EMA_DECAY: f32 = 0.9;
/// How often the best-performing strategy preempts the round-robin.
const BEST_STRATEGY_BIAS: f32 = 0.25;

/// The fuzzing scheduler.
pub struct Scheduler<'a> {
  opts: SchedulerOpts,
  feedback: FeedbackFn<'a>,
  on_hit: Option<Box<dyn FnMut(&Program, &str) + 'a>>,
  queue: Vec<QueueEntry>,
  strategies: Vec<Strategy>,
  ema: Vec<f32>,
  rng: RngSource,
  hits: u32,
  steps_done: u64,
  next_seq: u64,
}

impl<'a> Scheduler<'a> {
  /// A scheduler over the default options with the given seed.
  pub fn new(feedback: impl FnMut(&Program) -> Feedback + 'a, seed: u64) -> Self {
    Self::with_opts(feedback, SchedulerOpts { seed, ..SchedulerOpts::default() },
      LangOpts::default())
  }

  /// Full-control constructor.
  pub fn with_opts(feedback: impl FnMut(&Program) -> Feedback + 'a, opts: SchedulerOpts,
      lang: LangOpts) -> Self {
    let mut rng = RngSource::from_seed(opts.seed);
    let seed_program = mutator::generate(&mut rng.spawn_child(), lang);
    let strategies = Strategy::make_mutate_strategies();
    let ema = vec![0.0; strategies.len()];
    Scheduler {
      opts,
      feedback: Box::new(feedback),
      on_hit: None,
      queue: vec![QueueEntry { program: seed_program, score: 0, seq: 0 }],
      strategies,
      ema,
      rng,
      hits: 0,
      steps_done: 0,
      next_seq: 1,
    }
  }

  /// Installs the callback invoked with every finding and its printed
  /// source (the driver persists these).
  pub fn set_output_callback(&mut self, f: impl FnMut(&Program, &str) + 'a) {
    self.on_hit = Some(Box::new(f));
  }

  /// Number of findings so far.
  #[must_use] pub fn hits(&self) -> u32 { self.hits }

  /// Number of completed steps.
  #[must_use] pub fn steps_done(&self) -> u64 { self.steps_done }

  /// Whether a stop condition is met.
  #[must_use] pub fn done(&self) -> bool {
    (self.opts.stop_after_hit && self.hits > 0)
      || (self.opts.stop_after > 0 && self.hits >= self.opts.stop_after)
  }

  /// The best-scoring program in the queue (ties to the oldest).
  #[must_use] pub fn best_program(&self) -> &Program {
    &self.queue.iter()
      .max_by_key(|e| (e.score, std::cmp::Reverse(e.seq)))
      .expect("queue is never empty")
      .program
  }

  /// Round-robin over the strategy family, preempted by the strategy
  /// with the best recent hit rate.
  fn choose_strategy(&mut self) -> usize {
    if self.hits > 0 && self.rng.success_chance(BEST_STRATEGY_BIAS) {
      let mut best = 0;
      for (i, &v) in self.ema.iter().enumerate() {
        if v > self.ema[best] { best = i }
      }
      return best;
    }
    (self.steps_done % self.strategies.len() as u64) as usize
  }

  /// Weighted seed pick: a two-entry tournament favors higher scores
  /// without a weight table; ties go to the earlier insertion.
  fn pick_entry(&mut self) -> usize {
    let i = self.rng.pick_index(self.queue.len());
    let j = self.rng.pick_index(self.queue.len());
    let better = |a: usize, b: usize| {
      let (ea, eb) = (&self.queue[a], &self.queue[b]);
      if (eb.score, std::cmp::Reverse(eb.seq)) > (ea.score, std::cmp::Reverse(ea.seq)) { b }
      else { a }
    };
    better(i, j)
  }

  fn insert(&mut self, program: Program, score: u64) {
    let seq = self.next_seq;
    self.next_seq += 1;
    if self.queue.len() < self.opts.queue_size.max(1) {
      self.queue.push(QueueEntry { program, score, seq });
      return;
    }
    let floor = self.queue.iter().enumerate()
      .min_by_key(|(_, e)| (e.score, e.seq))
      .map(|(i, _)| i)
      .expect("queue is never empty");
    if score > self.queue[floor].score {
      self.queue[floor] = QueueEntry { program, score, seq };
    }
  }

  /// One scheduling step. Returns whether it produced a finding.
  pub fn step(&mut self) -> bool {
    let strat_idx = self.choose_strategy();
    let seed_idx = self.pick_entry();

    let mut accepted = None;
    for _ in 0..self.opts.tries.max(1) {
      let mut clone = self.queue[seed_idx].program.clone();
      let mut child = self.rng.spawn_child();
      match mutator::mutate(&mut clone, &mut child, &self.strategies[strat_idx],
          self.opts.mutator_scale) {
        Ok(_) => { accepted = Some(clone); break }
        Err(e) => debug!("mutation discarded: {e}"),
      }
    }
    self.steps_done += 1;

    let Some(candidate) = accepted else { return false };
    let text = match candidate.to_source() {
      Ok(t) => t,
      Err(e) => {
        debug!("candidate dropped, unprintable: {e}");
        return false;
      }
    };

    let fb = (self.feedback)(&candidate);
    self.ema[strat_idx] =
      EMA_DECAY * self.ema[strat_idx] + if fb.interesting { 1.0 - EMA_DECAY } else { 0.0 };
    if fb.interesting {
      self.hits += 1;
      debug!("finding #{} via strategy {:?} (score {})",
        self.hits, self.strategies[strat_idx].name, fb.score);
      if let Some(cb) = &mut self.on_hit {
        cb(&candidate, &text);
      }
    }
    self.insert(candidate, fb.score);
    fb.interesting
  }

  /// Runs up to `n` steps, honoring the stop conditions.
  pub fn steps(&mut self, n: u64) {
    for _ in 0..n {
      if self.done() { break }
      self.step();
    }
  }

  /// Steps until a finding appears, at most `max_steps` times.
  pub fn step_until_finding(&mut self, max_steps: u64) -> bool {
    for _ in 0..max_steps {
      if self.step() { return true }
    }
    false
  }
}

/// The reducer: shrinks one interesting program while the feedback
/// keeps calling it interesting.
pub struct Reducer<'a> {
  feedback: FeedbackFn<'a>,
  program: Program,
  rng: RngSource,
  strat: Strategy,
  fails: u32,
  max_fails: u32,
}

impl<'a> Reducer<'a> {
  /// A reducer over the given program.
  pub fn new(feedback: impl FnMut(&Program) -> Feedback + 'a, seed: u64, program: Program)
      -> Self {
    Self::with_tries(feedback, seed, program, SchedulerOpts::default().reducer_tries)
  }

  /// A reducer that gives up after `reducer_tries` consecutive failed
  /// shrink attempts.
  pub fn with_tries(feedback: impl FnMut(&Program) -> Feedback + 'a, seed: u64,
      program: Program, reducer_tries: u32) -> Self {
    Reducer {
      feedback: Box::new(feedback),
      program,
      rng: RngSource::from_seed(seed),
      strat: Strategy::make_reduction_strategies().remove(0),
      fails: 0,
      max_fails: reducer_tries.max(1),
    }
  }

  /// The current (best) program.
  #[must_use] pub fn program(&self) -> &Program { &self.program }

  /// Whether the reducer has given up.
  #[must_use] pub fn done(&self) -> bool { self.fails >= self.max_fails }

  /// One reduction step. Accepts the candidate only when it is still
  /// interesting and strictly smaller, so the kept program never
  /// grows. Returns whether the program shrank.
  pub fn step(&mut self) -> bool {
    if self.done() { return false }
    let mut candidate = self.program.clone();
    let mut child = self.rng.spawn_child();
    if let Err(e) = mutator::reduce(&mut candidate, &mut child, &self.strat) {
      debug!("reduction step discarded: {e}");
      self.fails += 1;
      return false;
    }
    if candidate.to_source().is_err() {
      self.fails += 1;
      return false;
    }
    let fb = (self.feedback)(&candidate);
    if fb.interesting && candidate.count_nodes() < self.program.count_nodes() {
      debug!("reduced to {} nodes", candidate.count_nodes());
      self.program = candidate;
      self.fails = 0;
      return true;
    }
    self.fails += 1;
    false
  }

  /// Runs reduction steps until the reducer gives up.
  pub fn run_to_fixpoint(&mut self) {
    while !self.done() {
      self.step();
    }
  }
}
