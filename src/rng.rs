//! Deterministic entropy sources.
//!
//! Every piece of the generator that consumes randomness takes an
//! explicit [`RngSource`]; there is no ambient randomness anywhere in
//! the crate. Two sources built from the same seed (or the same
//! entropy bytes) and driven through the same sequence of primitive
//! calls produce identical results, which is what makes findings
//! replayable from nothing but a seed.

use byteorder::{ByteOrder, LittleEndian};
use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// A byte buffer that serves RNG draws until exhausted.
///
/// Used for replay and corpus-based generation: the fuzzer can treat
/// an arbitrary input file as the complete record of all random
/// decisions, with pseudo-random fallback once the bytes run out.
#[derive(Debug, Clone)]
pub struct EntropyVec {
  data: Vec<u8>,
  pos: usize,
}

impl EntropyVec {
  /// Wraps the given bytes as an entropy buffer.
  #[must_use] pub fn new(data: impl Into<Vec<u8>>) -> Self {
    EntropyVec { data: data.into(), pos: 0 }
  }

  /// True while unconsumed bytes remain.
  #[must_use] pub fn has_data(&self) -> bool { self.pos < self.data.len() }

  /// Serves the next draw from the buffer, zero-padding a short tail.
  fn next_u32(&mut self) -> u32 {
    let mut buf = [0u8; 4];
    let n = (self.data.len() - self.pos).min(4);
    buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
    self.pos += n;
    LittleEndian::read_u32(&buf)
  }
}

/// A deterministic pseudo-random source.
///
/// Construct from a seed with [`RngSource::from_seed`] or from replay
/// bytes with [`RngSource::from_entropy`]. In entropy mode, draws are
/// served from the byte buffer until it is exhausted and fall back to
/// the PRNG afterwards.
#[derive(Debug, Clone)]
pub struct RngSource {
  prng: Xoshiro256StarStar,
  entropy: Option<EntropyVec>,
}

impl RngSource {
  /// Creates a pseudo-random source from an integer seed.
  #[must_use] pub fn from_seed(seed: u64) -> Self {
    RngSource { prng: Xoshiro256StarStar::seed_from_u64(seed), entropy: None }
  }

  /// Creates a source that replays the given entropy bytes.
  ///
  /// The fallback PRNG is seeded from a digest of the bytes so that
  /// draws past the end of the buffer still depend on all of it.
  #[must_use] pub fn from_entropy(entropy: EntropyVec) -> Self {
    let mut seed = 0xcbf2_9ce4_8422_2325_u64;
    for &b in &entropy.data {
      seed = (seed ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3);
    }
    RngSource { prng: Xoshiro256StarStar::seed_from_u64(seed), entropy: Some(entropy) }
  }

  /// True while the source is still replaying entropy bytes.
  #[must_use] pub fn has_entropy(&self) -> bool {
    self.entropy.as_ref().is_some_and(EntropyVec::has_data)
  }

  fn next_u32(&mut self) -> u32 {
    if let Some(e) = &mut self.entropy {
      if e.has_data() { return e.next_u32() }
    }
    self.prng.next_u32()
  }

  fn next_u64(&mut self) -> u64 {
    let hi = u64::from(self.next_u32());
    let lo = u64::from(self.next_u32());
    hi << 32 | lo
  }

  /// A fair coin.
  pub fn flip_coin(&mut self) -> bool { self.next_u32() & 1 == 1 }

  /// Uniform draw in `[0, n)`. `n` must be nonzero; callers that can
  /// see an empty range guard before calling.
  pub fn below(&mut self, n: u32) -> u32 {
    assert!(n != 0, "empty range");
    ((u64::from(self.next_u32()) * u64::from(n)) >> 32) as u32
  }

  /// Uniform index draw for a slice of the given length.
  pub fn pick_index(&mut self, len: usize) -> usize {
    self.below(u32::try_from(len).expect("oversized slice")) as usize
  }

  /// Bernoulli draw with success probability `p` (clamped to `[0, 1]`).
  pub fn success_chance(&mut self, p: f32) -> bool {
    if p <= 0.0 { return false }
    if p >= 1.0 { return true }
    f64::from(self.next_u32()) < f64::from(p) * 4_294_967_296.0
  }

  /// Picks one element of a non-empty slice.
  pub fn pick<'a, T>(&mut self, options: &'a [T]) -> &'a T {
    &options[self.pick_index(options.len())]
  }

  /// Picks one byte of a non-empty ASCII charset, as a `char`.
  pub fn pick_char(&mut self, charset: &str) -> char {
    char::from(*self.pick(charset.as_bytes()))
  }

  /// Derives an independent child source.
  ///
  /// The derivation is deterministic from the parent state, so
  /// mutation steps can each run on their own child without the step
  /// count perturbing unrelated draws. In entropy mode the seed draw
  /// consumes buffer bytes, which is what drives replay loops towards
  /// termination.
  pub fn spawn_child(&mut self) -> RngSource {
    RngSource::from_seed(self.next_u64())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_seed_same_stream() {
    let mut a = RngSource::from_seed(42);
    let mut b = RngSource::from_seed(42);
    for _ in 0..100 {
      assert_eq!(a.below(1000), b.below(1000));
    }
    assert_eq!(a.flip_coin(), b.flip_coin());
  }

  #[test]
  fn different_seeds_diverge() {
    let mut a = RngSource::from_seed(1);
    let mut b = RngSource::from_seed(2);
    let da: Vec<u32> = (0..16).map(|_| a.below(1 << 20)).collect();
    let db: Vec<u32> = (0..16).map(|_| b.below(1 << 20)).collect();
    assert_ne!(da, db);
  }

  #[test]
  fn entropy_replay_is_deterministic() {
    let bytes = b"some entropy input".to_vec();
    let mut a = RngSource::from_entropy(EntropyVec::new(bytes.clone()));
    let mut b = RngSource::from_entropy(EntropyVec::new(bytes));
    // Drive well past the buffer end; the fallback must agree too.
    for _ in 0..64 {
      assert_eq!(a.below(255) , b.below(255));
    }
    assert!(!a.has_entropy());
  }

  #[test]
  fn spawn_child_is_deterministic() {
    let mut a = RngSource::from_seed(7);
    let mut b = RngSource::from_seed(7);
    let mut ca = a.spawn_child();
    let mut cb = b.spawn_child();
    assert_eq!(ca.below(9999), cb.below(9999));
    // The child stream is independent of further parent draws.
    let _ = a.below(3);
    assert_eq!(ca.below(9999), cb.below(9999));
  }

  #[test]
  fn below_stays_in_range() {
    let mut r = RngSource::from_seed(3);
    for _ in 0..1000 {
      assert!(r.below(7) < 7);
    }
  }

  #[test]
  fn success_chance_extremes() {
    let mut r = RngSource::from_seed(5);
    assert!(r.success_chance(1.0));
    assert!(!r.success_chance(0.0));
  }
}
