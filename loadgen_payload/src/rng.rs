//! Seeded random source shared by every sampler in the crate.
//!
//! A seed string is hashed to 64 bits and used to seed a standard generator.
//! Identical seed and identical call sequence produce identical output, which
//! is what keeps field shapes stable across runs of the same dataset.

use std::{hash::Hasher, time::Duration};

use rand::{Rng as _, RngCore, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use rand_distr::StandardNormal;
use rustc_hash::FxHasher;

use crate::words;

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const HEX: &[u8] = b"0123456789abcdef";

/// Deterministic pseudo-random source.
#[derive(Debug, Clone)]
pub struct Rng {
    inner: StdRng,
}

fn hash_seed(seed: &str) -> FxHasher {
    let mut hasher = FxHasher::default();
    hasher.write(seed.as_bytes());
    hasher
}

impl Rng {
    /// Create a new `Rng` seeded from the hash of `seed`.
    #[must_use]
    pub fn from_seed_str(seed: &str) -> Self {
        Self {
            inner: StdRng::seed_from_u64(hash_seed(seed).finish()),
        }
    }

    /// Create an `Rng` for one numbered stream of `seed`. Distinct streams of
    /// the same seed are independent of one another.
    #[must_use]
    pub fn with_stream(seed: &str, stream: u64) -> Self {
        let mut hasher = hash_seed(seed);
        hasher.write_u64(stream);
        Self {
            inner: StdRng::seed_from_u64(hasher.finish()),
        }
    }

    /// Derive a child `Rng` from this one, advancing this one's state.
    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self {
            inner: StdRng::from_rng(&mut self.inner),
        }
    }

    /// Uniform index in `[0, n)`. Returns 0 when `n` is 0.
    pub fn intn(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.inner.random_range(0..n)
    }

    /// Uniform choice from `items`, `None` if `items` is empty.
    pub fn choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.inner)
    }

    /// Index in `[0, len)` biased toward the front of the list.
    ///
    /// Draws `r` uniformly from `[0, len²)` and returns `len - floor(sqrt(r)) -
    /// 1`, so the probability of index `i` falls off linearly with `i`.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn quadratic_index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let square = (len as f64) * (len as f64);
        let r = self.float(0.0, square);
        let root = (r.sqrt().floor() as usize).min(len - 1);
        len - root - 1
    }

    /// Quadratic-biased choice from `items`, `None` if `items` is empty.
    pub fn quadratic_choice<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.quadratic_index(items.len());
        items.get(idx)
    }

    /// Uniform integer in `[min, max)`. Returns `min` if the range is empty.
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.inner.random_range(min..max)
    }

    /// Uniform float in `[min, max)`.
    pub fn float(&mut self, min: f64, max: f64) -> f64 {
        self.inner.random::<f64>() * (max - min) + min
    }

    /// Normally distributed float.
    pub fn gaussian(&mut self, mean: f64, stddev: f64) -> f64 {
        let z: f64 = self.inner.sample(StandardNormal);
        z * stddev + mean
    }

    /// Normally distributed float, truncated toward zero.
    #[allow(clippy::cast_possible_truncation)]
    pub fn gaussian_int(&mut self, mean: f64, stddev: f64) -> i64 {
        self.gaussian(mean, stddev) as i64
    }

    /// Fair coin.
    pub fn bool(&mut self) -> bool {
        self.inner.random::<bool>()
    }

    /// `true` with probability `percent`/100.
    pub fn bool_with_prob(&mut self, percent: f64) -> bool {
        self.float(0.0, 100.0) < percent
    }

    /// Lowercase alphabetic string of `len` characters.
    pub fn string(&mut self, len: usize) -> String {
        self.from_alphabet(ALPHA, len)
    }

    /// Lowercase hexadecimal string of `len` characters.
    pub fn hex_string(&mut self, len: usize) -> String {
        self.from_alphabet(HEX, len)
    }

    fn from_alphabet(&mut self, alphabet: &[u8], len: usize) -> String {
        (0..len)
            .map(|_| char::from(alphabet[self.intn(alphabet.len())]))
            .collect()
    }

    /// Pronounceable `adjective-noun` pair.
    pub fn word_pair(&mut self) -> String {
        let adjective = self.choice(words::ADJECTIVES).copied().unwrap_or_default();
        let noun = self.choice(words::NOUNS).copied().unwrap_or_default();
        format!("{adjective}-{noun}")
    }

    /// Uniform duration in `[0, upper)`. Returns zero if `upper` is zero.
    pub fn duration(&mut self, upper: Duration) -> Duration {
        let nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.inner.random_range(0..nanos))
    }
}

impl RngCore for Rng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.inner.fill_bytes(dst);
    }
}
