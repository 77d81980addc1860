//! Seeded random source used for synapse growth.
//!
//! Every generator is created from an explicit seed. Two engines built with
//! the same seed and fed the same activity grow identical synapse sets.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A deterministic pseudo-random number generator.
///
/// # Example
///
/// ```rust
/// use naa::utils::Random;
///
/// let mut rng = Random::new(42);
///
/// // Pick an index into a candidate pool of length 20
/// let idx = rng.get_usize(20);
/// assert!(idx < 20);
///
/// // Draw 5 distinct items
/// let picked = rng.sample((0..100u32).collect(), 5);
/// assert_eq!(picked.len(), 5);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Random {
    rng: ChaCha20Rng,
    seed: u64,
    /// Number of random values generated.
    steps: u64,
}

impl Random {
    /// Creates a new generator from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed,
            steps: 0,
        }
    }

    /// Returns the seed used for this generator.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the number of random values generated.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Generates a random u32.
    pub fn get_uint32(&mut self) -> u32 {
        self.steps += 1;
        self.rng.gen()
    }

    /// Generates a random usize in the range [0, n). Returns 0 when `n == 0`.
    pub fn get_usize(&mut self, n: usize) -> usize {
        self.steps += 1;
        if n == 0 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    /// Shuffles a slice in place (Fisher-Yates).
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        if n <= 1 {
            return;
        }

        for i in (1..n).rev() {
            let j = self.get_usize(i + 1);
            slice.swap(i, j);
        }
    }

    /// Samples `k` unique items without replacement.
    ///
    /// If `k >= items.len()`, returns a shuffled copy of all items.
    pub fn sample<T>(&mut self, mut items: Vec<T>, k: usize) -> Vec<T> {
        let n = items.len();
        if k >= n {
            self.shuffle(&mut items);
            return items;
        }

        // Partial Fisher-Yates
        for i in 0..k {
            let j = self.get_usize(n - i) + i;
            items.swap(i, j);
        }

        items.truncate(k);
        items
    }
}

impl Clone for Random {
    fn clone(&self) -> Self {
        Self {
            rng: self.rng.clone(),
            seed: self.seed,
            steps: self.steps,
        }
    }
}

impl std::fmt::Debug for Random {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Random")
            .field("seed", &self.seed)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
