// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform integer draws behind a capability trait
//!
//! The pacing planner and the inter-post pauses draw from an injected
//! source so tests can replay a plan from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Source of uniform integer draws
pub trait Rand: Clone + Send + Sync + 'static {
    /// Uniform draw in `[min, max]` inclusive. `min >= max` yields `min`.
    fn pick(&self, min: u64, max: u64) -> u64;
}

/// Thread-local RNG for production use
#[derive(Clone, Default)]
pub struct ThreadRand;

impl Rand for ThreadRand {
    fn pick(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

/// Seeded RNG for deterministic tests
#[derive(Clone)]
pub struct SeededRand {
    rng: Arc<Mutex<StdRng>>,
}

impl SeededRand {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }
}

impl Rand for SeededRand {
    fn pick(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_stays_in_range() {
        let rand = ThreadRand;
        for _ in 0..100 {
            let v = rand.pick(5, 30);
            assert!((5..=30).contains(&v));
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        assert_eq!(ThreadRand.pick(7, 7), 7);
        assert_eq!(ThreadRand.pick(9, 3), 9);
    }

    #[test]
    fn seeded_rand_replays() {
        let a = SeededRand::new(42);
        let b = SeededRand::new(42);
        let draws_a: Vec<u64> = (0..20).map(|_| a.pick(0, 1000)).collect();
        let draws_b: Vec<u64> = (0..20).map(|_| b.pick(0, 1000)).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let a = SeededRand::new(1);
        let b = SeededRand::new(2);
        let draws_a: Vec<u64> = (0..20).map(|_| a.pick(0, 1000)).collect();
        let draws_b: Vec<u64> = (0..20).map(|_| b.pick(0, 1000)).collect();
        assert_ne!(draws_a, draws_b);
    }
}
