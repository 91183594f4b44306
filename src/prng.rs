//! Seeded linear-congruential stream.
//!
//! The same constants are used by the Node and Java versions of these
//! benchmarks, so a given seed yields the same sequence in every language.

const MULTIPLIER: u64 = 9301;
const INCREMENT: u64 = 49297;
const MODULUS: u64 = 233_280;

/// LCG state. `next` consumes the state and hands back its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lcg {
    seed: u64,
}

impl Lcg {
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed derived from the first character of a device id, times 1000.
    pub fn for_device(device_id: &str) -> Self {
        let first = device_id.chars().next().map_or(0, u64::from);
        Self::new(first * 1000)
    }

    /// Returns a value in `[0, 1)` and the advanced state.
    #[inline]
    pub fn next(self) -> (f64, Self) {
        let seed = (self.seed * MULTIPLIER + INCREMENT) % MODULUS;
        (seed as f64 / MODULUS as f64, Self { seed })
    }
}
