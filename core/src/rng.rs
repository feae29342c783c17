//! Deterministic random number generation for the market.
//!
//! Offers are rolled from a stream seeded by (world seed, day). The same
//! day always rolls the same offers, and restoring a save never rolls at
//! all: the saved offers are applied verbatim.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct MarketRng {
    inner: Pcg64Mcg,
}

impl MarketRng {
    pub fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Stream for one in-game day. The multiplier spreads neighbouring days
    /// across the seed space.
    pub fn for_day(world_seed: u64, day: u64) -> Self {
        Self::new(world_seed ^ day.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    /// Roll a u64 in [0, n).
    pub fn next_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }
}
