//! PCG-XSH-RR generator used for reconnect jitter.
//!
//! Seeded instances are deterministic, so backoff schedules can be replayed in tests.
//!
//! ```rust
//! use lurelands_sync::rng::Pcg32;
//!
//! let mut rng = Pcg32::seeded(12345);
//! assert!((0.0..1.0).contains(&rng.unit_f64()));
//! ```

use std::hash::{Hash, Hasher};

use web_time::{SystemTime, UNIX_EPOCH};

use crate::hash::FnvHasher;

const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const STREAM: u64 = 1_442_695_040_888_963_407;

/// 64 bits of state, 32 bits of output. Not for anything secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    increment: u64,
}

impl Pcg32 {
    /// A generator that always yields the same sequence for `seed`.
    #[must_use]
    pub const fn seeded(seed: u64) -> Self {
        let increment = (STREAM << 1) | 1;
        let state = increment
            .wrapping_add(seed)
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(increment);
        Self { state, increment }
    }

    /// A generator seeded from the wall clock and the current thread.
    #[must_use]
    pub fn from_clock() -> Self {
        let mut hasher = FnvHasher::new();
        std::thread::current().id().hash(&mut hasher);
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default()
            .hash(&mut hasher);
        Self::seeded(hasher.finish())
    }

    /// The next 32 random bits.
    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(MULTIPLIER).wrapping_add(self.increment);
        let mixed = (((old >> 18) ^ old) >> 27) as u32;
        mixed.rotate_right((old >> 59) as u32)
    }

    /// The next 64 random bits.
    pub fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    /// Uniform in `[0, 1)`.
    pub fn unit_f64(&mut self) -> f64 {
        // 53 bits fill an f64 mantissa
        (self.next_u64() >> 11) as f64 / (1_u64 << 53) as f64
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seeded(42);
        let mut b = Pcg32::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seeded(1);
        let mut b = Pcg32::seeded(2);
        let left: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let right: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(left, right);
    }

    #[test]
    fn unit_floats_stay_in_range() {
        let mut rng = Pcg32::seeded(7);
        for _ in 0..1000 {
            assert!((0.0..1.0).contains(&rng.unit_f64()));
        }
    }
}
