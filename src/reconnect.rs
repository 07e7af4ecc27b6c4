//! Exponential backoff with jitter for reconnect loops.
//!
//! The core [`connect`](crate::SyncClient::connect) never retries on its own. Callers that want
//! automatic reconnection drive a [`Backoff`] themselves, or use
//! `SyncClient::reconnect_with_backoff` behind the `tokio` feature.

use web_time::Duration;

use crate::rng::Pcg32;
use crate::ReconnectConfig;

/// Yields the delay to wait before each reconnect attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempts: u32,
    rng: Pcg32,
}

impl Backoff {
    /// Creates a backoff seeded from the wall clock.
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self::with_rng(config, Pcg32::from_clock())
    }

    /// Creates a backoff with a fixed seed, for reproducible delays.
    #[must_use]
    pub fn seeded(config: ReconnectConfig, seed: u64) -> Self {
        Self::with_rng(config, Pcg32::seeded(seed))
    }

    fn with_rng(config: ReconnectConfig, rng: Pcg32) -> Self {
        Self {
            config,
            attempts: 0,
            rng,
        }
    }

    /// Attempts handed out since construction or the last [`reset`](Self::reset).
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay before the next attempt, or `None` once `max_attempts` is used up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self
            .config
            .max_attempts
            .is_some_and(|max| self.attempts >= max)
        {
            return None;
        }
        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        self.attempts = self.attempts.saturating_add(1);

        let max = self.config.max_delay.as_secs_f64();
        let base = (self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(exponent))
        .min(max);
        let spread = self.config.jitter * (self.rng.unit_f64() * 2.0 - 1.0);
        let delay = (base * (1.0 + spread)).clamp(0.0, max);
        Some(Duration::from_secs_f64(delay))
    }

    /// Starts over after a successful connect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn steady() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts: Some(6),
        }
    }

    #[test]
    fn delays_grow_then_cap() {
        let mut backoff = Backoff::seeded(steady(), 7);
        let delays: Vec<u128> = std::iter::from_fn(|| backoff.next_delay())
            .map(|delay| delay.as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn reset_starts_over() {
        let mut backoff = Backoff::seeded(steady(), 7);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = ReconnectConfig {
            jitter: 0.5,
            max_attempts: None,
            ..steady()
        };
        let mut backoff = Backoff::seeded(config, 42);
        let first = backoff.next_delay().unwrap();
        assert!(first >= Duration::from_millis(50));
        assert!(first <= Duration::from_millis(150));
        for _ in 0..50 {
            assert!(backoff.next_delay().unwrap() <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn same_seed_same_delays() {
        let config = ReconnectConfig {
            jitter: 0.3,
            ..steady()
        };
        let left: Vec<_> = {
            let mut backoff = Backoff::seeded(config, 3);
            std::iter::from_fn(|| backoff.next_delay()).collect()
        };
        let right: Vec<_> = {
            let mut backoff = Backoff::seeded(config, 3);
            std::iter::from_fn(|| backoff.next_delay()).collect()
        };
        assert_eq!(left, right);
    }
}
