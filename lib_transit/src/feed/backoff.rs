//! Reconnect delays: exponential growth from a base delay up to a cap, with
//! jitter drawn from the upper half of each step.

use std::time::Duration;

use rand::Rng;

/// Reconnect pacing for the feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base: Duration::from_millis(1000), max: Duration::from_millis(60_000) }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        // The cap never sits below the base.
        Self { base, max: max.max(base) }
    }

    /// Un-jittered delay before retry number `attempt` (0-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry number `attempt`, uniformly drawn from
    /// `[ceiling/2, ceiling]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        let upper = ceiling.as_millis() as u64;
        if upper == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(upper / 2..=upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles_until_capped() {
        let backoff = Backoff::default();
        assert_eq!(backoff.ceiling(0), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(1), Duration::from_secs(2));
        assert_eq!(backoff.ceiling(5), Duration::from_secs(32));
        assert_eq!(backoff.ceiling(6), Duration::from_secs(60));
        assert_eq!(backoff.ceiling(400), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(5_000));
        for attempt in 0..20 {
            let delay = backoff.delay(attempt);
            assert!(delay >= Duration::from_millis(50), "attempt {attempt}: {delay:?}");
            assert!(delay <= Duration::from_millis(5_000), "attempt {attempt}: {delay:?}");
            assert!(delay >= backoff.ceiling(attempt) / 2);
        }
    }

    #[test]
    fn test_cap_below_base_is_raised() {
        let backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(2));
        assert_eq!(Backoff::new(Duration::ZERO, Duration::ZERO).delay(4), Duration::ZERO);
    }
}
