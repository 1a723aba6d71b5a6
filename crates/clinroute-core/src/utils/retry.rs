//! Exponential backoff policy
//!
//! Computes the wait between attempts; the caller decides whether an attempt
//! is retried and bounds the wait by its own deadline.

use std::time::Duration;

/// Exponential backoff without jitter
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied per subsequent retry
    pub multiplier: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Create a new backoff policy
    #[must_use]
    pub fn new(initial_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Delay after the `failure`-th real failure (1-based):
    /// `initial_delay * multiplier^(failure - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, failure: u32) -> Duration {
        if failure == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(failure - 1).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        if !base_ms.is_finite() || base_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(base_ms.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let backoff = Backoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(10));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), 10.0, Duration::from_millis(5000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(5000));
        assert_eq!(backoff.delay_for(400), Duration::from_millis(5000));
    }

    #[test]
    fn test_constant_backoff() {
        let backoff = Backoff::new(Duration::from_millis(250), 1.0, Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), backoff.delay_for(7));
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
    }
}
