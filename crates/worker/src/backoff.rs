//! Exponential backoff for retryable provider errors.

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first error.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl BackoffConfig {
    /// Doubling from `initial_delay`, capped at 60 seconds.
    pub fn starting_at(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }

    /// Delay before the next attempt after `consecutive_errors` failures in a row.
    pub fn delay_after(&self, consecutive_errors: i32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..consecutive_errors {
            delay = next_delay(delay, self);
        }
        delay
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_delay_doubles() {
        let config = BackoffConfig::starting_at(Duration::from_secs(5));
        assert_eq!(next_delay(Duration::from_secs(5), &config), Duration::from_secs(10));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = BackoffConfig::starting_at(Duration::from_secs(5));
        assert_eq!(next_delay(Duration::from_secs(40), &config), Duration::from_secs(60));
        assert_eq!(next_delay(Duration::from_secs(60), &config), Duration::from_secs(60));
    }

    #[test]
    fn full_backoff_sequence() {
        let config = BackoffConfig::starting_at(Duration::from_secs(5));
        let expected = [5, 10, 20, 40, 60, 60];

        for (errors, &expected_secs) in (1..).zip(expected.iter()) {
            assert_eq!(config.delay_after(errors).as_secs(), expected_secs);
        }
    }

    #[test]
    fn zero_errors_uses_initial_delay() {
        let config = BackoffConfig::starting_at(Duration::from_secs(5));
        assert_eq!(config.delay_after(0), Duration::from_secs(5));
    }
}
