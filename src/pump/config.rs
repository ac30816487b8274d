//! Backoff tuning for the pump

use std::time::Duration;

/// Default exponential base
pub const DEFAULT_EXP_BASE: f64 = 6.0;

/// Default ceiling for a single sleep
pub const DEFAULT_MAX_SLEEP: Duration = Duration::from_secs(2);

/// Default number of consecutive identical errors tolerated
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// Backoff applied after consecutive identical read errors
///
/// The sleep after the `n`th consecutive error is
/// `min(exp_base^n + offset_ms, max_sleep)` milliseconds.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Exponential base
    pub exp_base: f64,

    /// Constant added to every sleep, in milliseconds
    pub offset_ms: f64,

    /// Upper bound for a single sleep
    pub max_sleep: Duration,

    /// Consecutive identical errors after which the pump gives up
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            exp_base: DEFAULT_EXP_BASE,
            offset_ms: 0.0,
            max_sleep: DEFAULT_MAX_SLEEP,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffConfig {
    /// Set the exponential base
    pub fn exp_base(mut self, base: f64) -> Self {
        self.exp_base = base;
        self
    }

    /// Set the constant offset in milliseconds
    pub fn offset_ms(mut self, offset: f64) -> Self {
        self.offset_ms = offset;
        self
    }

    /// Set the sleep ceiling
    pub fn max_sleep(mut self, max: Duration) -> Self {
        self.max_sleep = max;
        self
    }

    /// Set the number of tolerated consecutive errors (at least 1)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sleep after the `attempt`th consecutive error
    pub fn sleep_for(&self, attempt: u32) -> Duration {
        let millis = self.exp_base.powi(attempt.min(i32::MAX as u32) as i32) + self.offset_ms;
        let cap = self.max_sleep.as_secs_f64() * 1000.0;

        // Overflow and NaN fall back to the ceiling
        let millis = if millis.is_finite() { millis.clamp(0.0, cap) } else { cap };
        Duration::from_nanos((millis * 1_000_000.0).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BackoffConfig::default();

        assert_eq!(config.exp_base, DEFAULT_EXP_BASE);
        assert_eq!(config.offset_ms, 0.0);
        assert_eq!(config.max_sleep, DEFAULT_MAX_SLEEP);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_sleep_grows_exponentially() {
        let config = BackoffConfig::default();

        assert_eq!(config.sleep_for(1), Duration::from_millis(6));
        assert_eq!(config.sleep_for(2), Duration::from_millis(36));
        assert_eq!(config.sleep_for(3), Duration::from_millis(216));
    }

    #[test]
    fn test_sleep_capped() {
        let config = BackoffConfig::default();

        assert_eq!(config.sleep_for(5), Duration::from_secs(2));
        assert_eq!(config.sleep_for(1000), Duration::from_secs(2));
    }

    #[test]
    fn test_offset_applied() {
        let config = BackoffConfig::default().exp_base(2.0).offset_ms(10.0);

        assert_eq!(config.sleep_for(3), Duration::from_millis(18));
    }

    #[test]
    fn test_builder_max_attempts_floor() {
        let config = BackoffConfig::default().max_attempts(0);

        assert_eq!(config.max_attempts, 1);
    }
}
