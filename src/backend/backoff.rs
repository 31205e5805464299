//! Transport-level retry policy with exponential backoff and jitter.
//!
//! Backends never retry on their own. The orchestrator wraps each backend
//! call in [`with_backoff`](super::with_backoff) using a [`BackoffConfig`].
//! The default is [`BackoffConfig::none()`]: one attempt per format.

use std::time::Duration;

/// Retry policy for transient backend failures (429, 5xx, connection errors,
/// timeouts).
///
/// # Example
///
/// ```
/// use content_formats::backend::BackoffConfig;
///
/// let none = BackoffConfig::none();
/// assert_eq!(none.max_retries, 0);
///
/// let cloud = BackoffConfig::standard().with_max_retries(2);
/// assert_eq!(cloud.max_retries, 2);
/// ```
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Maximum number of retries after the first attempt. Default: 0.
    pub max_retries: u32,

    /// Delay before the first retry. Default: 1 second.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry. Default: 2.0.
    pub multiplier: f64,

    /// Upper bound on any single delay. Default: 30 seconds.
    pub max_delay: Duration,

    /// Jitter strategy. Default: Full.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry. Default: `[429, 500, 502, 503, 504]`.
    pub retryable_statuses: Vec<u16>,

    /// Honour `Retry-After` from the provider when present. Default: `true`.
    pub respect_retry_after: bool,
}

/// Jitter strategy, so concurrent formats hitting a shared rate limit do not
/// retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// Delay is exactly the calculated value.
    None,

    /// Random value in `[0, calculated_delay]`.
    Full,

    /// `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
}

impl BackoffConfig {
    /// No transport retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::standard()
        }
    }

    /// Defaults for cloud APIs: 3 retries, 1s initial, 2x multiplier,
    /// 30s max, full jitter, respects Retry-After.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Batch-friendly preset: 5 retries, 500ms initial, 2 minute cap.
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(120),
            ..Self::standard()
        }
    }

    /// Override the retry count, keeping every other setting.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Calculate the delay for attempt N (0-indexed).
    ///
    /// The base delay is `initial_delay * multiplier^attempt`, capped at
    /// `max_delay`, then jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(max_delay: Duration) -> BackoffConfig {
        BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay,
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        }
    }

    #[test]
    fn test_backoff_delay_exponential() {
        let config = fixed(Duration::from_secs(60));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let config = fixed(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_equal_jitter_keeps_lower_half() {
        let config = BackoffConfig {
            jitter: JitterStrategy::Equal,
            ..fixed(Duration::from_secs(60))
        };
        for _ in 0..50 {
            let d = config.delay_for_attempt(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2), "{:?}", d);
        }
    }

    #[test]
    fn test_default_is_none() {
        let config = BackoffConfig::default();
        assert_eq!(config.max_retries, 0);
        assert!(config.retryable_statuses.contains(&429));
    }
}
