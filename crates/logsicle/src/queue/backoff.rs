use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponential retry delay: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// Delay before retrying an item that has failed `attempt` times (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        if !self.jitter || capped.is_zero() {
            return capped;
        }
        let upper = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        let lower = upper / 2;
        Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
    }

    fn capped_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl From<&RetryConfig> for Backoff {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.base_delay, config.max_delay, config.jitter)
    }
}
