use std::time::Duration;

/// Exponential backoff between delivery attempts, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Delivery attempts before a task is marked `FAILED`
    pub max_attempts: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(30), max_delay: Duration::from_secs(30 * 60), max_attempts: 3 }
    }
}

impl RetryPolicy {
    /// The wait after the `attempt`th failed delivery (1-based): `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: i64) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 31) as u32;
        self.base_delay.checked_mul(1u32 << exponent).map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}
