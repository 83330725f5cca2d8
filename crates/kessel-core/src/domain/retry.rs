//! Retry policy: backoff applied to a rolled-back message.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff for transient failures.
///
/// When configured on an adapter, a rollback pushes `header.delay` forward by
/// `next_delay(attempts)` so the message is not redelivered immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failure, in milliseconds.
    pub base_delay_ms: u64,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay, in milliseconds.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

impl RetryPolicy {
    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay_ms: saturating_millis(base_delay),
            multiplier,
            max_delay_ms: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = Some(saturating_millis(max_delay));
        self
    }

    /// Delay before the next delivery.
    ///
    /// `attempts` is the counter after the rollback increment (1 on the first
    /// failure): delay = base * multiplier^(attempts - 1), capped at max_delay.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        if let Some(max) = self.max_delay_ms {
            delay_ms = delay_ms.min(max as f64);
        }
        if !delay_ms.is_finite() || delay_ms < 0.0 {
            return Duration::from_millis(self.max_delay_ms.unwrap_or(u64::MAX));
        }
        Duration::from_millis(delay_ms.min(u64::MAX as f64) as u64)
    }
}

fn saturating_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Default for RetryPolicy {
    /// 2s base, doubling.
    fn default() -> Self {
        Self::exponential(Duration::from_secs(2), 2.0)
    }
}
