//! Delay schedules for attempt retries and confirmation polling

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential delay between attempts: `min(base * 2^(a-1), max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryBackoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Delay to wait after attempt `attempt` (1-based) resolved retryably
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Sum of delays across `attempts` attempts (the last one never waits)
    pub fn total_delay(&self, attempts: u32) -> Duration {
        (1..attempts).map(|a| self.delay_after(a)).sum()
    }
}

/// Capped geometric schedule for status polling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollSchedule {
    #[serde(default = "default_poll_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_poll_growth")]
    pub growth: f64,
    #[serde(default = "default_poll_max_ms")]
    pub max_ms: u64,
}

fn default_poll_base_ms() -> u64 { 1_000 }
fn default_poll_growth() -> f64 { 1.5 }
fn default_poll_max_ms() -> u64 { 10_000 }

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            base_ms: default_poll_base_ms(),
            growth: default_poll_growth(),
            max_ms: default_poll_max_ms(),
        }
    }
}

impl PollSchedule {
    /// Delay before poll `n` (0-based) after the first status check
    pub fn delay(&self, n: u32) -> Duration {
        let growth = self.growth.max(1.0);
        let raw = self.base_ms as f64 * growth.powi(n.min(i32::MAX as u32) as i32);
        let capped = raw.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_ms == 0 {
            return Err("poll base_ms must be greater than zero".to_string());
        }
        if !(self.growth >= 1.0) {
            return Err(format!("poll growth must be >= 1.0, got {}", self.growth));
        }
        if self.base_ms > self.max_ms {
            return Err("poll base_ms must not exceed max_ms".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_then_caps() {
        let backoff = RetryBackoff::new(500, 3_000);
        assert_eq!(backoff.delay_after(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_after(2), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(2_000));
        assert_eq!(backoff.delay_after(4), Duration::from_millis(3_000));
        assert_eq!(backoff.delay_after(40), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retry_backoff_huge_attempt_saturates() {
        let backoff = RetryBackoff::new(u64::MAX / 2, u64::MAX);
        assert_eq!(backoff.delay_after(u32::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_total_delay() {
        let backoff = RetryBackoff::new(100, 250);
        // 100 + 200 + 250
        assert_eq!(backoff.total_delay(4), Duration::from_millis(550));
        assert_eq!(backoff.total_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_poll_schedule_defaults() {
        let poll = PollSchedule::default();
        assert_eq!(poll.delay(0), Duration::from_millis(1_000));
        assert_eq!(poll.delay(1), Duration::from_millis(1_500));
        assert_eq!(poll.delay(2), Duration::from_millis(2_250));
        assert_eq!(poll.delay(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_poll_schedule_validate() {
        assert!(PollSchedule::default().validate().is_ok());
        let shrinking = PollSchedule {
            growth: 0.5,
            ..PollSchedule::default()
        };
        assert!(shrinking.validate().is_err());
    }
}
