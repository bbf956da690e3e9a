//! Reconnect backoff policy.
//!
//! The push channel reconnects after a delay that doubles with every
//! consecutive failure:
//!
//! `delay(n) = min(max_delay, base_delay * 2^(n-1))` for the 1-based attempt `n`.
//!
//! No jitter is applied. The attempt counter itself lives with the caller;
//! this module only turns a counter value into a delay.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Backoff parameters for the reconnect loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        reconnect_delay(attempt, self.base_delay_ms, self.max_delay_ms)
    }

    /// Whether `attempt` is past the configured attempt limit.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

/// Compute the delay before reconnect attempt `attempt` (1-based).
///
/// Attempt `0` is treated like attempt `1`. The shift is clamped so very
/// long failure streaks saturate at `max_delay_ms` instead of overflowing.
#[must_use]
pub fn reconnect_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let exponential = base_delay_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(exponential.min(max_delay_ms))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
