//! Retry policy for queued mutations
//!
//! Delays grow exponentially per failed attempt and are capped, with
//! optional jitter so many clients coming back online do not retry in lockstep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff and retry ceiling for queue items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed attempts after which an item is marked failed (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay after the first failure in milliseconds (default: 1000ms)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any delay in milliseconds (default: 300000ms = 5min)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Growth factor per attempt (default: 2.0)
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Whether to randomize delays (default: true)
    #[serde(default = "default_true")]
    pub jitter_enabled: bool,

    /// Maximum jitter as a fraction of the delay (default: 0.1 = 10%)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_delay() -> u64 {
    1_000
}

const fn default_max_delay() -> u64 {
    300_000
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_true() -> bool {
    true
}

const fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_enabled: default_true(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, for tests and manual drains
    #[must_use]
    pub const fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter_enabled: false,
            jitter_factor: 0.0,
        }
    }

    /// Disable jitter
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }

    /// Delay before the next attempt after `retries` failures (1-indexed)
    ///
    /// delay = initial_delay * multiplier^(retries - 1), capped at max_delay.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn delay_after(&self, retries: u32) -> Duration {
        let exponent = retries.saturating_sub(1).min(64) as i32;
        let base_delay = (self.initial_delay_ms as f64) * self.multiplier.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let final_delay = if self.jitter_enabled && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Absolute time of the next attempt
    pub fn next_attempt(&self, now: DateTime<Utc>, retries: u32) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.delay_after(retries))
            .unwrap_or_else(|_| chrono::Duration::milliseconds(0));
        now + delay
    }
}
