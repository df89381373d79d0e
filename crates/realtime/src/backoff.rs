//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Fraction of the base delay used as the jitter range (±25%).
const JITTER_RATIO: f64 = 0.25;

/// Retry delay policy for one retry domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    #[serde(rename = "initial_delay_ms", with = "crate::config::duration_ms")]
    pub initial_delay: Duration,
    /// Upper bound for any delay, jitter included.
    #[serde(rename = "max_delay_ms", with = "crate::config::duration_ms")]
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Adds a uniform ±25% offset when set.
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64, jitter: bool) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        }
    }

    /// `min(initial_delay * multiplier^attempt, max_delay)` in milliseconds,
    /// with a 0-based attempt.
    fn base_millis(&self, attempt: u32) -> f64 {
        let exp = attempt.min(63) as i32;
        let max = self.max_delay.as_millis() as f64;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        ms.min(max)
    }

    /// Delay without jitter for a 0-based attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_millis(attempt).round() as u64)
    }

    /// Delay for a 0-based attempt, jittered when enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.jitter {
            return self.base_delay(attempt);
        }
        let offset = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_with_offset(attempt, offset)
    }

    /// Delay for a 0-based attempt with an explicit jitter position in
    /// `[-1.0, 1.0]` (`-1.0` is the low end of the ±25% band).
    ///
    /// The result is clamped to `[0, max_delay]` and rounded to whole
    /// milliseconds.
    pub fn delay_with_offset(&self, attempt: u32, offset: f64) -> Duration {
        let base = self.base_millis(attempt);
        let max = self.max_delay.as_millis() as f64;
        let jittered = base + base * JITTER_RATIO * offset.clamp(-1.0, 1.0);
        Duration::from_millis(jittered.clamp(0.0, max).round() as u64)
    }
}
