//! Exponential reconnection delay with a cap and optional jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default upper bound on the reconnection delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Default streaming period after which the delay is reset to its base.
pub const DEFAULT_STABLE_AFTER: Duration = Duration::from_secs(60);

/// Configuration for a [`Backoff`].
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction of it (eg/ `0.3` is ±30%).
    pub jitter: f64,
    /// Sustained streaming period that resets the delay back to `base`.
    pub stable_after: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max: DEFAULT_BACKOFF_MAX,
            multiplier: 2.0,
            jitter: 0.0,
            stable_after: DEFAULT_STABLE_AFTER,
        }
    }
}

impl BackoffConfig {
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_stable_after(mut self, stable_after: Duration) -> Self {
        self.stable_after = stable_after;
        self
    }
}

/// Stateful delay calculator: `base * multiplier^attempt`, capped at `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Compute the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.config.base.as_secs_f64();
        let max = self.config.max.as_secs_f64();
        let exponent = i32::try_from(self.attempt).unwrap_or(i32::MAX);

        let mut delay = (base * self.config.multiplier.powi(exponent)).min(max);

        if self.config.jitter > 0.0 {
            let spread = self.config.jitter;
            delay *= 1.0 + rand::rng().random_range(-spread..=spread);
            delay = delay.clamp(0.0, max);
        }

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64(delay)
    }

    /// Reset after a sustained healthy connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
