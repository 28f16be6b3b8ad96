//! Delay schedule between regeneration attempts.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the pause grows from one retry to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Doubles on every retry.
    #[default]
    Exponential,
    /// Grows by the base delay on every retry.
    Linear,
    /// Always the base delay.
    Constant,
}

impl BackoffStrategy {
    /// Option values accepted in component configuration.
    pub const NAMES: [&'static str; 3] = ["exponential", "linear", "constant"];

    /// Parses a configuration value.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "exponential" => Some(Self::Exponential),
            "linear" => Some(Self::Linear),
            "constant" => Some(Self::Constant),
            _ => None,
        }
    }

    fn scale(self, base_ms: u64, retry: u32) -> u64 {
        match self {
            Self::Exponential => base_ms.saturating_mul(2u64.saturating_pow(retry.saturating_sub(1))),
            Self::Linear => base_ms.saturating_mul(u64::from(retry.max(1))),
            Self::Constant => base_ms,
        }
    }
}

/// Randomisation applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Use the computed delay as is.
    None,
    /// Anywhere between zero and the delay.
    Full,
    /// Half the delay plus a random share of the other half.
    #[default]
    Equal,
}

impl JitterStrategy {
    fn apply(self, delay_ms: u64) -> u64 {
        match self {
            Self::None => delay_ms,
            Self::Full if delay_ms > 0 => rand::thread_rng().gen_range(0..=delay_ms),
            Self::Equal if delay_ms > 1 => {
                let half = delay_ms / 2;
                half + rand::thread_rng().gen_range(0..=delay_ms - half)
            }
            Self::Full | Self::Equal => delay_ms,
        }
    }
}

/// Attempt budget and pause schedule for a bounded retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first one.
    pub max_attempts: usize,
    /// Pause before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single pause, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth of the pause.
    pub backoff: BackoffStrategy,
    /// Randomisation of the pause.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 10_000,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Equal,
        }
    }
}

impl RetryConfig {
    /// Creates the default schedule: three attempts, no pause.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the first pause.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.base_delay_ms = delay_ms;
        self
    }

    /// Sets the pause cap.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the attempt budget, never less than one.
    #[must_use]
    pub fn attempt_budget(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    /// (1-based).
    #[must_use]
    pub fn allows_retry_after(&self, attempt: usize) -> bool {
        attempt < self.attempt_budget()
    }

    /// Pause before retry number `retry` (1-based), before jitter.
    #[must_use]
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.backoff.scale(self.base_delay_ms, retry).min(self.max_delay_ms))
    }

    /// Pause before retry number `retry` (1-based), with jitter.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let nominal = self.backoff.scale(self.base_delay_ms, retry).min(self.max_delay_ms);
        Duration::from_millis(self.jitter.apply(nominal))
    }
}
