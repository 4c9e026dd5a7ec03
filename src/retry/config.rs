//! Retry configuration and its validation.

use rand::Rng;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_DELAY_SECONDS: f64 = 5.0;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Rejected retry settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be greater than or equal to 1, got {0}")]
    MaxAttempts(u32),
    #[error("{name} must be a finite number of seconds >= 0, got {value}")]
    Seconds { name: &'static str, value: f64 },
    #[error("backoff_factor must be a finite number >= 1.0, got {0}")]
    BackoffFactor(f64),
}

/// Randomized perturbation added to each computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Jitter {
    #[default]
    None,
    /// Adds a uniformly distributed value in `[0, bound)`.
    Additive(Duration),
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Additive(bound) if bound.is_zero() => delay,
            Jitter::Additive(bound) => {
                let extra = rand::thread_rng().gen_range(0.0..bound.as_secs_f64());
                delay.saturating_add(Duration::from_secs_f64(extra))
            }
        }
    }
}

/// Numeric part of a retry policy. Immutable once a call starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total invocations including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on elapsed time; `None` means unbounded.
    pub max_total: Option<Duration>,
    pub backoff_factor: f64,
    /// Cap on one computed delay, applied before jitter.
    pub max_delay: Option<Duration>,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs_f64(DEFAULT_DELAY_SECONDS),
            max_total: None,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: None,
            jitter: Jitter::None,
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Fixed interval between attempts, used for status polling.
    pub fn constant(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: interval,
            backoff_factor: 1.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::MaxAttempts(self.max_attempts));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let delay = Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Delay after `attempt` with jitter applied.
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.delay_for(attempt))
    }
}

/// Converts a seconds value from configuration into a `Duration`.
pub fn seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Seconds { name, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::Seconds { name, value })
}
