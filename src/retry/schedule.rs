//! Attempt bookkeeping shared by the async and blocking executors.

use std::time::Duration;

use super::config::RetryConfig;

/// Result of a single invocation as seen by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

/// Transient record of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based ordinal.
    pub number: u32,
    /// Time since the first invocation started, measured after this one.
    pub elapsed: Duration,
    pub outcome: Outcome,
    /// Wait before the next invocation; `None` when this was the last one.
    pub next_delay: Option<Duration>,
}

impl Attempt {
    /// True when the loop stopped on a transient error because the budget ran out.
    pub fn is_exhausted(&self) -> bool {
        self.outcome == Outcome::RetryableFailure && self.next_delay.is_none()
    }
}

/// Counts attempts and decides whether another one fits the budget.
#[derive(Debug)]
pub struct Schedule<'a> {
    config: &'a RetryConfig,
    attempt: u32,
}

impl<'a> Schedule<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Registers the start of an invocation and returns its ordinal.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt after a retryable failure, or `None`
    /// if the attempt or time budget is spent.
    pub fn next_delay(&self, elapsed: Duration) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }

        let delay = self.config.jittered_delay_for(self.attempt);

        if let Some(max_total) = self.config.max_total {
            if elapsed.saturating_add(delay) > max_total {
                return None;
            }
        }

        Some(delay)
    }
}
