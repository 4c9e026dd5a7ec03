//! Bounded retry with exponential backoff and jitter.
//!
//! A [`RetryPolicy`] wraps any fallible operation. Each failure is passed to
//! the policy's classifier; fatal errors return at once, transient ones are
//! retried after `base_delay * backoff_factor^(attempt - 1)` until
//! `max_attempts` invocations have been made or the next wait would push the
//! elapsed time past `max_total`.
//!
//! The engine reads no configuration and writes no logs. Configuration comes
//! from [`crate::settings`]; diagnostics are the caller's job through the
//! observer passed to [`RetryPolicy::execute_observed`].

mod classify;
mod config;
mod policy;
mod schedule;

pub use classify::{Classify, Retryability, always_retry};
pub use config::{
    ConfigError, DEFAULT_BACKOFF_FACTOR, DEFAULT_DELAY_SECONDS, DEFAULT_MAX_ATTEMPTS, Jitter,
    RetryConfig, seconds,
};
pub use policy::RetryPolicy;
pub use schedule::{Attempt, Outcome, Schedule};
