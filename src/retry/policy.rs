//! Executes operations under a retry policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::classify::{Classify, Retryability};
use super::config::{ConfigError, RetryConfig};
use super::schedule::{Attempt, Outcome, Schedule};

/// A [`RetryConfig`] paired with the classifier that decides which errors
/// are worth another attempt.
///
/// The final error is always handed back unchanged: a fatal error right
/// away, a transient one once the attempt or time budget runs out. Callers
/// that want the attempt count or elapsed time pass an observer to
/// [`RetryPolicy::execute_observed`].
pub struct RetryPolicy<E> {
    config: RetryConfig,
    classifier: Arc<dyn Classify<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E> RetryPolicy<E> {
    pub fn new<C>(config: RetryConfig, classifier: C) -> Result<Self, ConfigError>
    where
        C: Classify<E> + 'static,
    {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Arc::new(classifier),
        })
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn classify(&self, error: &E) -> Retryability {
        self.classifier.classify(error)
    }

    /// Same classifier, different numbers.
    pub fn with_config(&self, config: RetryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Arc::clone(&self.classifier),
        })
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_observed(operation, |_, _| {}).await
    }

    /// Runs `operation` until it succeeds, fails fatally, or the budget is
    /// spent. `observer` sees every attempt, with the error when it failed.
    pub async fn execute_observed<T, F, Fut, O>(
        &self,
        mut operation: F,
        mut observer: O,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        O: FnMut(&Attempt, Option<&E>),
    {
        let started = tokio::time::Instant::now();
        let mut schedule = Schedule::new(&self.config);

        loop {
            let number = schedule.begin_attempt();
            let result = operation().await;
            let elapsed = started.elapsed();

            let error = match result {
                Ok(value) => {
                    observer(&Attempt::success(number, elapsed), None);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let attempt = self.failed_attempt(&schedule, &error, number, elapsed);
            observer(&attempt, Some(&error));

            let Some(delay) = attempt.next_delay else {
                return Err(error);
            };
            drop(error);
            tokio::time::sleep(delay).await;
        }
    }

    /// Blocking counterpart of [`RetryPolicy::execute`]; waits with
    /// `std::thread::sleep`.
    pub fn execute_blocking<T, F>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.execute_blocking_observed(operation, |_, _| {})
    }

    pub fn execute_blocking_observed<T, F, O>(&self, mut operation: F, mut observer: O) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        O: FnMut(&Attempt, Option<&E>),
    {
        let started = std::time::Instant::now();
        let mut schedule = Schedule::new(&self.config);

        loop {
            let number = schedule.begin_attempt();
            let result = operation();
            let elapsed = started.elapsed();

            let error = match result {
                Ok(value) => {
                    observer(&Attempt::success(number, elapsed), None);
                    return Ok(value);
                }
                Err(error) => error,
            };

            let attempt = self.failed_attempt(&schedule, &error, number, elapsed);
            observer(&attempt, Some(&error));

            let Some(delay) = attempt.next_delay else {
                return Err(error);
            };
            drop(error);
            std::thread::sleep(delay);
        }
    }

    fn failed_attempt(
        &self,
        schedule: &Schedule<'_>,
        error: &E,
        number: u32,
        elapsed: Duration,
    ) -> Attempt {
        let (outcome, next_delay) = match self.classifier.classify(error) {
            Retryability::Fatal => (Outcome::FatalFailure, None),
            Retryability::Retryable => (Outcome::RetryableFailure, schedule.next_delay(elapsed)),
        };
        Attempt {
            number,
            elapsed,
            outcome,
            next_delay,
        }
    }
}

impl Attempt {
    fn success(number: u32, elapsed: Duration) -> Self {
        Self {
            number,
            elapsed,
            outcome: Outcome::Success,
            next_delay: None,
        }
    }
}
