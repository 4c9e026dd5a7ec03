//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;

use super::classify::HttpClassifier;
use super::error::{HttpError, RawResponse};
use crate::retry::{Outcome, RetryConfig, RetryPolicy};

/// HTTP client that runs requests under a [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy<anyhow::Error>,
}

impl HttpClient {
    /// Wraps `client`, retrying with `config` and the default status table.
    pub fn new(client: Client, config: RetryConfig) -> Result<Self> {
        let policy = HttpClassifier::default()
            .into_policy(config)
            .context("Invalid HTTP retry configuration")?;
        Ok(Self::with_policy(client, policy))
    }

    pub fn with_policy(client: Client, policy: RetryPolicy<anyhow::Error>) -> Self {
        Self { client, policy }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy<anyhow::Error> {
        &self.policy
    }

    /// Performs a GET request and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_query(url, &[]).await
    }

    /// Performs a GET request with query parameters and deserializes the JSON response.
    /// Automatically retries on transient errors.
    #[tracing::instrument(skip(self, query))]
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        debug!("GET JSON from {}...", url);

        self.with_retry("GET JSON", || async move {
            let response = self.get_once(url, query).await?.error_for_status()?;
            Ok(response.json::<T>()?)
        })
        .await
    }

    /// A single GET. Non-2xx statuses are returned, not raised.
    pub async fn get_once(&self, url: &str, query: &[(&str, &str)]) -> Result<RawResponse> {
        get_once(&self.client, url, query).await
    }

    /// Executes an async operation under this client's policy.
    pub async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        execute_logged(&self.policy, operation_name, operation).await
    }
}

/// A single GET on a plain client. Non-2xx statuses are returned, not raised.
pub async fn get_once(client: &Client, url: &str, query: &[(&str, &str)]) -> Result<RawResponse> {
    let request = client.get(url).query(query);
    Ok(send(request, url).await?)
}

/// A single form-encoded POST on a plain client. Non-2xx statuses are
/// returned, not raised.
pub async fn post_form_once(
    client: &Client,
    url: &str,
    query: &[(&str, &str)],
    form: &[(&str, &str)],
) -> Result<RawResponse> {
    debug!("POST form to {}...", url);
    let request = client.post(url).query(query).form(form);
    Ok(send(request, url).await?)
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<RawResponse, HttpError> {
    let response = request.send().await.map_err(|source| HttpError::Transport {
        url: url.to_string(),
        source,
    })?;
    RawResponse::read(response).await
}

/// Runs `operation` under `policy`, logging every failed attempt.
pub async fn execute_logged<T, E, F, Fut>(
    policy: &RetryPolicy<E>,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.config().max_attempts;
    policy
        .execute_observed(operation, |attempt, error| {
            let Some(error) = error else {
                return;
            };
            match (attempt.outcome, attempt.next_delay) {
                (Outcome::FatalFailure, _) => {
                    debug!("{}: non-retryable error: {:#}", operation_name, error);
                }
                (_, Some(delay)) => {
                    warn!(
                        "{}: attempt {}/{} failed ({:#}), retrying in {}ms...",
                        operation_name,
                        attempt.number,
                        max_attempts,
                        error,
                        delay.as_millis()
                    );
                }
                (_, None) => {
                    warn!(
                        "{}: giving up after {} attempts in {:.1}s ({:#})",
                        operation_name,
                        attempt.number,
                        attempt.elapsed.as_secs_f64(),
                        error
                    );
                }
            }
        })
        .await
}
