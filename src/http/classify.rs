//! Decides which HTTP failures are worth another attempt.

use reqwest::StatusCode;

use super::error::HttpError;
use crate::retry::{ConfigError, RetryConfig, RetryPolicy, Retryability};

/// Status codes treated as transient.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTable {
    transient: Vec<StatusCode>,
    fatal: Vec<StatusCode>,
    server_errors_transient: bool,
}

impl Default for StatusTable {
    /// 408, 429 and every 5xx.
    fn default() -> Self {
        Self {
            transient: vec![StatusCode::REQUEST_TIMEOUT, StatusCode::TOO_MANY_REQUESTS],
            fatal: Vec::new(),
            server_errors_transient: true,
        }
    }
}

impl StatusTable {
    pub fn with_transient(mut self, status: StatusCode) -> Self {
        self.fatal.retain(|s| *s != status);
        self.transient.push(status);
        self
    }

    pub fn with_fatal(mut self, status: StatusCode) -> Self {
        self.transient.retain(|s| *s != status);
        self.fatal.push(status);
        self
    }

    pub fn classify(&self, status: StatusCode) -> Retryability {
        if self.fatal.contains(&status) {
            return Retryability::Fatal;
        }
        if self.transient.contains(&status)
            || (self.server_errors_transient && status.is_server_error())
        {
            return Retryability::Retryable;
        }
        Retryability::Fatal
    }
}

/// Classifies the `anyhow::Error`s produced by [`super::HttpClient`].
///
/// Errors that are neither [`HttpError`] nor `reqwest::Error` are fatal.
#[derive(Debug, Clone, Default)]
pub struct HttpClassifier {
    statuses: StatusTable,
}

impl HttpClassifier {
    pub fn new(statuses: StatusTable) -> Self {
        Self { statuses }
    }

    pub fn classify(&self, error: &anyhow::Error) -> Retryability {
        if let Some(e) = error.downcast_ref::<HttpError>() {
            return self.classify_http(e);
        }
        if let Some(e) = error.downcast_ref::<reqwest::Error>() {
            return self.classify_reqwest(e);
        }
        Retryability::Fatal
    }

    pub fn classify_http(&self, error: &HttpError) -> Retryability {
        match error {
            HttpError::Status { status, .. } => self.statuses.classify(*status),
            HttpError::RateLimited { .. } => Retryability::Retryable,
            HttpError::Transport { source, .. } => self.classify_reqwest(source),
            HttpError::Decode { .. } => Retryability::Fatal,
        }
    }

    fn classify_reqwest(&self, error: &reqwest::Error) -> Retryability {
        if let Some(status) = error.status() {
            return self.statuses.classify(status);
        }
        if error.is_builder() || error.is_decode() {
            return Retryability::Fatal;
        }
        (error.is_connect() || error.is_timeout() || error.is_request() || error.is_body()).into()
    }

    /// A policy classifying with this table.
    pub fn into_policy(self, config: RetryConfig) -> Result<RetryPolicy<anyhow::Error>, ConfigError> {
        RetryPolicy::new(config, move |error: &anyhow::Error| self.classify(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RawResponse;

    async fn error_for(status: usize, body: &str) -> anyhow::Error {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;

        let response = reqwest::Client::new().get(server.url()).send().await.unwrap();
        let raw = RawResponse::read(response).await.unwrap();
        anyhow::Error::from(raw.error_for_status().unwrap_err())
    }

    #[tokio::test]
    async fn test_classify_unauthorized_is_fatal() {
        let classifier = HttpClassifier::default();
        assert_eq!(classifier.classify(&error_for(401, "").await), Retryability::Fatal);
    }

    #[tokio::test]
    async fn test_classify_forbidden() {
        let classifier = HttpClassifier::default();
        assert_eq!(
            classifier.classify(&error_for(403, "Must have admin rights").await),
            Retryability::Fatal
        );
        assert_eq!(
            classifier.classify(&error_for(403, "API rate limit exceeded").await),
            Retryability::Retryable
        );
    }

    #[tokio::test]
    async fn test_classify_not_found_and_bad_request_are_fatal() {
        let classifier = HttpClassifier::default();
        assert_eq!(classifier.classify(&error_for(404, "").await), Retryability::Fatal);
        assert_eq!(classifier.classify(&error_for(400, "").await), Retryability::Fatal);
    }

    #[tokio::test]
    async fn test_classify_transient_statuses() {
        let classifier = HttpClassifier::default();
        for status in [408, 429, 500, 502, 503, 504] {
            assert_eq!(
                classifier.classify(&error_for(status, "").await),
                Retryability::Retryable,
                "status {}",
                status
            );
        }
    }

    #[tokio::test]
    async fn test_classify_connection_refused_is_retryable() {
        // nothing listens on port 1
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        assert!(err.is_connect());

        let classifier = HttpClassifier::default();
        assert_eq!(
            classifier.classify(&anyhow::Error::from(err)),
            Retryability::Retryable
        );
    }

    #[tokio::test]
    async fn test_classify_builder_error_is_fatal() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        let classifier = HttpClassifier::default();
        assert_eq!(
            classifier.classify(&anyhow::Error::from(err)),
            Retryability::Fatal
        );
    }

    #[test]
    fn test_unknown_errors_are_fatal() {
        let classifier = HttpClassifier::default();
        assert_eq!(
            classifier.classify(&anyhow::anyhow!("connection reset")),
            Retryability::Fatal
        );
    }

    #[test]
    fn test_context_does_not_hide_http_error() {
        let err = anyhow::Error::from(HttpError::from_status(
            StatusCode::BAD_GATEWAY,
            "http://x/",
            String::new(),
        ))
        .context("Failed to fetch pull request");
        assert_eq!(HttpClassifier::default().classify(&err), Retryability::Retryable);
    }

    #[test]
    fn test_status_table_overrides() {
        let table = StatusTable::default()
            .with_fatal(StatusCode::SERVICE_UNAVAILABLE)
            .with_transient(StatusCode::NOT_FOUND);

        assert_eq!(table.classify(StatusCode::SERVICE_UNAVAILABLE), Retryability::Fatal);
        assert_eq!(table.classify(StatusCode::INTERNAL_SERVER_ERROR), Retryability::Retryable);
        assert_eq!(table.classify(StatusCode::NOT_FOUND), Retryability::Retryable);
        assert_eq!(table.classify(StatusCode::CONFLICT), Retryability::Fatal);
    }
}
