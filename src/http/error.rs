//! Typed HTTP failures.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Failures of a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },
    #[error("Rate limit exceeded at {url}: {message}")]
    RateLimited { url: String, message: String },
    #[error("Request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    /// Builds the error for a non-success response.
    ///
    /// GitHub answers an exhausted quota with a 403 whose body says so.
    pub fn from_status(status: StatusCode, url: &str, body: String) -> Self {
        if status == StatusCode::FORBIDDEN && body.to_lowercase().contains("rate limit") {
            return HttpError::RateLimited {
                url: url.to_string(),
                message: first_line(&body),
            };
        }
        HttpError::Status {
            status,
            url: url.to_string(),
            body,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            HttpError::RateLimited { .. } => Some(StatusCode::FORBIDDEN),
            HttpError::Transport { source, .. } => source.status(),
            HttpError::Decode { .. } => None,
        }
    }
}

fn first_line(body: &str) -> String {
    body.lines().next().unwrap_or_default().trim().to_string()
}

/// A response read fully into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Final URL after redirects.
    pub url: String,
    pub body: String,
}

impl RawResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self, HttpError> {
        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|source| HttpError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { status, url, body })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turns a non-2xx response into an [`HttpError`].
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(HttpError::from_status(self.status, &self.url, self.body))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(|e| HttpError::Decode {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}
