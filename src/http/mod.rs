//! HTTP client module with retry logic and error handling.

mod classify;
mod client;
mod error;

pub use classify::{HttpClassifier, StatusTable};
pub use client::{HttpClient, execute_logged, get_once, post_form_once};
pub use error::{HttpError, RawResponse};
