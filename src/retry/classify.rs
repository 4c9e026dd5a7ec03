//! Error classification for retry decisions.

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Expected to resolve if the same operation runs again later.
    Retryable,
    /// Retrying cannot help; the error goes straight back to the caller.
    Fatal,
}

impl Retryability {
    pub fn is_retryable(self) -> bool {
        self == Retryability::Retryable
    }
}

impl From<bool> for Retryability {
    fn from(retryable: bool) -> Self {
        if retryable {
            Retryability::Retryable
        } else {
            Retryability::Fatal
        }
    }
}

/// Maps an error to a [`Retryability`].
///
/// Implemented for any `Fn(&E) -> Retryability`, so closures and plain
/// functions can be passed wherever a classifier is expected.
pub trait Classify<E>: Send + Sync {
    fn classify(&self, error: &E) -> Retryability;
}

impl<E, F> Classify<E> for F
where
    F: Fn(&E) -> Retryability + Send + Sync,
{
    fn classify(&self, error: &E) -> Retryability {
        self(error)
    }
}

/// Treats every error as transient.
pub fn always_retry<E>(_error: &E) -> Retryability {
    Retryability::Retryable
}
