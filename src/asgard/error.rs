use crate::http::HttpError;
use crate::retry::ConfigError;

/// Failures talking to Asgard.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AsgardError {
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Asgard backend error: {0}")]
    Backend(String),
    #[error("Unexpected data from Asgard: {0}")]
    BackendData(String),
    #[error("{0}")]
    AsgCountZero(String),
    #[error("Java socket error in Asgard: {0}")]
    JavaSocket(String),
    #[error("Autoscale group {0} does not exist")]
    AsgDoesNotExist(String),
    #[error("Cluster {0} does not exist")]
    ClusterDoesNotExist(String),
    #[error("{0}")]
    CannotDisableActiveAsg(String),
    #[error("{0}")]
    CannotDeleteActiveAsg(String),
    #[error("{0}")]
    CannotDeleteLastAsg(String),
    #[error("Request to Asgard failed: {0}")]
    Transport(String),
    #[error("Invalid Asgard retry settings: {0}")]
    Config(#[from] ConfigError),
}

/// Variant tags, used to list which failures an operation retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsgardErrorKind {
    RateLimited,
    Timeout,
    Backend,
    BackendData,
    AsgCountZero,
    JavaSocket,
    AsgDoesNotExist,
    ClusterDoesNotExist,
    CannotDisableActiveAsg,
    CannotDeleteActiveAsg,
    CannotDeleteLastAsg,
    Transport,
    Config,
}

impl AsgardError {
    pub fn kind(&self) -> AsgardErrorKind {
        match self {
            AsgardError::RateLimited(_) => AsgardErrorKind::RateLimited,
            AsgardError::Timeout(_) => AsgardErrorKind::Timeout,
            AsgardError::Backend(_) => AsgardErrorKind::Backend,
            AsgardError::BackendData(_) => AsgardErrorKind::BackendData,
            AsgardError::AsgCountZero(_) => AsgardErrorKind::AsgCountZero,
            AsgardError::JavaSocket(_) => AsgardErrorKind::JavaSocket,
            AsgardError::AsgDoesNotExist(_) => AsgardErrorKind::AsgDoesNotExist,
            AsgardError::ClusterDoesNotExist(_) => AsgardErrorKind::ClusterDoesNotExist,
            AsgardError::CannotDisableActiveAsg(_) => AsgardErrorKind::CannotDisableActiveAsg,
            AsgardError::CannotDeleteActiveAsg(_) => AsgardErrorKind::CannotDeleteActiveAsg,
            AsgardError::CannotDeleteLastAsg(_) => AsgardErrorKind::CannotDeleteLastAsg,
            AsgardError::Transport(_) => AsgardErrorKind::Transport,
            AsgardError::Config(_) => AsgardErrorKind::Config,
        }
    }

    /// Maps a failed HTTP exchange. Request timeouts keep their meaning.
    pub(crate) fn from_http(error: anyhow::Error) -> Self {
        match error.downcast_ref::<HttpError>() {
            Some(HttpError::Transport { source, url }) if source.is_timeout() => {
                AsgardError::Timeout(format!("request to {} timed out", url))
            }
            _ => AsgardError::Transport(format!("{:#}", error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            AsgardError::RateLimited("x".into()).kind(),
            AsgardErrorKind::RateLimited
        );
        assert_eq!(
            AsgardError::AsgDoesNotExist("loadtest-edx-edxapp-v058".into()).kind(),
            AsgardErrorKind::AsgDoesNotExist
        );
        assert_eq!(
            AsgardError::Config(ConfigError::MaxAttempts(0)).kind(),
            AsgardErrorKind::Config
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            AsgardError::AsgDoesNotExist("test-asg".into()).to_string(),
            "Autoscale group test-asg does not exist"
        );
        assert_eq!(
            AsgardError::Backend("boom".into()).to_string(),
            "Asgard backend error: boom"
        );
    }

    #[test]
    fn test_from_http_non_timeout_is_transport() {
        let err = AsgardError::from_http(anyhow::anyhow!("connection reset"));
        assert_eq!(err.kind(), AsgardErrorKind::Transport);
    }
}
