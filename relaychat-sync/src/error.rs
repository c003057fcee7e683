use reqwest::StatusCode;
use thiserror::Error;

/// Failure taxonomy of the sync core.
///
/// The core never retries anything itself; it classifies failures so the
/// policy layer above it can decide. Only [`SyncError::Transient`] is worth
/// retrying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The caller holds no valid session for the resource.
    #[error("authorization required: {0}")]
    Authorization(String),

    /// The conversation, cursor, or user no longer resolves.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was malformed and will not succeed on retry.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Network or backend hiccup; retryable at the policy layer.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Unexpected failure; logged, never retried blindly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether a retry at the policy layer can reasonably succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Maps an HTTP response status to the taxonomy.
    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authorization(message),
            StatusCode::NOT_FOUND => Self::NotFound(message),
            StatusCode::BAD_REQUEST | StatusCode::NOT_ACCEPTABLE => Self::Validation(message),
            status if status.is_server_error() => Self::Transient(message),
            _ => Self::Internal(message),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Internal(format!("malformed response body: {err}"))
        } else {
            Self::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let auth = SyncError::from_status(StatusCode::UNAUTHORIZED, "Forbidden".into());
        assert_eq!(auth, SyncError::Authorization("Forbidden".into()));

        let missing = SyncError::from_status(StatusCode::NOT_FOUND, "User not found".into());
        assert_eq!(missing, SyncError::NotFound("User not found".into()));

        let invalid = SyncError::from_status(StatusCode::NOT_ACCEPTABLE, "too short".into());
        assert_eq!(invalid, SyncError::Validation("too short".into()));

        let flaky = SyncError::from_status(StatusCode::BAD_GATEWAY, "oops".into());
        assert!(flaky.is_retryable());

        let odd = SyncError::from_status(StatusCode::IM_A_TEAPOT, "teapot".into());
        assert_eq!(odd, SyncError::Internal("teapot".into()));
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(SyncError::Transient("net".into()).is_retryable());
        assert!(!SyncError::Authorization("no".into()).is_retryable());
        assert!(!SyncError::NotFound("gone".into()).is_retryable());
        assert!(!SyncError::Validation("bad".into()).is_retryable());
        assert!(!SyncError::Internal("boom".into()).is_retryable());
    }
}
