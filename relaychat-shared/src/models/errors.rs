use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// REST error body: `{ "message": ..., "status": ... }`.
///
/// The status code is repeated in the body because existing API consumers
/// read it from there rather than from the response line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code of the response.
    pub status: u16,
}

impl ErrorBody {
    /// Creates an error body.
    #[must_use]
    pub fn new(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for ErrorBody {}
