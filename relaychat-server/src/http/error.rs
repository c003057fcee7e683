use axum::{Json, http::StatusCode, response::IntoResponse};
use relaychat_shared::models::ErrorBody;
use thiserror::Error;

pub type AppResult<T> = Result<T, ApiError>;

/// API boundary error. Serializes as `{ "message": ..., "status": ... }`,
/// the body shape every client of this API parses.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 401 with the fixed `Forbidden` body sent for any missing or
    /// unresolvable session.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Forbidden")
    }

    /// 404 for a session whose user no longer exists in the identity store.
    pub fn user_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "User not found")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody::new(self.message, self.status.as_u16());
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        // The underlying cause goes to the log, never into the body.
        tracing::error!(error = %value, "request failed");
        Self::internal_server_error("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unauthorized_body_is_exact() {
        let (status, body) = body_json(ApiError::unauthorized()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "message": "Forbidden", "status": 401 }));
    }

    #[tokio::test]
    async fn user_not_found_body_is_exact() {
        let (status, body) = body_json(ApiError::user_not_found()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body,
            serde_json::json!({ "message": "User not found", "status": 404 })
        );
    }

    #[tokio::test]
    async fn not_acceptable_carries_status_in_body() {
        let (status, body) =
            body_json(ApiError::not_acceptable("Query parameter too short or missing.")).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["status"], 406);
    }

    #[tokio::test]
    async fn internal_error_body_never_leaks_the_cause() {
        let error = ApiError::from(anyhow::anyhow!("db connection string was invalid"));
        let (status, body) = body_json(error).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            serde_json::json!({ "message": "Internal server error", "status": 500 })
        );
    }
}
