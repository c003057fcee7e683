use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{self, header},
    middleware::Next,
    response::Response,
};
use cookie::Cookie;
use tracing::debug;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::http::error::ApiError;

/// Name of the session cookie issued at login.
pub const SESSION_COOKIE: &str = "session";

/// The resolved user behind the request's session, inserted as a request
/// extension for handlers.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

/// Middleware guarding session-scoped routes.
///
/// A missing or unknown session cookie yields the fixed 401 `Forbidden`
/// body; a session whose user has since vanished from the identity store
/// yields 404 `User not found`.
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let session_id = extract_session_cookie(req.headers(), SESSION_COOKIE)
        .ok_or_else(ApiError::unauthorized)?;

    let user_id = state
        .store
        .resolve_session(&session_id)
        .ok_or_else(ApiError::unauthorized)?;

    if state.store.user(user_id).is_none() {
        debug!(%user_id, "session resolves to a deleted user");
        return Err(ApiError::user_not_found());
    }

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}

pub(crate) fn extract_session_cookie(headers: &http::HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(value)
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
