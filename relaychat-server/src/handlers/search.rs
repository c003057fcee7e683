use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Query, State},
};
use relaychat_shared::models::{ErrorBody, SearchResponse};
use serde::Deserialize;
use tracing::debug;

use crate::app_state::AppState;
use crate::http::error::{ApiError, AppResult};
use crate::middleware::auth::AuthUser;

const DEFAULT_SKIP: usize = 0;
const DEFAULT_TAKE: usize = 10;

/// Queries shorter than this are rejected with 406 before touching the
/// store.
const MIN_QUERY_CHARS: usize = 4;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

/// Substring search over registered users.
#[utoipa::path(
    get,
    path = "/api/search-user",
    params(
        ("query" = Option<String>, Query, description = "Substring matched against username, email, and name"),
        ("skip" = Option<usize>, Query, description = "Results to skip, default 0"),
        ("take" = Option<usize>, Query, description = "Page size, default 10")
    ),
    responses(
        (status = 200, description = "Matching users", body = SearchResponse),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 406, description = "Query absent or too short", body = ErrorBody)
    ),
    tag = "Users"
)]
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<SearchResponse>> {
    let query = params.query.as_deref().unwrap_or("");
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::not_acceptable(
            "Query parameter too short or missing.",
        ));
    }

    let skip = params.skip.unwrap_or(DEFAULT_SKIP);
    let take = params.take.unwrap_or(DEFAULT_TAKE);
    debug!(%user_id, query, skip, take, "user search requested");

    let query_result = state.store.search_users(query, skip, take);
    Ok(Json(SearchResponse { query_result }))
}
