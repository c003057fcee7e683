use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use relaychat_shared::models::{ErrorBody, MessagesResponse};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::http::error::AppResult;
use crate::middleware::auth::AuthUser;

/// Page size applied when the query omits `take`.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

/// One newest-to-oldest page of a conversation's message history.
#[utoipa::path(
    get,
    path = "/api/messages/{conversation_id}",
    params(
        ("conversation_id" = Uuid, Path, description = "Conversation to read"),
        ("skip" = Option<u64>, Query, description = "Messages to skip from the newest end"),
        ("take" = Option<u64>, Query, description = "Page size, default 10")
    ),
    responses(
        (status = 200, description = "Message page retrieved", body = MessagesResponse),
        (status = 401, description = "No valid session", body = ErrorBody),
        (status = 404, description = "Session user no longer exists", body = ErrorBody)
    ),
    tag = "Messages"
)]
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(conversation_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> AppResult<Json<MessagesResponse>> {
    let skip = page.skip.unwrap_or(0);
    let take = page.take.unwrap_or(DEFAULT_PAGE_SIZE);
    debug!(%user_id, %conversation_id, skip, take, "history page requested");

    let messages = state.store.history_page(conversation_id, skip, take);
    Ok(Json(MessagesResponse { messages }))
}
