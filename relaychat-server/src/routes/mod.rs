pub mod health;
pub mod openapi;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};

use crate::app_state::AppState;
use crate::handlers;
use crate::middleware::auth::require_session;

/// Session-guarded API routes, mounted under `/api`.
pub fn create_api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/messages/{conversation_id}",
            get(handlers::messages::get_messages),
        )
        .route("/search-user", get(handlers::search::search_users))
        .route_layer(middleware::from_fn_with_state(state, require_session))
}
