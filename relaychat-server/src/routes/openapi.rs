use std::sync::Arc;

use axum::{Json, Router, response::IntoResponse, routing::get};
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::openapi::ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

pub fn openapi_routes() -> Router<Arc<AppState>> {
    Router::new().route("/openapi/relaychat.json", get(openapi_json))
}
