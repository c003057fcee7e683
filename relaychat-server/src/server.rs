use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get};
use relaychat_shared::config::Config;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::{app_state::AppState, handlers, routes};

/// Initializes the tracing subscriber for logging using the provided
/// configuration.
pub fn initialize_tracing(config: &Config) {
    fmt::fmt()
        .with_env_filter(build_env_filter(config))
        .with_target(false)
        .with_level(true)
        .init();
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates the CORS layer for the application.
///
/// With a configured origin, credentialed requests from that origin are
/// allowed; without one, any origin is allowed but credentials are not
/// (the two cannot be combined).
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![Method::GET, Method::POST, Method::OPTIONS];
    let cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any());

    match config
        .cors_origin
        .as_deref()
        .and_then(|origin| http::HeaderValue::from_str(origin).ok())
    {
        Some(origin) => cors
            .allow_origin(AllowOrigin::exact(origin))
            .allow_credentials(true),
        None => cors.allow_origin(AllowOrigin::any()),
    }
}

/// Creates the application state shared across handlers and websocket
/// connections.
#[must_use]
pub fn create_app_state() -> Arc<AppState> {
    Arc::new(AppState::default())
}

/// Creates the main application router with all middleware and routes.
pub fn create_app_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .nest("/api", routes::create_api_router(Arc::clone(&state)))
        .route("/ws", get(handlers::socket::ws_handler))
        .merge(routes::health::create_health_router())
        .merge(routes::openapi::openapi_routes())
        .layer(create_cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolves when a shutdown signal is received.
pub async fn create_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutting down...");
}

/// Starts the server and binds it to the configured port.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails while
/// serving.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    initialize_tracing(&config);

    let state = create_app_state();
    let router = create_app_router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(create_shutdown_signal())
        .await?;

    Ok(())
}
