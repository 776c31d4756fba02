//! Router assembly

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::{http, websocket};
use crate::config::ServerConfig;
use crate::relay::Relay;

/// Shared state available to all route handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub http_client: reqwest::Client,
    pub shutdown_tx: broadcast::Sender<()>,
    pub outbound_capacity: usize,
}

/// Build the complete axum router
///
/// WebSocket upgrades are accepted on every path. Unmatched HTTP requests
/// fall through to the static file directory.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/proxy-image", get(http::proxy_image))
        .route("/upload-screenshot", post(http::upload_screenshot))
        .fallback_service(ServeDir::new(&config.public_dir))
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            websocket::upgrade_any_path,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
