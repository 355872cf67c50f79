//! Axum router setup

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{
    handlers::{get_graph, health_check, render_lens},
    sse::subscribe_topic,
    ServerState,
};

/// Create the router with all routes.
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/module/graph/lens", post(render_lens))
        .route("/api/module/graph", get(get_graph))
        .route("/api/subscribe/:topic", get(subscribe_topic))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
