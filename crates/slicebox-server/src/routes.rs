use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/outgoing/poll", get(handlers::outgoing_poll))
        .route("/outgoing", get(handlers::outgoing_bytes))
        .route("/outgoing/done", post(handlers::outgoing_done))
        .route("/outgoing/failed", post(handlers::outgoing_failed))
        .route("/incoming", post(handlers::incoming))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
