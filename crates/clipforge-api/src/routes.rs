//! API routes.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::health::health;
use crate::handlers::jobs::{cancel, get_status, list_clips, submit};
use crate::handlers::live::publish_signal_event;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;

    Router::new()
        .route("/jobs", post(submit))
        .route("/jobs/:job_id/status", get(get_status))
        .route("/jobs/:job_id/cancel", post(cancel))
        .route("/jobs/:job_id/clips", get(list_clips))
        .route("/live/:stream_id/events", post(publish_signal_event))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
