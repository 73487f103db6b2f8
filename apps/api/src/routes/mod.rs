pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::generation::handlers as generation;
use crate::jobs::handlers as jobs;
use crate::patterns::extraction::MAX_UPLOAD_BYTES;
use crate::patterns::handlers as patterns;
use crate::performance::handlers as performance;
use crate::publish::handlers as publish;
use crate::state::AppState;

/// Multipart framing on top of the largest accepted image.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation
        .route(
            "/api/v1/generations",
            post(generation::handle_create_generation),
        )
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/cancel", post(jobs::handle_cancel_job))
        // Publishing and performance feedback
        .route(
            "/api/v1/generations/:id/publish",
            post(publish::handle_publish),
        )
        .route(
            "/api/v1/webhooks/performance",
            post(performance::handle_performance_webhook),
        )
        // Learned patterns
        .route(
            "/api/v1/patterns/uploads",
            post(patterns::handle_upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/api/v1/patterns/uploads/:id/extract",
            post(patterns::handle_extract),
        )
        .route("/api/v1/patterns", get(patterns::handle_list_patterns))
        .route(
            "/api/v1/patterns/:id",
            patch(patterns::handle_edit_pattern).delete(patterns::handle_delete_pattern),
        )
        .route(
            "/api/v1/patterns/:id/rating",
            post(patterns::handle_rate_pattern),
        )
        .with_state(state)
}
