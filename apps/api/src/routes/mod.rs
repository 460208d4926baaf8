pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::courses::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/courses", post(handlers::handle_create_course))
        .route("/api/v1/courses/:id", get(handlers::handle_get_course))
        .route(
            "/api/v1/courses/:id/enrich",
            post(handlers::handle_start_enrichment),
        )
        .route(
            "/api/v1/lessons/:id/progress",
            put(handlers::handle_record_progress),
        )
        .with_state(state)
}
