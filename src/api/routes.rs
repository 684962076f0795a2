//! API Routes
//!
//! Configures the Axum router with all admin endpoints.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    enqueue_handler, flush_handler, get_handler, health_handler, invalidate_all_handler,
    invalidate_handler, run_all_handler, run_task_handler, set_handler, stats_handler,
};
use crate::context::AppContext;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /cache` - Cache a JSON value
/// - `GET /cache/:key` - Read a cached value
/// - `DELETE /cache/:key` - Invalidate one key
/// - `DELETE /cache` - Invalidate everything
/// - `POST /xp` - Queue an XP award
/// - `POST /xp/flush` - Flush the XP queue now
/// - `POST /tasks/run` - Force every task
/// - `POST /tasks/:id/run` - Force one task
/// - `GET /stats` - Cache, queue and scheduler statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/cache", put(set_handler).delete(invalidate_all_handler))
        .route("/cache/:key", get(get_handler).delete(invalidate_handler))
        .route("/xp", post(enqueue_handler))
        .route("/xp/flush", post(flush_handler))
        .route("/tasks/run", post(run_all_handler))
        .route("/tasks/:id/run", post(run_task_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
