//! API Handlers
//!
//! HTTP request handlers for the admin endpoints.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::context::AppContext;
use crate::error::{ApiError, Result};
use crate::models::{
    AckResponse, EnqueueRequest, EnqueueResponse, GetResponse, HealthResponse, RunResponse,
    SetRequest, StatsResponse,
};
use crate::queue::FlushReport;

/// Handler for PUT /cache
///
/// Stores a JSON value with optional TTL.
pub async fn set_handler(
    State(ctx): State<AppContext>,
    Json(req): Json<SetRequest>,
) -> Result<Json<AckResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl_ms.map(Duration::from_millis);
    ctx.cache.write().await.set(req.key.clone(), req.value, ttl);

    Ok(Json(AckResponse::new(format!("Key '{}' cached", req.key))))
}

/// Handler for GET /cache/:key
///
/// Expired entries are evicted and reported as not found.
pub async fn get_handler(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    // Write lock: a lookup may evict
    let value = ctx.cache.write().await.get(&key);

    match value {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(ApiError::NotFound(key)),
    }
}

/// Handler for DELETE /cache/:key
///
/// Succeeds whether or not the key was cached.
pub async fn invalidate_handler(
    State(ctx): State<AppContext>,
    Path(key): Path<String>,
) -> Json<AckResponse> {
    ctx.cache.write().await.invalidate(&key);
    Json(AckResponse::new(format!("Key '{}' invalidated", key)))
}

/// Handler for DELETE /cache
pub async fn invalidate_all_handler(State(ctx): State<AppContext>) -> Json<AckResponse> {
    ctx.cache.write().await.invalidate_all();
    Json(AckResponse::new("Cache cleared"))
}

/// Handler for POST /xp
pub async fn enqueue_handler(
    State(ctx): State<AppContext>,
    Json(req): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ApiError::InvalidRequest(error_msg));
    }

    let id = ctx.xp.enqueue(req.amount, req.reason);
    Ok(Json(EnqueueResponse {
        id,
        queue_length: ctx.xp.queue_length(),
    }))
}

/// Handler for POST /xp/flush
pub async fn flush_handler(State(ctx): State<AppContext>) -> Json<FlushReport> {
    Json(ctx.xp.flush().await)
}

/// Handler for POST /tasks/:id/run
///
/// Unknown ids are a 404; a run that was skipped or failed is still a 200.
pub async fn run_task_handler(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>> {
    if !ctx.scheduler.is_registered(&id) {
        return Err(ApiError::TaskNotFound(id));
    }

    let outcome = ctx.scheduler.force_run_now(&id).await;
    Ok(Json(RunResponse { id, outcome }))
}

/// Handler for POST /tasks/run
pub async fn run_all_handler(State(ctx): State<AppContext>) -> Json<Vec<RunResponse>> {
    let outcomes = ctx.scheduler.run_all().await;

    Json(
        outcomes
            .into_iter()
            .map(|(id, outcome)| RunResponse { id, outcome })
            .collect(),
    )
}

/// Handler for GET /stats
pub async fn stats_handler(State(ctx): State<AppContext>) -> Json<StatsResponse> {
    let cache = ctx.cache.read().await.stats();

    Json(StatsResponse {
        cache,
        xp: ctx.xp.stats(),
        scheduler: ctx.scheduler.stats(),
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
