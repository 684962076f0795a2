//! Error types for the admin API
//!
//! The cache, XP queue and scheduler never return errors to callers; these
//! only describe bad or unanswerable HTTP requests.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == API Error Enum ==
/// Error returned by admin API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Key not cached, or cached entry expired
    #[error("Key not found: {0}")]
    NotFound(String),

    /// No task registered under the id
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) | ApiError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for API handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
