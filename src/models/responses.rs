//! Response DTOs for the admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::queue::AggregatorStats;
use crate::tasks::{RunOutcome, SchedulerStats};

/// Response body for `GET /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The cached value
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Acknowledgement for mutating cache requests
#[derive(Debug, Clone, Serialize)]
pub struct AckResponse {
    /// Human-readable result
    pub message: String,
}

impl AckResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for `POST /xp`
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    /// Id of the queued award
    pub id: String,
    /// Queue length right after the award was added
    pub queue_length: usize,
}

/// Response body for `POST /tasks/:id/run`
#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub id: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

/// Response body for `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub xp: AggregatorStats,
    pub scheduler: SchedulerStats,
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
