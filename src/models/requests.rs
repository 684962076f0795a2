//! Request DTOs for the admin API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

/// Maximum allowed cache key / XP reason length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for `PUT /cache`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: Value,
    /// Optional TTL in milliseconds
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_name("Key", &self.key)
    }
}

/// Request body for `POST /xp`
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueueRequest {
    /// Signed XP amount
    pub amount: i64,
    /// Grouping reason, e.g. "login"
    pub reason: String,
}

impl EnqueueRequest {
    pub fn validate(&self) -> Option<String> {
        validate_name("Reason", &self.reason)
    }
}

fn validate_name(what: &str, name: &str) -> Option<String> {
    if name.is_empty() {
        return Some(format!("{} cannot be empty", what));
    }
    if name.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "{} exceeds maximum length of {} bytes",
            what, MAX_KEY_LENGTH
        ));
    }
    None
}
