//! Aggregator Statistics Module

use serde::Serialize;

/// Snapshot of the XP queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    /// Items waiting for a flush
    pub queue_length: usize,
    /// Whether a flush is currently in progress
    pub is_processing: bool,
    /// Age of the oldest waiting item, `None` when the queue is empty
    pub oldest_item_age_ms: Option<u64>,
}
