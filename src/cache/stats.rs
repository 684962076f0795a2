//! Cache Statistics Module
//!
//! Snapshot of cache contents and lookup counters, for tests and observability.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time view of the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of stored entries, including expired ones not yet accessed
    pub size: usize,
    /// Stored keys in sorted order
    pub keys: Vec<String>,
    /// Lookups (`get`/`has`) that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
