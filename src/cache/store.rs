//! Cache Store Module
//!
//! Key/value storage with per-entry TTL. Expiry is only evaluated when a key
//! is accessed; there is no background sweep.

use std::collections::HashMap;
use std::time::Duration;

use tracing::trace;

use crate::cache::{CacheEntry, CacheStats, DEFAULT_TTL};

// == Expiring Cache ==
/// Key/value cache whose entries expire after a time-to-live.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// TTL used when `set` is called without one
    default_ttl: Duration,
    hits: u64,
    misses: u64,
}

impl<V> ExpiringCache<V> {
    // == Constructor ==
    /// Creates an empty cache.
    ///
    /// # Arguments
    /// * `default_ttl` - TTL applied to entries stored without an explicit TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            hits: 0,
            misses: 0,
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing entry and resetting its TTL.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (uses the default TTL if None)
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    // == Has ==
    /// Returns true if a live entry exists for `key`.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn has(&mut self, key: &str) -> bool {
        self.live_entry(key).is_some()
    }

    // == Invalidate ==
    /// Removes the entry for `key`. Unknown keys are ignored.
    pub fn invalidate(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            trace!("Cache invalidated key {}", key);
        }
    }

    // == Invalidate All ==
    /// Removes every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    // == Stats ==
    /// Returns a snapshot of the cache. Does not evict anything.
    pub fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();

        CacheStats {
            size: self.entries.len(),
            keys,
            hits: self.hits,
            misses: self.misses,
        }
    }

    // == Length ==
    /// Returns the number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key`, evicting it first if it has expired.
    fn live_entry(&mut self, key: &str) -> Option<&CacheEntry<V>> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.misses += 1;
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            trace!("Cache entry {} expired", key);
            return None;
        }

        self.hits += 1;
        self.entries.get(key)
    }
}

impl<V: Clone> ExpiringCache<V> {
    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns `None` for unknown keys and for expired entries, which are
    /// removed as a side effect.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.live_entry(key).map(|entry| entry.value.clone())
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
