//! Cache Module
//!
//! In-memory key/value cache with per-entry TTL and lazy expiration.

mod entry;
mod read_through;
mod stats;
mod store;


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

// Re-export public types
pub use entry::CacheEntry;
pub use read_through::get_or_fetch;
pub use stats::CacheStats;
pub use store::ExpiringCache;

// == Public Constants ==
/// TTL applied when a caller does not pass one explicitly
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache handle shared between business logic and background jobs.
///
/// `get`/`has` evict expired entries, so readers take the write lock too.
pub type SharedCache<V> = Arc<RwLock<ExpiringCache<V>>>;

/// Wraps a cache into a [`SharedCache`].
pub fn shared<V>(cache: ExpiringCache<V>) -> SharedCache<V> {
    Arc::new(RwLock::new(cache))
}
