//! Read-through access on a shared cache.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::cache::SharedCache;

/// Returns the cached value for `key`, or loads it with `fetch` and caches it.
///
/// The lock is released while `fetch` runs, so two callers missing at the same
/// time may both fetch; the later write wins. A failed fetch caches nothing.
pub async fn get_or_fetch<V, F, Fut>(
    cache: &SharedCache<V>,
    key: &str,
    ttl: Option<Duration>,
    fetch: F,
) -> anyhow::Result<V>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<V>>,
{
    if let Some(value) = cache.write().await.get(key) {
        return Ok(value);
    }

    debug!("Cache miss for {}, fetching from source", key);
    let value = fetch().await?;
    cache.write().await.set(key, value.clone(), ttl);

    Ok(value)
}
