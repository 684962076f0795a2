//! Application Context
//!
//! One handle per process bundling the cache, the XP queue and the task
//! scheduler. It is built once at startup and cloned into every caller.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::cache::{shared, ExpiringCache, SharedCache};
use crate::config::Config;
use crate::queue::{BatchSink, FlushReport, LedgerSink, WriteAggregator};
use crate::tasks::TaskScheduler;

/// Cache key holding the last XP total snapshot
pub const XP_TOTAL_KEY: &str = "xp:total";

/// Id of the XP snapshot task
pub const XP_SNAPSHOT_TASK: &str = "xp-snapshot";

/// Shared handles to the three freshness components.
#[derive(Clone)]
pub struct AppContext {
    /// Read cache for remote data
    pub cache: SharedCache<Value>,
    /// XP write queue
    pub xp: WriteAggregator,
    /// Background refresh jobs
    pub scheduler: TaskScheduler,
}

impl AppContext {
    /// Builds the context and starts the XP auto-flush timer.
    pub fn new(config: &Config, sink: Arc<dyn BatchSink>) -> Self {
        let xp = WriteAggregator::new(sink, config.max_batch_size, config.flush_interval);
        xp.start_auto_flush();

        Self {
            cache: shared(ExpiringCache::new(config.default_ttl)),
            xp,
            scheduler: TaskScheduler::new(),
        }
    }

    /// Registers the task that copies the ledger total into the cache.
    pub fn register_xp_snapshot(&self, config: &Config, ledger: Arc<LedgerSink>) -> String {
        let cache = self.cache.clone();
        let ttl = config.snapshot_interval * 2;

        self.scheduler.register(
            XP_SNAPSHOT_TASK,
            "XP total snapshot",
            move || {
                let cache = cache.clone();
                let ledger = ledger.clone();
                async move {
                    let total = ledger.total();
                    cache.write().await.set(XP_TOTAL_KEY, Value::from(total), Some(ttl));
                    anyhow::Ok(())
                }
            },
            config.snapshot_interval,
        )
    }

    /// Stops every timer and makes a last attempt to write queued XP.
    ///
    /// A flush already in flight is awaited first, then whatever was queued
    /// meanwhile is flushed.
    ///
    /// Items the sink still rejects are lost with the process.
    pub async fn shutdown(&self) -> FlushReport {
        self.scheduler.unregister_all();
        self.xp.stop_auto_flush();

        let report = self.xp.flush_when_idle().await;
        let pending = self.xp.queue_length();
        info!("Freshness layer shut down, {} XP items left unwritten", pending);
        report
    }
}
