//! XP Queue Module
//!
//! Coalesces small experience-point awards into batched writes. Awards are
//! grouped by reason and handed to a [`BatchSink`] either periodically or
//! as soon as the queue reaches its batch size.

mod aggregator;
mod item;
mod sink;
mod stats;


use std::time::Duration;

pub use aggregator::{FlushReport, WriteAggregator};
pub use item::QueueItem;
pub use sink::{BatchSink, LedgerSink};
pub use stats::AggregatorStats;

// == Public Constants ==
/// Queue length that triggers an immediate flush
pub const MAX_BATCH_SIZE: usize = 10;

/// Period of the auto-flush timer
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Label passed to the sink for a merged group, e.g. `"login (2 actions)"`.
pub fn batch_label(reason: &str, count: usize) -> String {
    format!("{} ({} actions)", reason, count)
}
