//! Freshness - client-side data freshness and write amortization
//!
//! An expiring read cache, a coalescing XP write queue and an interval task
//! scheduler, bundled in an [`AppContext`].

pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod models;
pub mod queue;
pub mod tasks;

pub use cache::{get_or_fetch, ExpiringCache, SharedCache};
pub use config::Config;
pub use context::AppContext;
pub use queue::{BatchSink, LedgerSink, WriteAggregator};
pub use tasks::{RunOutcome, TaskScheduler};
