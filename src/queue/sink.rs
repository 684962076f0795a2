//! Batch Sink Module
//!
//! The destination of flushed XP batches.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::guard::lock;

/// Destination of merged XP batches.
///
/// Called once per distinct reason per flush. An `Err` makes the aggregator
/// re-queue that group's items for the next flush.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Applies `amount` to the underlying store.
    async fn persist(&self, amount: i64, label: &str) -> anyhow::Result<()>;
}

/// In-memory sink that keeps a running total.
///
/// Stands in for the remote experience store in the binary and in tests.
#[derive(Debug, Default)]
pub struct LedgerSink {
    state: Mutex<Ledger>,
}

#[derive(Debug, Default)]
struct Ledger {
    total: i64,
    writes: u64,
    by_label: HashMap<String, i64>,
}

impl LedgerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every amount persisted so far.
    pub fn total(&self) -> i64 {
        lock(&self.state).total
    }

    /// Number of `persist` calls that succeeded.
    pub fn writes(&self) -> u64 {
        lock(&self.state).writes
    }

    /// Amount persisted under an exact label.
    pub fn amount_for(&self, label: &str) -> i64 {
        lock(&self.state).by_label.get(label).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BatchSink for LedgerSink {
    async fn persist(&self, amount: i64, label: &str) -> anyhow::Result<()> {
        let total = {
            let mut ledger = lock(&self.state);
            ledger.total = ledger.total.saturating_add(amount);
            ledger.writes += 1;
            let by_label = ledger.by_label.entry(label.to_string()).or_insert(0);
            *by_label = by_label.saturating_add(amount);
            ledger.total
        };

        info!("Ledger applied {} XP for {} (total {})", amount, label, total);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_accumulates() {
        let ledger = LedgerSink::new();

        ledger.persist(30, "login (2 actions)").await.unwrap();
        ledger.persist(5, "vote (1 actions)").await.unwrap();
        ledger.persist(-5, "vote (1 actions)").await.unwrap();

        assert_eq!(ledger.total(), 30);
        assert_eq!(ledger.writes(), 3);
        assert_eq!(ledger.amount_for("login (2 actions)"), 30);
        assert_eq!(ledger.amount_for("vote (1 actions)"), 0);
        assert_eq!(ledger.amount_for("unknown"), 0);
    }
}
