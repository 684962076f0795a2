//! Queue Item Module

use tokio::time::Instant;

// == Queue Item ==
/// One pending XP award.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    /// Opaque identifier returned from `enqueue`
    pub id: String,
    /// Signed amount to add
    pub amount: i64,
    /// Grouping key; items merge on exact match
    pub reason: String,
    /// When the item entered the queue
    pub enqueued_at: Instant,
}

impl QueueItem {
    pub fn new(id: String, amount: i64, reason: String) -> Self {
        Self {
            id,
            amount,
            reason,
            enqueued_at: Instant::now(),
        }
    }

    /// Milliseconds since the item was enqueued.
    pub fn age_ms(&self) -> u64 {
        self.enqueued_at.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_age_tracks_clock() {
        let item = QueueItem::new("1".to_string(), 10, "login".to_string());
        assert_eq!(item.age_ms(), 0);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(item.age_ms(), 1500);
    }
}
