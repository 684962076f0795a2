//! Write Aggregator Module
//!
//! Turns a stream of small XP awards into one sink write per distinct reason
//! per flush. Every enqueued amount is applied once its group is persisted;
//! a failed group goes back onto the queue item by item.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::guard::{lock, RunFlag, RunGuard};
use crate::queue::{
    batch_label, AggregatorStats, BatchSink, QueueItem, FLUSH_INTERVAL, MAX_BATCH_SIZE,
};

// == Flush Report ==
/// What a single `flush` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// True when the call found a flush already running or nothing queued
    pub skipped: bool,
    /// Items claimed from the queue by this flush
    pub items: usize,
    /// Groups the sink accepted
    pub groups_applied: usize,
    /// Groups the sink rejected
    pub groups_failed: usize,
    /// Items pushed back onto the queue after a rejection
    pub items_requeued: usize,
}

impl FlushReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

// == Write Aggregator ==
/// Batches XP awards by reason and writes them through a [`BatchSink`].
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct WriteAggregator {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Mutex<VecDeque<QueueItem>>,
    processing: RunFlag,
    idle: Notify,
    sink: Arc<dyn BatchSink>,
    max_batch_size: usize,
    flush_interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

struct ReasonGroup {
    reason: String,
    total: i64,
    items: Vec<QueueItem>,
}

/// Holds the processing flag for one flush and wakes waiters once it drops.
struct FlushPermit {
    running: Option<RunGuard>,
    inner: Arc<Inner>,
}

impl Drop for FlushPermit {
    fn drop(&mut self) {
        drop(self.running.take());
        self.inner.idle.notify_waiters();
    }
}

/// Groups claimed by a flush but not yet handed to the sink.
///
/// Whatever is left when it drops goes back onto the queue.
struct Undispatched<'a> {
    queue: &'a Mutex<VecDeque<QueueItem>>,
    groups: VecDeque<ReasonGroup>,
}

impl Drop for Undispatched<'_> {
    fn drop(&mut self) {
        if self.groups.is_empty() {
            return;
        }

        let items: Vec<QueueItem> = self.groups.drain(..).flat_map(|g| g.items).collect();
        warn!("XP flush interrupted, re-queueing {} items", items.len());
        lock(self.queue).extend(items);
    }
}

impl WriteAggregator {
    // == Constructor ==
    /// Creates an aggregator. The auto-flush timer is not started.
    ///
    /// # Arguments
    /// * `sink` - Destination of merged batches
    /// * `max_batch_size` - Queue length that triggers an immediate flush
    /// * `flush_interval` - Period of the auto-flush timer
    pub fn new(sink: Arc<dyn BatchSink>, max_batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                processing: RunFlag::new(),
                idle: Notify::new(),
                sink,
                max_batch_size: max_batch_size.max(1),
                flush_interval: flush_interval.max(Duration::from_millis(1)),
                timer: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Creates an aggregator with [`MAX_BATCH_SIZE`] and [`FLUSH_INTERVAL`].
    pub fn with_defaults(sink: Arc<dyn BatchSink>) -> Self {
        Self::new(sink, MAX_BATCH_SIZE, FLUSH_INTERVAL)
    }

    // == Enqueue ==
    /// Queues an award and returns its id.
    ///
    /// Reaching the batch size spawns a flush in the background; this call
    /// never waits for it.
    pub fn enqueue(&self, amount: i64, reason: impl Into<String>) -> String {
        let reason = reason.into();
        let seq = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("xp-{}-{}", Utc::now().timestamp_millis(), seq);

        let queue_length = {
            let mut queue = lock(&self.inner.queue);
            queue.push_back(QueueItem::new(id.clone(), amount, reason.clone()));
            queue.len()
        };
        debug!("Queued {} XP for {} ({} pending)", amount, reason, queue_length);

        if queue_length >= self.inner.max_batch_size {
            self.spawn_flush();
        }

        id
    }

    fn spawn_flush(&self) {
        match Handle::try_current() {
            Ok(handle) => {
                let aggregator = self.clone();
                handle.spawn(async move {
                    aggregator.flush().await;
                });
            }
            Err(_) => warn!("XP batch is full but no tokio runtime is available to flush it"),
        }
    }

    // == Flush ==
    /// Drains the queue and persists one merged write per reason.
    ///
    /// Does nothing if another flush is running or the queue is empty. Items
    /// queued while this flush awaits the sink are left for a later flush.
    ///
    /// The work runs on its own task: dropping the returned future, or
    /// aborting the task awaiting it, never strands drained items.
    pub async fn flush(&self) -> FlushReport {
        let Some(running) = self.inner.processing.try_acquire() else {
            debug!("XP flush already in progress, skipping");
            return FlushReport::skipped();
        };

        self.run_detached(running).await
    }

    /// Waits for a running flush to finish, then flushes what is left.
    ///
    /// Used on shutdown, where a skipped flush would leave items unwritten.
    pub async fn flush_when_idle(&self) -> FlushReport {
        loop {
            // Registered before the check so a release in between still wakes us
            let released = self.inner.idle.notified();
            if let Some(running) = self.inner.processing.try_acquire() {
                return self.run_detached(running).await;
            }
            debug!("Waiting for the running XP flush to finish");
            released.await;
        }
    }

    async fn run_detached(&self, running: RunGuard) -> FlushReport {
        let permit = FlushPermit {
            running: Some(running),
            inner: self.inner.clone(),
        };

        // Claimed here, before any await, so the batch is owned by the task
        let batch: Vec<QueueItem> = lock(&self.inner.queue).drain(..).collect();
        if batch.is_empty() {
            return FlushReport::skipped();
        }

        let aggregator = self.clone();
        let task = tokio::spawn(async move {
            let _permit = permit;
            aggregator.persist_batch(batch).await
        });

        match task.await {
            Ok(report) => report,
            Err(e) => {
                error!("XP flush task failed: {}", e);
                FlushReport::default()
            }
        }
    }

    async fn persist_batch(&self, batch: Vec<QueueItem>) -> FlushReport {
        let mut report = FlushReport {
            items: batch.len(),
            ..Default::default()
        };
        let mut pending = Undispatched {
            queue: &self.inner.queue,
            groups: group_by_reason(batch).into(),
        };

        while let Some(group) = pending.groups.pop_front() {
            let label = batch_label(&group.reason, group.items.len());

            match self.inner.sink.persist(group.total, &label).await {
                Ok(()) => {
                    debug!("Persisted {} XP for {}", group.total, label);
                    report.groups_applied += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to persist {} XP for {}, re-queueing {} items: {:#}",
                        group.total,
                        label,
                        group.items.len(),
                        e
                    );
                    report.groups_failed += 1;
                    report.items_requeued += group.items.len();
                    lock(&self.inner.queue).extend(group.items);
                }
            }
        }

        info!(
            "XP flush: {} items, {} groups applied, {} groups failed",
            report.items, report.groups_applied, report.groups_failed
        );
        report
    }

    // == Auto Flush ==
    /// Starts the periodic flush timer, replacing a running one.
    ///
    /// The first tick happens one interval from now. Ticks that find the
    /// queue empty do nothing.
    pub fn start_auto_flush(&self) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("Cannot start XP auto-flush outside a tokio runtime");
                return;
            }
        };

        let period = self.inner.flush_interval;
        let weak = Arc::downgrade(&self.inner);

        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                // Every handle is gone, nothing left to flush
                let Some(inner) = weak.upgrade() else { break };
                let aggregator = WriteAggregator { inner };
                if aggregator.queue_length() > 0 {
                    aggregator.flush().await;
                }
            }
        });

        if let Some(previous) = lock(&self.inner.timer).replace(task) {
            previous.abort();
        }
        info!("XP auto-flush started every {:?}", period);
    }

    /// Cancels the auto-flush timer. Queued items stay queued.
    pub fn stop_auto_flush(&self) {
        if let Some(task) = lock(&self.inner.timer).take() {
            task.abort();
            info!("XP auto-flush stopped");
        }
    }

    /// Returns true while the auto-flush timer is running.
    pub fn is_auto_flushing(&self) -> bool {
        lock(&self.inner.timer)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    // == Stats ==
    pub fn stats(&self) -> AggregatorStats {
        let queue = lock(&self.inner.queue);

        AggregatorStats {
            queue_length: queue.len(),
            is_processing: self.inner.processing.is_running(),
            // Re-queued items sit behind newer ones, so the front is not
            // necessarily the oldest
            oldest_item_age_ms: queue.iter().map(QueueItem::age_ms).max(),
        }
    }

    pub fn queue_length(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    /// Pending amount per reason, i.e. what is not yet persisted.
    pub fn pending_totals(&self) -> BTreeMap<String, i64> {
        let mut totals = BTreeMap::new();
        for item in lock(&self.inner.queue).iter() {
            let total: &mut i64 = totals.entry(item.reason.clone()).or_insert(0);
            *total = total.saturating_add(item.amount);
        }
        totals
    }
}

/// Groups items by reason, keeping reasons in first-seen order.
///
/// A reason whose running sum would overflow `i64` continues in a new group,
/// so every group total is exact.
fn group_by_reason(items: Vec<QueueItem>) -> Vec<ReasonGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ReasonGroup> = Vec::new();

    for item in items {
        if let Some(&i) = index.get(&item.reason) {
            if let Some(total) = groups[i].total.checked_add(item.amount) {
                groups[i].total = total;
                groups[i].items.push(item);
                continue;
            }
        }

        index.insert(item.reason.clone(), groups.len());
        groups.push(ReasonGroup {
            reason: item.reason.clone(),
            total: item.amount,
            items: vec![item],
        });
    }

    groups
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    /// Sink that records calls, fails chosen reasons and can be held open.
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(i64, String)>>,
        failing: Mutex<HashSet<String>>,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingSink {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn fail(&self, reason: &str) {
            lock(&self.failing).insert(reason.to_string());
        }

        fn recover(&self, reason: &str) {
            lock(&self.failing).remove(reason);
        }

        fn calls(&self) -> Vec<(i64, String)> {
            lock(&self.calls).clone()
        }
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn persist(&self, amount: i64, label: &str) -> anyhow::Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let failing = lock(&self.failing)
                .iter()
                .any(|reason| label.starts_with(&format!("{} (", reason)));
            if failing {
                anyhow::bail!("sink rejected {}", label);
            }
            lock(&self.calls).push((amount, label.to_string()));
            Ok(())
        }
    }

    fn aggregator(sink: &Arc<RecordingSink>) -> WriteAggregator {
        WriteAggregator::new(sink.clone(), MAX_BATCH_SIZE, FLUSH_INTERVAL)
    }

    #[tokio::test]
    async fn test_flush_merges_by_reason() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);

        xp.enqueue(5, "A");
        xp.enqueue(7, "A");
        xp.enqueue(3, "B");
        let report = xp.flush().await;

        assert_eq!(
            sink.calls(),
            vec![(12, "A (2 actions)".to_string()), (3, "B (1 actions)".to_string())]
        );
        assert_eq!(report.items, 3);
        assert_eq!(report.groups_applied, 2);
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_failed_group_is_requeued_item_by_item() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);
        sink.fail("A");

        xp.enqueue(5, "A");
        xp.enqueue(3, "B");
        xp.enqueue(7, "A");
        let report = xp.flush().await;

        assert_eq!(report.groups_failed, 1);
        assert_eq!(report.items_requeued, 2);
        assert_eq!(sink.calls(), vec![(3, "B (1 actions)".to_string())]);
        assert_eq!(xp.stats().queue_length, 2);
        assert_eq!(xp.pending_totals(), BTreeMap::from([("A".to_string(), 12)]));

        sink.recover("A");
        xp.flush().await;

        assert_eq!(xp.queue_length(), 0);
        assert!(sink.calls().contains(&(12, "A (2 actions)".to_string())));
    }

    #[tokio::test]
    async fn test_requeued_items_go_to_the_tail() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::gated(gate.clone()));
        let xp = aggregator(&sink);
        sink.fail("A");

        xp.enqueue(1, "A");
        let flushing = tokio::spawn({
            let xp = xp.clone();
            async move { xp.flush().await }
        });
        while !xp.stats().is_processing {
            tokio::task::yield_now().await;
        }
        xp.enqueue(2, "B");

        gate.notify_one();
        flushing.await.unwrap();

        let order: Vec<String> = lock(&xp.inner.queue)
            .iter()
            .map(|item| item.reason.clone())
            .collect();
        assert_eq!(order, vec!["B".to_string(), "A".to_string()]);
    }

    #[tokio::test]
    async fn test_flush_empty_queue_is_noop() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);

        let report = xp.flush().await;

        assert!(report.skipped);
        assert!(sink.calls().is_empty());
        assert!(!xp.stats().is_processing);
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_skipped_and_new_items_wait() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::gated(gate.clone()));
        let xp = aggregator(&sink);

        xp.enqueue(10, "login");
        let first = tokio::spawn({
            let xp = xp.clone();
            async move { xp.flush().await }
        });
        while !xp.stats().is_processing {
            tokio::task::yield_now().await;
        }

        // Claimed by the running flush, so no longer queued
        assert_eq!(xp.queue_length(), 0);

        xp.enqueue(20, "login");
        assert!(xp.flush().await.skipped);

        gate.notify_one();
        let report = first.await.unwrap();

        assert_eq!(report.items, 1);
        assert_eq!(sink.calls(), vec![(10, "login (1 actions)".to_string())]);
        assert_eq!(xp.queue_length(), 1);
        assert!(!xp.stats().is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaching_batch_size_flushes_without_timer() {
        let sink = Arc::new(RecordingSink::default());
        let xp = WriteAggregator::new(sink.clone(), 3, Duration::from_secs(30));

        xp.enqueue(1, "vote");
        xp.enqueue(1, "vote");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sink.calls().is_empty());

        xp.enqueue(1, "vote");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.calls(), vec![(3, "vote (3 actions)".to_string())]);
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_flush_runs_on_interval() {
        let sink = Arc::new(RecordingSink::default());
        let xp = WriteAggregator::new(sink.clone(), 100, Duration::from_secs(30));
        xp.start_auto_flush();
        assert!(xp.is_auto_flushing());

        xp.enqueue(15, "dare");
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(sink.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.calls(), vec![(15, "dare (1 actions)".to_string())]);

        xp.stop_auto_flush();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_auto_flush_cancels_timer() {
        let sink = Arc::new(RecordingSink::default());
        let xp = WriteAggregator::new(sink.clone(), 100, Duration::from_secs(30));
        xp.start_auto_flush();
        xp.stop_auto_flush();
        assert!(!xp.is_auto_flushing());

        xp.enqueue(15, "dare");
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert!(sink.calls().is_empty());
        assert_eq!(xp.queue_length(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_auto_flush_mid_persist_keeps_claimed_items() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::gated(gate.clone()));
        let xp = WriteAggregator::new(sink.clone(), 100, Duration::from_secs(30));
        xp.start_auto_flush();

        xp.enqueue(10, "login");
        xp.enqueue(5, "vote");
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(xp.stats().is_processing);
        assert_eq!(xp.queue_length(), 0);

        xp.stop_auto_flush();
        for _ in 0..10 {
            if sink.calls().len() == 2 {
                break;
            }
            gate.notify_one();
            tokio::task::yield_now().await;
        }

        let applied: i64 = sink.calls().iter().map(|(amount, _)| amount).sum();
        assert_eq!(applied, 15);
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_dropped_flush_caller_does_not_lose_batch() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::gated(gate.clone()));
        let xp = aggregator(&sink);

        xp.enqueue(10, "login");
        xp.enqueue(5, "vote");
        let caller = tokio::spawn({
            let xp = xp.clone();
            async move { xp.flush().await }
        });
        while !xp.stats().is_processing {
            tokio::task::yield_now().await;
        }
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        for _ in 0..10 {
            if sink.calls().len() == 2 {
                break;
            }
            gate.notify_one();
            tokio::task::yield_now().await;
        }

        assert_eq!(
            sink.calls(),
            vec![(10, "login (1 actions)".to_string()), (5, "vote (1 actions)".to_string())]
        );
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_flush_when_idle_waits_for_running_flush() {
        let gate = Arc::new(Notify::new());
        let sink = Arc::new(RecordingSink::gated(gate.clone()));
        let xp = aggregator(&sink);

        xp.enqueue(10, "login");
        let first = tokio::spawn({
            let xp = xp.clone();
            async move { xp.flush().await }
        });
        while !xp.stats().is_processing {
            tokio::task::yield_now().await;
        }

        xp.enqueue(5, "vote");
        let last = tokio::spawn({
            let xp = xp.clone();
            async move { xp.flush_when_idle().await }
        });
        tokio::task::yield_now().await;
        assert!(!last.is_finished());

        gate.notify_one();
        assert_eq!(first.await.unwrap().groups_applied, 1);
        gate.notify_one();
        let report = last.await.unwrap();

        assert!(!report.skipped);
        assert_eq!(report.groups_applied, 1);
        assert_eq!(
            sink.calls(),
            vec![(10, "login (1 actions)".to_string()), (5, "vote (1 actions)".to_string())]
        );
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_reason_is_split_across_writes() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);

        xp.enqueue(i64::MAX, "login");
        xp.enqueue(1, "login");
        assert_eq!(xp.pending_totals()["login"], i64::MAX);

        let report = xp.flush().await;

        assert_eq!(report.groups_applied, 2);
        assert_eq!(report.groups_failed, 0);
        assert_eq!(
            sink.calls(),
            vec![
                (i64::MAX, "login (1 actions)".to_string()),
                (1, "login (1 actions)".to_string()),
            ]
        );
        assert_eq!(xp.queue_length(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_report_oldest_item_age() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);
        assert_eq!(xp.stats(), AggregatorStats::default());

        xp.enqueue(1, "a");
        tokio::time::advance(Duration::from_millis(400)).await;
        xp.enqueue(1, "b");

        let stats = xp.stats();
        assert_eq!(stats.queue_length, 2);
        assert_eq!(stats.oldest_item_age_ms, Some(400));
        assert!(!stats.is_processing);
    }

    #[test]
    fn test_enqueue_returns_distinct_ids() {
        let sink = Arc::new(RecordingSink::default());
        let xp = aggregator(&sink);

        let a = xp.enqueue(1, "login");
        let b = xp.enqueue(1, "login");

        assert_ne!(a, b);
        assert!(a.starts_with("xp-"));
    }

    #[test]
    fn test_group_by_reason_keeps_first_seen_order() {
        let items = ["b", "a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, r)| QueueItem::new(i.to_string(), 1, r.to_string()))
            .collect();

        let groups = group_by_reason(items);
        let shape: Vec<(&str, usize)> = groups
            .iter()
            .map(|g| (g.reason.as_str(), g.items.len()))
            .collect();

        assert_eq!(shape, vec![("b", 2), ("a", 1), ("c", 1)]);
    }
}
