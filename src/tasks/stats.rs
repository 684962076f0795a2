//! Scheduler Statistics Module

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata for one registered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub interval_ms: u64,
    /// Completion time of the last successful run
    pub last_run: Option<DateTime<Utc>>,
    /// Whether the repeat timer is still scheduled
    pub timer_active: bool,
    /// Whether a run is in flight right now
    pub is_running: bool,
    pub run_count: u64,
    pub failure_count: u64,
}

/// Snapshot of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Registered tasks
    pub total_tasks: usize,
    /// Tasks whose timer is running
    pub active_tasks: usize,
    /// Tasks with a run in flight
    pub in_flight: usize,
    /// Per-task metadata, sorted by id
    pub tasks: Vec<TaskInfo>,
}
