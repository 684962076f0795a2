//! Scheduled task descriptor and run outcomes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;

/// Future returned by a job invocation.
pub type JobFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A repeatable, idempotent background job.
pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Result of asking the scheduler to run a task once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The job ran and returned `Ok`
    Completed,
    /// The job ran and returned an error (already logged)
    Failed(String),
    /// A run of the same task was already in flight; nothing was started
    Skipped,
    /// No task is registered under that id
    Unknown,
}

pub(crate) struct ScheduledTask {
    pub id: String,
    /// Distinguishes this registration from earlier ones under the same id
    pub generation: u64,
    pub name: String,
    pub job: Job,
    pub interval: Duration,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub failure_count: u64,
    pub timer: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub fn timer_active(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    pub fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
