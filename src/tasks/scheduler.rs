//! Task Scheduler
//!
//! Keeps a registry of named jobs, each repeated by its own tokio timer.
//! Timer ticks and forced runs go through the same runner, which drops the
//! trigger if the task is already running.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::guard::{lock, InFlightSet};
use crate::tasks::task::ScheduledTask;
use crate::tasks::{Job, RunOutcome, SchedulerStats, TaskInfo};

/// Shortest repeat interval a task can be registered with
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// == Task Scheduler ==
/// Runs registered jobs on fixed intervals and on demand.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
    in_flight: InFlightSet,
    next_generation: AtomicU64,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    // == Register ==
    /// Registers `job` under `id` and starts its repeat timer.
    ///
    /// The first timer run happens one `interval` from now. A task already
    /// registered under `id` is replaced and its timer cancelled; a run of
    /// the old job that is in flight is left to finish.
    ///
    /// # Arguments
    /// * `id` - Unique task key
    /// * `name` - Human-readable label for logs
    /// * `job` - Idempotent async job
    /// * `interval` - Time between timer runs
    pub fn register<F, Fut>(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        job: F,
        interval: Duration,
    ) -> String
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = id.into();
        let name = name.into();

        if interval < MIN_INTERVAL {
            warn!("Task {} registered with interval {:?}, using {:?}", id, interval, MIN_INTERVAL);
        }
        let interval = interval.max(MIN_INTERVAL);

        let job: Job = Arc::new(move || job().boxed());
        let task = ScheduledTask {
            id: id.clone(),
            generation: self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
            name: name.clone(),
            job,
            interval,
            last_run: None,
            run_count: 0,
            failure_count: 0,
            timer: self.spawn_timer(&id, interval),
        };

        let previous = lock(&self.inner.tasks).insert(id.clone(), task);
        if let Some(mut previous) = previous {
            previous.cancel_timer();
            info!("Replaced task {} ({})", previous.name, id);
        }

        info!("Registered task {} ({}) every {:?}", name, id, interval);
        id
    }

    fn spawn_timer(&self, id: &str, interval: Duration) -> Option<JoinHandle<()>> {
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime, task {} will only run when forced", id);
            return None;
        };

        let weak = Arc::downgrade(&self.inner);
        let id = id.to_string();

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(inner) = weak.upgrade() else { break };
                let scheduler = TaskScheduler { inner };
                let id = id.clone();
                // Spawned so that cancelling the timer never cancels a run
                tokio::spawn(async move {
                    scheduler.run_task(&id).await;
                });
            }
        }))
    }

    // == Unregister ==
    /// Cancels the timer of `id` and forgets the task. Unknown ids are ignored.
    pub fn unregister(&self, id: &str) {
        let removed = lock(&self.inner.tasks).remove(id);
        if let Some(mut task) = removed {
            task.cancel_timer();
            info!("Unregistered task {} ({})", task.name, id);
        }
    }

    /// Cancels every timer and forgets every task.
    pub fn unregister_all(&self) {
        let removed: Vec<ScheduledTask> = lock(&self.inner.tasks)
            .drain()
            .map(|(_, task)| task)
            .collect();
        let count = removed.len();
        for mut task in removed {
            task.cancel_timer();
        }
        if count > 0 {
            info!("Unregistered all {} tasks", count);
        }
    }

    // == Run ==
    /// Runs `id` now, unless it is unknown or already running.
    ///
    /// Never waits for an in-flight run; the outcome says what happened.
    pub async fn force_run_now(&self, id: &str) -> RunOutcome {
        debug!("Forcing run of task {}", id);
        self.run_task(id).await
    }

    /// Forces every registered task concurrently and waits for all of them.
    ///
    /// Returns `(id, outcome)` pairs sorted by id. A failing task does not
    /// affect the others.
    pub async fn run_all(&self) -> Vec<(String, RunOutcome)> {
        let mut ids: Vec<String> = lock(&self.inner.tasks).keys().cloned().collect();
        ids.sort();

        let outcomes = join_all(ids.iter().map(|id| self.force_run_now(id))).await;

        let failed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, RunOutcome::Failed(_)))
            .count();
        if failed > 0 {
            warn!("Run of all tasks finished with {} of {} failed", failed, ids.len());
        } else {
            info!("Run of all {} tasks finished", ids.len());
        }

        ids.into_iter().zip(outcomes).collect()
    }

    /// The single path every run goes through, timer-triggered or forced.
    async fn run_task(&self, id: &str) -> RunOutcome {
        let Some((name, job, generation)) = self.lookup(id) else {
            debug!("Task {} is not registered", id);
            return RunOutcome::Unknown;
        };

        let Some(_running) = self.inner.in_flight.try_acquire(id) else {
            debug!("Task {} ({}) already running, skipping", name, id);
            return RunOutcome::Skipped;
        };

        let started = Instant::now();
        let result = job().await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.record_run(id, generation, true);
                debug!("Task {} ({}) completed in {:?}", name, id, elapsed);
                RunOutcome::Completed
            }
            Err(e) => {
                self.record_run(id, generation, false);
                error!("Task {} ({}) failed after {:?}: {:#}", name, id, elapsed, e);
                RunOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    fn lookup(&self, id: &str) -> Option<(String, Job, u64)> {
        lock(&self.inner.tasks)
            .get(id)
            .map(|task| (task.name.clone(), task.job.clone(), task.generation))
    }

    /// Records a finished run on the registration that started it.
    ///
    /// A run that outlives its registration leaves the replacement untouched.
    fn record_run(&self, id: &str, generation: u64, succeeded: bool) {
        let mut tasks = lock(&self.inner.tasks);
        let current = tasks
            .get_mut(id)
            .filter(|task| task.generation == generation);
        if let Some(task) = current {
            if succeeded {
                task.last_run = Some(Utc::now());
                task.run_count += 1;
            } else {
                task.failure_count += 1;
            }
        }
    }

    // == Stats ==
    pub fn stats(&self) -> SchedulerStats {
        let tasks = lock(&self.inner.tasks);

        let mut infos: Vec<TaskInfo> = tasks.values().map(|task| self.info(task)).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));

        SchedulerStats {
            total_tasks: infos.len(),
            active_tasks: infos.iter().filter(|info| info.timer_active).count(),
            in_flight: infos.iter().filter(|info| info.is_running).count(),
            tasks: infos,
        }
    }

    /// Metadata for one task, `None` if it is not registered.
    pub fn task_info(&self, id: &str) -> Option<TaskInfo> {
        lock(&self.inner.tasks).get(id).map(|task| self.info(task))
    }

    fn info(&self, task: &ScheduledTask) -> TaskInfo {
        TaskInfo {
            id: task.id.clone(),
            name: task.name.clone(),
            interval_ms: task.interval.as_millis() as u64,
            last_run: task.last_run,
            timer_active: task.timer_active(),
            is_running: self.inner.in_flight.contains(&task.id),
            run_count: task.run_count,
            failure_count: task.failure_count,
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        lock(&self.inner.tasks).contains_key(id)
    }
}
