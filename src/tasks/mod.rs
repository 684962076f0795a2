//! Background Tasks Module
//!
//! Named jobs repeated on independent intervals, with on-demand runs and at
//! most one execution per task at a time.

mod scheduler;
mod stats;
mod task;

pub use scheduler::TaskScheduler;
pub use stats::{SchedulerStats, TaskInfo};
pub use task::{Job, JobFuture, RunOutcome};
