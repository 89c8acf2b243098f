//! Delay-based timer queue contract and its implementations.
//!
//! A [`TimerQueue`] fires each enqueued [`ReadyRunnable`] once after its
//! delay. Pending entries are indexed by task id *and* the delay they were
//! enqueued with, so cancelling an entry requires the same delay value.
//!
//! - `tokio_queue`: production queue running tasks on the tokio blocking pool
//! - `manual`: deterministic queue driven by a virtual clock

pub mod manual;
pub mod tokio_queue;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::SchedulerError;

pub use manual::{ManualTimerQueue, QueueCall};
pub use tokio_queue::TokioTimerQueue;

/// A unit of work a timer queue can fire.
pub trait ReadyRunnable: Send + Sync + 'static {
    /// Stable identity of this instance, used to index queue entries.
    fn id(&self) -> Uuid;

    /// Execute one firing. Errors are the runnable's own wiring failures.
    fn run(self: Arc<Self>) -> Result<(), SchedulerError>;

    /// Human-readable description for logs.
    fn info(&self) -> String;
}

/// Fires runnables once after a delay.
///
/// Implementations must never fire the same runnable instance concurrently
/// with itself.
pub trait TimerQueue: Send + Sync {
    /// Enqueue `task` to fire once after `delay`.
    fn schedule(&self, delay: Duration, task: Arc<dyn ReadyRunnable>) -> Result<(), SchedulerError>;

    /// Cancel pending firings of `task` that were enqueued with exactly
    /// `delay`. Returns whether anything was cancelled; a mismatched delay
    /// cancels nothing.
    fn unschedule(&self, task: &dyn ReadyRunnable, delay: Duration) -> Result<bool, SchedulerError>;
}
