//! Recurring network-discovery scheduler.
//!
//! A [`DiscoveryTask`] probes one target through an injected
//! [`CollectionStrategy`], reports lifecycle events to an `EventSink`, and
//! reschedules itself on a [`TimerQueue`] after every run. The
//! [`TaskRegistry`] keeps equal tasks (same package and address) from being
//! scheduled twice, and the [`DiscoveryCoordinator`] ties everything to
//! node lifecycle changes.

pub mod coordinator;
pub mod error;
pub mod registry;
pub mod strategy;
pub mod task;
pub mod timer;

pub use coordinator::{DiscoveryCoordinator, ScheduleOutcome};
pub use error::{DuplicateTaskError, SchedulerError};
pub use registry::{Accepted, TaskRegistry};
pub use strategy::{CollectionStrategy, ConfigSource, StrategyFactory};
pub use task::{DiscoveryTask, DiscoveryTaskBuilder};
pub use timer::{ManualTimerQueue, QueueCall, ReadyRunnable, TimerQueue, TokioTimerQueue};
