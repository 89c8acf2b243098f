use std::net::IpAddr;

use linkd_core::CoreError;

/// Errors raised by the scheduler's own wiring and timer-queue interactions.
///
/// Collection failures never show up here; strategies handle their own.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A task has no usable timer-queue binding. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timer queue is shut down")]
    QueueClosed,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// An equal task (same package and address) is already registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task for {address} already registered in package '{package}'")]
pub struct DuplicateTaskError {
    pub package: String,
    pub address: IpAddr,
}
