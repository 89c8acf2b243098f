//! Wires discovery tasks to the timer queue, event sink, and registry.
//!
//! The coordinator is the orchestrator that owns tasks: it builds them with
//! their package's timing, admits them through the [`TaskRegistry`], and
//! reacts to node lifecycle changes (add, update, delete, suspend, resume).

use std::sync::Arc;

use linkd_core::{DiscoveryTarget, LinkdConfig, NodeId};
use linkd_events::EventSink;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::registry::TaskRegistry;
use crate::strategy::{ConfigSource, StrategyFactory};
use crate::task::DiscoveryTask;
use crate::timer::TimerQueue;

/// Result of asking the coordinator to schedule a target.
#[derive(Debug)]
pub enum ScheduleOutcome {
    Scheduled(Arc<DiscoveryTask>),
    /// An equal task is already active; the candidate was discarded.
    AlreadyScheduled,
}

pub struct DiscoveryCoordinator {
    config: Arc<LinkdConfig>,
    timer_queue: Arc<dyn TimerQueue>,
    events: Arc<dyn EventSink>,
    config_source: Arc<dyn ConfigSource>,
    strategies: StrategyFactory,
    registry: TaskRegistry,
}

impl DiscoveryCoordinator {
    /// Create a coordinator. `config` also serves as the authoritative
    /// config source for waking tasks.
    pub fn new(
        config: Arc<LinkdConfig>,
        timer_queue: Arc<dyn TimerQueue>,
        events: Arc<dyn EventSink>,
        strategies: StrategyFactory,
    ) -> Self {
        let config_source: Arc<dyn ConfigSource> = config.clone();
        Self {
            config,
            timer_queue,
            events,
            config_source,
            strategies,
            registry: TaskRegistry::new(),
        }
    }

    /// Replace the source consulted for collection configs.
    pub fn with_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = source;
        self
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn task(&self, package: &str, address: std::net::IpAddr) -> Option<Arc<DiscoveryTask>> {
        self.registry.get(package, address)
    }

    /// Build, admit, and schedule a task for `target` under `package`.
    pub fn schedule_target(
        &self,
        package: &str,
        target: DiscoveryTarget,
    ) -> Result<ScheduleOutcome, SchedulerError> {
        let task = DiscoveryTask::builder(
            target,
            self.config_source.lookup_current_config(target.address),
        )
        .package(package)
        .timing(self.config.timing_for(package))
        .timer_queue(&self.timer_queue)
        .event_sink(Arc::clone(&self.events))
        .strategy((self.strategies)(&target, package))
        .config_source(Arc::clone(&self.config_source))
        .build()?;

        if let Err(dup) = self.registry.register(&task) {
            debug!(%dup, node_id = target.node_id, "discarding duplicate discovery task");
            return Ok(ScheduleOutcome::AlreadyScheduled);
        }

        if let Err(e) = task.schedule() {
            self.registry.unregister(&task);
            return Err(e);
        }

        info!(
            node_id = target.node_id,
            address = %target.address,
            package,
            initial_delay_secs = task.timing().initial_delay.as_secs(),
            interval_secs = task.timing().interval.as_secs(),
            "discovery scheduled"
        );
        Ok(ScheduleOutcome::Scheduled(task))
    }

    /// Schedule every target listed in the configuration's packages.
    /// Returns how many were newly scheduled.
    pub fn schedule_configured(&self) -> Result<usize, SchedulerError> {
        let mut scheduled = 0;
        for (package, target) in self.config.configured_targets() {
            if let ScheduleOutcome::Scheduled(_) = self.schedule_target(&package, target)? {
                scheduled += 1;
            }
        }
        Ok(scheduled)
    }

    /// Suspend every task of `node_id`. Returns the number of tasks.
    pub fn suspend_node(&self, node_id: NodeId) -> usize {
        let tasks = self.registry.tasks_for_node(node_id);
        for task in &tasks {
            task.suspend();
        }
        info!(node_id, tasks = tasks.len(), "discovery suspended");
        tasks.len()
    }

    /// Resume every task of `node_id` with a refreshed config.
    pub fn wake_up_node(&self, node_id: NodeId) -> usize {
        let tasks = self.registry.tasks_for_node(node_id);
        for task in &tasks {
            task.wake_up();
        }
        info!(node_id, tasks = tasks.len(), "discovery resumed");
        tasks.len()
    }

    /// The node's agent configuration changed: reload it into its tasks.
    /// Suspended tasks stay suspended.
    pub fn update_node(&self, node_id: NodeId) -> usize {
        let tasks = self.registry.tasks_for_node(node_id);
        for task in &tasks {
            task.refresh_config();
        }
        debug!(node_id, tasks = tasks.len(), "node configuration refreshed");
        tasks.len()
    }

    /// The node is gone: unschedule and forget all of its tasks.
    pub fn delete_node(&self, node_id: NodeId) -> Result<usize, SchedulerError> {
        let tasks = self.registry.tasks_for_node(node_id);
        self.remove_tasks(&tasks)?;
        info!(node_id, tasks = tasks.len(), "discovery removed for node");
        Ok(tasks.len())
    }

    /// Unschedule and forget every task of `package`.
    pub fn unschedule_package(&self, package: &str) -> Result<usize, SchedulerError> {
        let tasks = self.registry.tasks_for_package(package);
        self.remove_tasks(&tasks)?;
        info!(package, tasks = tasks.len(), "discovery removed for package");
        Ok(tasks.len())
    }

    /// Unschedule and unregister every task in `tasks`. A failed unschedule
    /// still unregisters the task (it is marked cancelled either way); the
    /// first error is returned once all tasks were attempted.
    fn remove_tasks(&self, tasks: &[Arc<DiscoveryTask>]) -> Result<(), SchedulerError> {
        let result = unschedule_all(tasks);
        for task in tasks {
            self.registry.unregister(task);
        }
        result
    }

    /// Unschedule everything. Every task is attempted; the first error is
    /// returned afterwards.
    pub fn shutdown(&self) -> Result<usize, SchedulerError> {
        let tasks = self.registry.drain();
        let result = unschedule_all(&tasks);
        info!(tasks = tasks.len(), "discovery coordinator shut down");
        result.map(|()| tasks.len())
    }
}

fn unschedule_all(tasks: &[Arc<DiscoveryTask>]) -> Result<(), SchedulerError> {
    let mut first_error = None;
    for task in tasks {
        if let Err(e) = task.unschedule() {
            warn!(
                node_id = task.node_id(),
                address = %task.address(),
                error = %e,
                "unschedule failed"
            );
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
