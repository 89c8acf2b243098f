//! Recurring discovery task for a single target.
//!
//! A [`DiscoveryTask`] owns the scheduling state of one target: its timing,
//! the suspension flag, whether it has run yet, and the collection config the
//! strategy probes with. It drives itself through the timer queue: every
//! firing ends by re-enqueueing the task at the steady-state interval, so a
//! task keeps running until somebody unschedules it.
//!
//! Unscheduling also marks the task cancelled. A firing that was already
//! dequeued (running, or waiting for the previous run) sees the mark and
//! does not re-enqueue itself.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use linkd_core::{CollectionConfig, DedupKey, DiscoveryTarget, NodeId, TaskTiming};
use linkd_events::{DiscoveryEvent, EventSink};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::strategy::{CollectionStrategy, ConfigSource};
use crate::timer::{ReadyRunnable, TimerQueue};

pub struct DiscoveryTask {
    id: Uuid,
    target: DiscoveryTarget,
    package: String,
    timing: TaskTiming,
    suspended: AtomicBool,
    has_run: AtomicBool,
    cancelled: AtomicBool,
    collection_config: RwLock<CollectionConfig>,
    /// Weak: pending queue entries hold the task, not the other way round.
    timer_queue: Weak<dyn TimerQueue>,
    events: Arc<dyn EventSink>,
    strategy: Arc<dyn CollectionStrategy>,
    config_source: Arc<dyn ConfigSource>,
}

impl DiscoveryTask {
    pub fn builder(target: DiscoveryTarget, config: CollectionConfig) -> DiscoveryTaskBuilder {
        DiscoveryTaskBuilder {
            target,
            config,
            package: None,
            timing: TaskTiming::default(),
            timer_queue: None,
            events: None,
            strategy: None,
            config_source: None,
        }
    }

    // ── Scheduling protocol ─────────────────────────────────────

    /// Enqueue the first firing, `initial_delay` from now.
    pub fn schedule(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let queue = self.bound_queue("scheduler not bound")?;
        self.cancelled.store(false, Ordering::SeqCst);
        debug!(
            node_id = self.target.node_id,
            address = %self.target.address,
            package = %self.package,
            delay_ms = millis(self.timing.initial_delay),
            "schedule"
        );
        queue.schedule(self.timing.initial_delay, Arc::clone(self) as Arc<dyn ReadyRunnable>)
    }

    /// Enqueue the next firing. Always the steady-state interval; the
    /// initial delay only gates the first firing.
    fn reschedule(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let queue = self.bound_queue("reschedule: scheduler not bound")?;
        if self.is_cancelled() {
            debug!(address = %self.target.address, "reschedule skipped: cancelled");
            return Ok(());
        }
        queue.schedule(self.timing.interval, Arc::clone(self) as Arc<dyn ReadyRunnable>)?;

        // An unschedule that raced the enqueue above may have missed it.
        if self.is_cancelled() {
            queue.unschedule(self.as_ref(), self.timing.interval)?;
        }
        Ok(())
    }

    /// Remove the pending firing from the timer queue.
    ///
    /// The queue indexes entries by the delay they were enqueued with, so
    /// the key is `initial_delay` until the first run and `interval` after.
    /// The task is marked cancelled first, so a firing already in progress
    /// will not re-enqueue it. `schedule()` clears the mark.
    pub fn unschedule(&self) -> Result<bool, SchedulerError> {
        self.cancelled.store(true, Ordering::SeqCst);
        let queue = self.bound_queue("unschedule: scheduler not bound")?;
        let delay = self.current_delay();
        let removed = queue.unschedule(self, delay)?;
        debug!(
            node_id = self.target.node_id,
            address = %self.target.address,
            package = %self.package,
            delay_ms = millis(delay),
            removed,
            "unschedule"
        );
        Ok(removed)
    }

    /// Delay the pending entry was enqueued with.
    pub fn current_delay(&self) -> Duration {
        if self.has_run() {
            self.timing.interval
        } else {
            self.timing.initial_delay
        }
    }

    fn bound_queue(&self, context: &str) -> Result<Arc<dyn TimerQueue>, SchedulerError> {
        self.timer_queue
            .upgrade()
            .ok_or_else(|| SchedulerError::Configuration(context.to_string()))
    }

    /// One discovery cycle minus the reschedule.
    fn run_collection(&self) {
        if self.is_suspended() {
            self.events.send(DiscoveryEvent::suspended(&self.target));
            debug!(address = %self.target.address, "run: suspended");
            return;
        }

        self.events.send(DiscoveryEvent::started(&self.target));

        let config = self.collection_config();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.strategy.perform_discovery(&self.target, &config)
        }));
        if outcome.is_err() {
            warn!(
                node_id = self.target.node_id,
                address = %self.target.address,
                strategy = %self.strategy.info(),
                "collection strategy panicked"
            );
        }

        self.events.send(DiscoveryEvent::completed(&self.target));
    }

    // ── Suspension ──────────────────────────────────────────────

    /// Skip real work on upcoming firings. The queue entry is untouched.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    /// Refresh the collection config from the authoritative source and
    /// resume real work.
    pub fn wake_up(&self) {
        self.refresh_config();
        self.suspended.store(false, Ordering::Relaxed);
    }

    /// Reload the collection config without touching the suspension flag.
    pub fn refresh_config(&self) {
        let fresh = self.config_source.lookup_current_config(self.target.address);
        *self
            .collection_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
    }

    // ── Identity ────────────────────────────────────────────────

    /// Whether `a` and `b` are the same logical task: equal package and
    /// equal target address. Node id and timing are ignored.
    pub fn same_target(a: &DiscoveryTask, b: &DiscoveryTask) -> bool {
        a.package == b.package && a.target.address == b.target.address
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(self.package.clone(), self.target.address)
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> DiscoveryTarget {
        self.target
    }

    pub fn node_id(&self) -> NodeId {
        self.target.node_id
    }

    pub fn address(&self) -> std::net::IpAddr {
        self.target.address
    }

    pub fn package_name(&self) -> &str {
        &self.package
    }

    pub fn timing(&self) -> TaskTiming {
        self.timing
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::SeqCst)
    }

    /// Whether `unschedule()` was called since the last `schedule()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn collection_config(&self) -> CollectionConfig {
        self.collection_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Description of the discovery flavor and package.
    pub fn info(&self) -> String {
        format!("{} [package {}]", self.strategy.info(), self.package)
    }
}

impl ReadyRunnable for DiscoveryTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn run(self: Arc<Self>) -> Result<(), SchedulerError> {
        if self.is_cancelled() {
            debug!(address = %self.target.address, "run skipped: cancelled");
            return Ok(());
        }
        self.run_collection();
        self.has_run.store(true, Ordering::SeqCst);
        self.reschedule()
    }

    fn info(&self) -> String {
        DiscoveryTask::info(self)
    }
}

impl fmt::Debug for DiscoveryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryTask")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("package", &self.package)
            .field("timing", &self.timing)
            .field("suspended", &self.is_suspended())
            .field("has_run", &self.has_run())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

// ── Builder ─────────────────────────────────────────────────────────

/// Builds a [`DiscoveryTask`] with all collaborators bound up front.
pub struct DiscoveryTaskBuilder {
    target: DiscoveryTarget,
    config: CollectionConfig,
    package: Option<String>,
    timing: TaskTiming,
    timer_queue: Option<Weak<dyn TimerQueue>>,
    events: Option<Arc<dyn EventSink>>,
    strategy: Option<Arc<dyn CollectionStrategy>>,
    config_source: Option<Arc<dyn ConfigSource>>,
}

impl DiscoveryTaskBuilder {
    /// Configuration group the task belongs to. Part of its dedup identity.
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn timing(mut self, timing: TaskTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Bind the queue the task schedules itself on. Only a weak reference
    /// is kept; once the queue is dropped the task is unbound.
    pub fn timer_queue(mut self, queue: &Arc<dyn TimerQueue>) -> Self {
        self.timer_queue = Some(Arc::downgrade(queue));
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn CollectionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    pub fn build(self) -> Result<Arc<DiscoveryTask>, SchedulerError> {
        let package = self
            .package
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| missing("package name"))?;
        if self.timing.interval.is_zero() {
            return Err(missing("interval must be greater than zero"));
        }
        let timer_queue = self.timer_queue.ok_or_else(|| missing("scheduler not bound"))?;
        let events = self.events.ok_or_else(|| missing("event sink not bound"))?;
        let strategy = self.strategy.ok_or_else(|| missing("collection strategy not bound"))?;
        let config_source = self
            .config_source
            .ok_or_else(|| missing("config source not bound"))?;

        Ok(Arc::new(DiscoveryTask {
            id: Uuid::new_v4(),
            target: self.target,
            package,
            timing: self.timing,
            suspended: AtomicBool::new(false),
            has_run: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            collection_config: RwLock::new(self.config),
            timer_queue,
            events,
            strategy,
            config_source,
        }))
    }
}

fn missing(what: &str) -> SchedulerError {
    SchedulerError::Configuration(what.to_string())
}
