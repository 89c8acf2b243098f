//! Timer queue backed by the tokio runtime.
//!
//! Each pending entry is a spawned sleep. When it expires the entry is
//! removed and the runnable executes on the blocking pool, since runnables
//! call collection strategies synchronously. Different runnables fire
//! concurrently; firings of the same runnable are serialized through a
//! per-id gate, so a late firing waits for the previous run to finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::timer::{ReadyRunnable, TimerQueue};

struct PendingEntry {
    seq: u64,
    delay: Duration,
    abort: AbortHandle,
}

#[derive(Default)]
struct QueueState {
    /// Task id → pending firings of that task.
    entries: HashMap<Uuid, Vec<PendingEntry>>,
    /// Task id → gate held while a firing of that task runs.
    gates: HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn remove_entry(&mut self, id: Uuid, seq: u64) {
        if let Some(list) = self.entries.get_mut(&id) {
            list.retain(|e| e.seq != seq);
            if list.is_empty() {
                self.entries.remove(&id);
            }
        }
    }

    /// Forget the gate for `id` once nobody else holds it and nothing is
    /// pending for that task.
    fn release_gate(&mut self, id: Uuid, gate: Arc<tokio::sync::Mutex<()>>) {
        // The map and `gate` account for two strong references.
        if Arc::strong_count(&gate) <= 2 && !self.entries.contains_key(&id) {
            self.gates.remove(&id);
        }
    }
}

struct Inner {
    handle: Handle,
    state: Mutex<QueueState>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fire(self: Arc<Self>, id: Uuid, seq: u64, task: Arc<dyn ReadyRunnable>) {
        let gate = {
            let mut state = self.lock();
            state.remove_entry(id, seq);
            Arc::clone(state.gates.entry(id).or_default())
        };

        let guard = Arc::clone(&gate).lock_owned().await;
        let info = task.info();
        let result = tokio::task::spawn_blocking(move || task.run()).await;
        drop(guard);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(task = %info, error = %e, "scheduled task failed"),
            Err(e) => error!(task = %info, error = %e, "scheduled task panicked"),
        }

        self.lock().release_gate(id, gate);
    }
}

/// Production [`TimerQueue`] running on a tokio runtime.
///
/// Dropping the queue cancels everything still pending.
pub struct TokioTimerQueue {
    inner: Arc<Inner>,
}

impl TokioTimerQueue {
    /// Create a queue on the current tokio runtime.
    pub fn new() -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|e| {
            SchedulerError::Configuration(format!("timer queue needs a tokio runtime: {e}"))
        })?;
        Ok(Self::with_handle(handle))
    }

    /// Create a queue that spawns its timers on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Number of firings waiting for their delay to elapse.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().entries.values().map(Vec::len).sum()
    }

    /// Delays of the pending firings of `id`, in enqueue order.
    pub fn pending_delays(&self, id: Uuid) -> Vec<Duration> {
        self.inner
            .lock()
            .entries
            .get(&id)
            .map(|list| list.iter().map(|e| e.delay).collect())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Cancel all pending firings and reject further scheduling. Runs
    /// already in progress finish; their reschedule attempts fail with
    /// [`SchedulerError::QueueClosed`].
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let cancelled: usize = state
            .entries
            .drain()
            .flat_map(|(_, list)| list)
            .map(|e| e.abort.abort())
            .count();
        debug!(cancelled, "timer queue shut down");
    }
}

impl TimerQueue for TokioTimerQueue {
    fn schedule(&self, delay: Duration, task: Arc<dyn ReadyRunnable>) -> Result<(), SchedulerError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(SchedulerError::QueueClosed);
        }

        let id = task.id();
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(task = %task.info(), %id, delay_ms = delay.as_millis() as u64, "schedule");

        // The state lock is held until the entry is recorded, so the timer
        // cannot observe a missing entry even with a zero delay.
        let inner = Arc::clone(&self.inner);
        let join = self.inner.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(id, seq, task).await;
        });
        state.entries.entry(id).or_default().push(PendingEntry {
            seq,
            delay,
            abort: join.abort_handle(),
        });
        Ok(())
    }

    fn unschedule(&self, task: &dyn ReadyRunnable, delay: Duration) -> Result<bool, SchedulerError> {
        let id = task.id();
        let mut state = self.inner.lock();
        let Some(list) = state.entries.get_mut(&id) else {
            debug!(%id, delay_ms = delay.as_millis() as u64, "unschedule: nothing pending");
            return Ok(false);
        };

        let before = list.len();
        list.retain(|e| {
            if e.delay == delay {
                e.abort.abort();
                false
            } else {
                true
            }
        });
        let removed = list.len() != before;
        if list.is_empty() {
            state.entries.remove(&id);
        }
        debug!(%id, delay_ms = delay.as_millis() as u64, removed, "unschedule");
        Ok(removed)
    }
}

impl Drop for TokioTimerQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
