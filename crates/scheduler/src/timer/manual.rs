//! Deterministic timer queue driven by a virtual clock.
//!
//! Nothing fires on its own: callers advance the clock with
//! [`ManualTimerQueue::advance`] or pop the earliest entry with
//! [`ManualTimerQueue::fire_next`]. Due tasks run synchronously on the
//! calling thread, so a task that reschedules itself from `run` lands back
//! in this queue before the call returns. Every schedule/unschedule request
//! is recorded for inspection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::timer::{ReadyRunnable, TimerQueue};

/// A request the queue received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueCall {
    Schedule { id: Uuid, delay: Duration },
    Unschedule { id: Uuid, delay: Duration, removed: bool },
}

struct Entry {
    seq: u64,
    due: Duration,
    delay: Duration,
    task: Arc<dyn ReadyRunnable>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    entries: Vec<Entry>,
    calls: Vec<QueueCall>,
    closed: bool,
}

impl ManualState {
    /// Remove and return the earliest entry due at or before `limit`.
    fn pop_due(&mut self, limit: Option<Duration>) -> Option<Entry> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| limit.map_or(true, |l| e.due <= l))
            .min_by_key(|(_, e)| (e.due, e.seq))
            .map(|(i, _)| i)?;
        let entry = self.entries.remove(idx);
        if entry.due > self.now {
            self.now = entry.due;
        }
        Some(entry)
    }
}

#[derive(Default)]
pub struct ManualTimerQueue {
    state: Mutex<ManualState>,
}

impl ManualTimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current virtual time since the queue was created.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Advance the clock by `by`, firing every entry that falls due, in
    /// due order. Entries enqueued by the fired tasks are fired too if they
    /// fall inside the window. Returns the number of firings.
    pub fn advance(&self, by: Duration) -> Result<usize, SchedulerError> {
        let limit = self.lock().now + by;
        let mut fired = 0;
        loop {
            let next = self.lock().pop_due(Some(limit));
            match next {
                Some(entry) => {
                    debug!(task = %entry.task.info(), delay_ms = entry.delay.as_millis() as u64, "manual queue firing");
                    entry.task.run()?;
                    fired += 1;
                }
                None => break,
            }
        }
        let mut state = self.lock();
        if state.now < limit {
            state.now = limit;
        }
        Ok(fired)
    }

    /// Fire the earliest pending entry regardless of its due time.
    /// Returns `false` when nothing is pending.
    pub fn fire_next(&self) -> Result<bool, SchedulerError> {
        let next = self.lock().pop_due(None);
        match next {
            Some(entry) => {
                entry.task.run()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pending `(task id, delay)` pairs in due order.
    pub fn pending(&self) -> Vec<(Uuid, Duration)> {
        let state = self.lock();
        let mut entries: Vec<&Entry> = state.entries.iter().collect();
        entries.sort_by_key(|e| (e.due, e.seq));
        entries.iter().map(|e| (e.task.id(), e.delay)).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<QueueCall> {
        self.lock().calls.clone()
    }

    /// Delays of the schedule requests received for `id`, in order.
    pub fn scheduled_delays(&self, id: Uuid) -> Vec<Duration> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                QueueCall::Schedule { id: cid, delay } if *cid == id => Some(*delay),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Drop all pending entries and reject further scheduling.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.entries.clear();
    }
}

impl TimerQueue for ManualTimerQueue {
    fn schedule(&self, delay: Duration, task: Arc<dyn ReadyRunnable>) -> Result<(), SchedulerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SchedulerError::QueueClosed);
        }
        let id = task.id();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.entries.push(Entry { seq, due, delay, task });
        state.calls.push(QueueCall::Schedule { id, delay });
        Ok(())
    }

    fn unschedule(&self, task: &dyn ReadyRunnable, delay: Duration) -> Result<bool, SchedulerError> {
        let id = task.id();
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|e| !(e.task.id() == id && e.delay == delay));
        let removed = state.entries.len() != before;
        state.calls.push(QueueCall::Unschedule { id, delay, removed });
        Ok(removed)
    }
}
