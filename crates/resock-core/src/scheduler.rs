//! Deferred execution for reconnection attempts.
//!
//! The client never sleeps. When the reconnect policy asks for another
//! attempt, the client hands a one-shot task to a [`Scheduler`] and returns.
//! `resock-net` provides a tokio-backed scheduler; [`ManualScheduler`] is a
//! deterministic virtual clock for tests and hosts that drive time themselves.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//! use resock_core::{ManualScheduler, Scheduler};
//!
//! let scheduler = ManualScheduler::new();
//! let fired = Arc::new(AtomicBool::new(false));
//! let flag = fired.clone();
//! scheduler.schedule(Duration::from_millis(100), Box::new(move || flag.store(true, Ordering::SeqCst)));
//!
//! scheduler.advance(Duration::from_millis(99));
//! assert!(!fired.load(Ordering::SeqCst));
//! scheduler.advance(Duration::from_millis(1));
//! assert!(fired.load(Ordering::SeqCst));
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a scheduled task.
    pub struct TimerId;
}

/// A boxed one-shot task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs one-shot tasks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay`. Must not run `task` before returning.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a pending task.
    ///
    /// Returns `true` if the task was pending and will no longer run.
    fn cancel(&self, id: TimerId) -> bool;
}

/// An entry in the scheduler queue (min-heap by due time, then insertion order).
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: TimerId,
    due: Duration,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    tasks: SlotMap<TimerId, Task>,
    queue: BinaryHeap<QueueEntry>,
    seq: u64,
}

impl ManualState {
    /// Pop the next live entry due at or before `deadline`.
    fn pop_due(&mut self, deadline: Duration) -> Option<(Duration, Task)> {
        while let Some(entry) = self.queue.peek().copied() {
            if entry.due > deadline {
                return None;
            }
            self.queue.pop();
            // Cancelled tasks leave stale queue entries behind.
            if let Some(task) = self.tasks.remove(entry.id) {
                return Some((entry.due, task));
            }
        }
        None
    }
}

/// A scheduler driven by an explicit virtual clock.
///
/// Time only moves when [`advance`](Self::advance) is called. Due tasks run in
/// due-time order (ties in scheduling order) on the caller's thread, outside
/// the scheduler's lock, so a task may schedule further tasks.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks still waiting to run.
    pub fn pending(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Time until the next pending task is due, if any.
    pub fn time_until_next(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .queue
            .iter()
            .filter(|entry| state.tasks.contains_key(entry.id))
            .map(|entry| entry.due.saturating_sub(state.now))
            .min()
    }

    /// Move the clock forward by `by`, running every task that becomes due.
    ///
    /// Returns the number of tasks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.state.lock().now + by;
        let mut executed = 0;

        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pop_due(deadline);
                if let Some((due, _)) = &next {
                    state.now = *due;
                }
                next
            };
            let Some((_, task)) = next else { break };

            tracing::trace!(target: targets::SCHEDULER, "running scheduled task");
            task();
            executed += 1;
        }

        self.state.lock().now = deadline;
        executed
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = self.state.lock();
        let due = state.now + delay;
        let id = state.tasks.insert(task);
        state.seq += 1;
        let seq = state.seq;
        state.queue.push(QueueEntry { id, due, seq });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.state.lock().tasks.remove(id).is_some()
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.tasks.len())
            .finish()
    }
}
