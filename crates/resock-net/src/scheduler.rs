//! Timer scheduler backed by the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use resock_core::{Scheduler, Task, TimerId};
use slotmap::SlotMap;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{NetError, Result};
use crate::logging::targets;

type Timers = Arc<Mutex<SlotMap<TimerId, AbortHandle>>>;

/// A [`Scheduler`] that runs each timer as a sleeping tokio task.
///
/// A timer fires at most once. Cancelling aborts its task; a timer that has
/// already started running its callback can no longer be cancelled.
pub struct TokioScheduler {
    runtime: Handle,
    timers: Timers,
}

impl TokioScheduler {
    /// Create a scheduler that spawns its timers on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::new(Mutex::new(SlotMap::with_key())),
        }
    }

    /// Create a scheduler on the tokio runtime of the calling context.
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| NetError::NoRuntime(e.to_string()))?;
        Ok(Self::new(runtime))
    }

    /// Number of timers that have not fired or been cancelled.
    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut timers = self.timers.lock();
        timers.insert_with_key(|id| {
            let timers = Arc::downgrade(&self.timers);
            self.runtime
                .spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Claim the timer; a concurrent cancel may have won.
                    let Some(timers) = timers.upgrade() else {
                        return;
                    };
                    if timers.lock().remove(id).is_none() {
                        return;
                    }
                    tracing::trace!(target: targets::SCHEDULER, "timer fired");
                    task();
                })
                .abort_handle()
        })
    }

    fn cancel(&self, id: TimerId) -> bool {
        match self.timers.lock().remove(id) {
            Some(handle) => {
                handle.abort();
                tracing::trace!(target: targets::SCHEDULER, "timer cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.lock().drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
