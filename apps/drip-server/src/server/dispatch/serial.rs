use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use drip_core::{DrainQueue, DrainState, Origin, Wake};
use tokio::{sync::watch, task::JoinHandle};

use super::{
    handler::TaskHandler,
    lifecycle::{lock, run_control, run_handler, sleep_or_stop, RunControl},
    DispatchError,
};
use crate::server::metrics::{
    record_admission, record_discarded, record_drain_task, record_handler_outcome,
    COMPONENT_DRAIN,
};

/// How long `stop` waits for a handler call that is already running.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// FIFO that hands tasks to its handler one at a time, pausing for a fixed
/// delay after every call.
///
/// There is no explicit `start`: the first enqueue on an idle queue spawns
/// the drain cycle and the cycle ends once it finds the queue empty.
pub struct SerialDrainQueue<T> {
    inner: Arc<DrainInner<T>>,
}

impl<T> Clone for SerialDrainQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct DrainInner<T> {
    delay: Duration,
    origin: Arc<Origin>,
    handler: Arc<dyn TaskHandler<T>>,
    slot: Mutex<DrainSlot<T>>,
    control: watch::Sender<RunControl>,
}

struct DrainSlot<T> {
    queue: DrainQueue<T>,
    cycle: Option<JoinHandle<()>>,
    closed: bool,
}

impl<T: Send + 'static> SerialDrainQueue<T> {
    #[must_use]
    pub fn new(delay: Duration, origin: Origin, handler: impl TaskHandler<T>) -> Self {
        let (control, _) = run_control();
        Self {
            inner: Arc::new(DrainInner {
                delay,
                origin: Arc::new(origin),
                handler: Arc::new(handler),
                slot: Mutex::new(DrainSlot {
                    queue: DrainQueue::new(),
                    cycle: None,
                    closed: false,
                }),
                control,
            }),
        }
    }

    /// Appends a task. Starts a drain cycle when none is active.
    ///
    /// # Errors
    /// Returns [`DispatchError::ShutDown`] once the queue has been stopped.
    pub fn enqueue(&self, task: T) -> Result<(), DispatchError> {
        let mut slot = lock(&self.inner.slot);
        if slot.closed {
            return Err(DispatchError::ShutDown);
        }
        let wake = slot.queue.push(task);
        let queued = slot.queue.len();
        if wake == Wake::StartCycle {
            let control = self.inner.control.subscribe();
            slot.cycle = Some(tokio::spawn(run_cycle(Arc::clone(&self.inner), control)));
        }
        drop(slot);

        record_admission(COMPONENT_DRAIN, "accepted");
        tracing::debug!(
            event = "dispatch.drain.enqueue",
            queued,
            started_cycle = wake == Wake::StartCycle,
        );
        Ok(())
    }

    /// Halts the cycle between tasks and returns what was still queued.
    ///
    /// Queued tasks are released at once and never handed to the handler. A
    /// handler call already in progress gets up to [`STOP_GRACE`] to finish;
    /// past that it is left running detached. The delay after it is cut short.
    pub async fn stop(&self) -> Vec<T> {
        let (cycle, released) = {
            let mut slot = lock(&self.inner.slot);
            slot.closed = true;
            (slot.cycle.take(), slot.queue.release())
        };
        self.inner.control.send_replace(RunControl::Stop);
        if let Some(cycle) = cycle {
            match tokio::time::timeout(STOP_GRACE, cycle).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(event = "dispatch.drain.stop", error = %error);
                }
                Err(_) => {
                    tracing::warn!(
                        event = "dispatch.drain.stop",
                        outcome = "detached",
                        grace_ms = STOP_GRACE.as_millis(),
                    );
                }
            }
        }

        record_discarded(COMPONENT_DRAIN, released.len());
        tracing::info!(event = "dispatch.drain.stopped", discarded = released.len());
        released
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.slot).queue.len()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        lock(&self.inner.slot).queue.state() == DrainState::Draining
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

/// Puts the queue back to idle if the cycle unwinds, so the next enqueue can
/// start a fresh one.
struct CycleGuard<'a, T> {
    slot: &'a Mutex<DrainSlot<T>>,
}

impl<T> Drop for CycleGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.slot).queue.abandon_cycle();
            tracing::error!(event = "dispatch.drain.cycle", state = "abandoned");
        }
    }
}

async fn run_cycle<T: Send + 'static>(
    inner: Arc<DrainInner<T>>,
    mut control: watch::Receiver<RunControl>,
) {
    let _guard = CycleGuard { slot: &inner.slot };
    tracing::debug!(event = "dispatch.drain.cycle", state = "draining");
    loop {
        let next = lock(&inner.slot).queue.next_task();
        let Some(task) = next else {
            break;
        };

        let handler = Arc::clone(&inner.handler);
        let origin = Arc::clone(&inner.origin);
        match run_handler(move || handler.handle_task(origin, task)).await {
            Ok(()) => {
                record_handler_outcome(COMPONENT_DRAIN, true);
                tracing::info!(event = "dispatch.drain.task", outcome = "handled");
            }
            Err(error) => {
                record_handler_outcome(COMPONENT_DRAIN, false);
                tracing::error!(
                    event = "dispatch.drain.task",
                    outcome = "failed",
                    error = %error,
                );
            }
        }
        record_drain_task();

        if !sleep_or_stop(inner.delay, &mut control).await {
            tracing::debug!(event = "dispatch.drain.cycle", state = "stopped");
            return;
        }
    }
    tracing::debug!(event = "dispatch.drain.cycle", state = "idle");
}
