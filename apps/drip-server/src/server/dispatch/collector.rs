use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use drip_core::{BatchWindow, ClaimId, ClaimRequest, Origin, WalletAddress, DEFAULT_MAX_CLAIM_VALUE};
use tokio::{sync::watch, task::JoinHandle, task::JoinSet};

use super::{
    handler::{BatchHandler, HandlerResult},
    lifecycle::{lock, periodic, run_control, run_handler, stopped, RunControl},
    DispatchError,
};
use crate::server::metrics::{
    record_admission, record_batch_released, record_deny_reset, record_discarded,
    record_handler_outcome, COMPONENT_COLLECTOR,
};

pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(60);
pub const DEFAULT_DENY_RESET_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub flush_period: Duration,
    pub deny_reset_period: Duration,
    pub max_claim_value: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            flush_period: DEFAULT_FLUSH_PERIOD,
            deny_reset_period: DEFAULT_DENY_RESET_PERIOD,
            max_claim_value: DEFAULT_MAX_CLAIM_VALUE,
        }
    }
}

/// Batch-window collector: admits claims synchronously and releases the whole
/// pending window to its handler once per flush period.
///
/// Cloning yields another handle to the same collector.
#[derive(Clone)]
pub struct BatchCollector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    config: CollectorConfig,
    origin: Arc<Origin>,
    handler: Arc<dyn BatchHandler>,
    state: Mutex<CollectorState>,
    runner: Mutex<Option<Runner>>,
}

struct CollectorState {
    window: BatchWindow,
    closed: bool,
}

struct Runner {
    control: watch::Sender<RunControl>,
    task: JoinHandle<()>,
}

/// Per-item view of a released batch, kept for logging after the handler returns.
struct ReleasedClaim {
    id: ClaimId,
    address: WalletAddress,
    value: u64,
}

struct BatchReport {
    items: Vec<ReleasedClaim>,
    outcome: HandlerResult,
}

impl BatchCollector {
    #[must_use]
    pub fn new(config: CollectorConfig, origin: Origin, handler: impl BatchHandler) -> Self {
        let window = BatchWindow::new(config.max_claim_value);
        Self {
            inner: Arc::new(CollectorInner {
                config,
                origin: Arc::new(origin),
                handler: Arc::new(handler),
                state: Mutex::new(CollectorState {
                    window,
                    closed: false,
                }),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Arms the flush and deny-reset timers. Both first fire one full period
    /// after this call.
    ///
    /// # Errors
    /// Returns [`DispatchError::AlreadyRunning`] on a second call and
    /// [`DispatchError::ShutDown`] after [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), DispatchError> {
        // `closed` is read under the runner lock: `stop` sets it before taking that lock.
        let mut runner = lock(&self.inner.runner);
        if lock(&self.inner.state).closed {
            return Err(DispatchError::ShutDown);
        }
        if runner.is_some() {
            return Err(DispatchError::AlreadyRunning);
        }

        let (control, control_rx) = run_control();
        let task = tokio::spawn(run_collector(Arc::clone(&self.inner), control_rx));
        *runner = Some(Runner { control, task });
        Ok(())
    }

    /// Admits a claim into the current window.
    ///
    /// # Errors
    /// Returns [`DispatchError::Rejected`] when an admission check fails and
    /// [`DispatchError::ShutDown`] once the collector has been stopped.
    pub fn enqueue(&self, request: ClaimRequest) -> Result<(), DispatchError> {
        let claim_id = request.id();
        let address = request.address().clone();
        let value = request.value();

        let mut state = lock(&self.inner.state);
        if state.closed {
            return Err(DispatchError::ShutDown);
        }
        let admitted = state.window.admit(request);
        drop(state);

        match admitted {
            Ok(()) => {
                record_admission(COMPONENT_COLLECTOR, "accepted");
                tracing::debug!(
                    event = "dispatch.collector.admit",
                    claim_id = %claim_id,
                    address = %address,
                    value,
                );
                Ok(())
            }
            Err(rejection) => {
                record_admission(COMPONENT_COLLECTOR, rejection.code());
                tracing::info!(
                    event = "dispatch.collector.reject",
                    claim_id = %claim_id,
                    address = %address,
                    value,
                    reason = rejection.code(),
                );
                Err(DispatchError::Rejected(rejection))
            }
        }
    }

    /// Cancels both timers and returns the claims that were still waiting for
    /// a flush. They are never passed to the handler. Batches already handed
    /// to the handler keep running to completion in the background.
    pub async fn stop(&self) -> Vec<ClaimRequest> {
        let released = {
            let mut state = lock(&self.inner.state);
            state.closed = true;
            state.window.take_batch()
        };
        let runner = lock(&self.inner.runner).take();
        if let Some(Runner { control, task }) = runner {
            control.send_replace(RunControl::Stop);
            if let Err(error) = task.await {
                tracing::error!(event = "dispatch.collector.stop", error = %error);
            }
        }

        record_discarded(COMPONENT_COLLECTOR, released.len());
        tracing::info!(
            event = "dispatch.collector.stopped",
            discarded = released.len(),
        );
        released
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.runner).is_some()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.state).window.pending_len()
    }

    #[must_use]
    pub fn is_denied(&self, address: &WalletAddress) -> bool {
        lock(&self.inner.state).window.is_denied(address)
    }

    #[must_use]
    pub fn config(&self) -> &CollectorConfig {
        &self.inner.config
    }
}

impl CollectorInner {
    /// Hands the current window to the handler on a separate task and starts
    /// a fresh window. A handler that never returns only holds its own batch.
    fn flush(&self, in_flight: &mut JoinSet<BatchReport>) {
        let batch = lock(&self.state).window.take_batch();
        if batch.is_empty() {
            return;
        }

        let items = batch
            .iter()
            .map(|request| ReleasedClaim {
                id: request.id(),
                address: request.address().clone(),
                value: request.value(),
            })
            .collect::<Vec<_>>();
        record_batch_released(COMPONENT_COLLECTOR, items.len());
        tracing::info!(event = "dispatch.collector.flush", batch_size = items.len());

        let handler = Arc::clone(&self.handler);
        let origin = Arc::clone(&self.origin);
        in_flight.spawn(async move {
            let outcome = run_handler(move || handler.handle_batch(origin, batch)).await;
            BatchReport { items, outcome }
        });
    }

    fn reset_deny_list(&self) {
        let released = lock(&self.state).window.reset_deny_list();
        record_deny_reset();
        tracing::info!(event = "dispatch.collector.deny_reset", released);
    }
}

async fn run_collector(inner: Arc<CollectorInner>, mut control: watch::Receiver<RunControl>) {
    let mut flush_timer = periodic(inner.config.flush_period);
    let mut deny_reset_timer = periodic(inner.config.deny_reset_period);
    let mut in_flight = JoinSet::new();
    tracing::info!(
        event = "dispatch.collector.start",
        origin = %inner.origin.address(),
        flush_period_ms = inner.config.flush_period.as_millis(),
        deny_reset_period_ms = inner.config.deny_reset_period.as_millis(),
    );

    loop {
        tokio::select! {
            biased;
            () = stopped(&mut control) => break,
            _ = flush_timer.tick() => inner.flush(&mut in_flight),
            _ = deny_reset_timer.tick() => inner.reset_deny_list(),
            Some(joined) = in_flight.join_next() => match joined {
                Ok(report) => log_batch_report(report),
                Err(error) => {
                    record_handler_outcome(COMPONENT_COLLECTOR, false);
                    tracing::error!(event = "dispatch.collector.batch", error = %error);
                }
            },
        }
    }

    // Released batches belong to the handler now; let them finish on their own.
    in_flight.detach_all();
}

fn log_batch_report(report: BatchReport) {
    match report.outcome {
        Ok(()) => {
            record_handler_outcome(COMPONENT_COLLECTOR, true);
            for item in &report.items {
                tracing::info!(
                    event = "dispatch.collector.claim_sent",
                    claim_id = %item.id,
                    address = %item.address,
                    value = item.value,
                );
            }
        }
        Err(error) => {
            record_handler_outcome(COMPONENT_COLLECTOR, false);
            tracing::error!(
                event = "dispatch.collector.batch_failed",
                batch_size = report.items.len(),
                error = %error,
            );
        }
    }
}
