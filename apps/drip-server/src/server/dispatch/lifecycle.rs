use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::anyhow;
use futures_util::future::BoxFuture;
use tokio::{
    sync::watch,
    time::{Instant, Interval, MissedTickBehavior},
};

use super::handler::HandlerResult;

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunControl {
    Run,
    Stop,
}

pub(crate) fn run_control() -> (watch::Sender<RunControl>, watch::Receiver<RunControl>) {
    watch::channel(RunControl::Run)
}

/// Resolves once `Stop` has been sent or the sender is gone.
pub(crate) async fn stopped(control: &mut watch::Receiver<RunControl>) {
    let _ = control
        .wait_for(|state| *state == RunControl::Stop)
        .await;
}

/// Sleeps for `delay` unless told to stop first. Returns `false` on stop.
pub(crate) async fn sleep_or_stop(
    delay: Duration,
    control: &mut watch::Receiver<RunControl>,
) -> bool {
    tokio::select! {
        biased;
        () = stopped(control) => false,
        () = tokio::time::sleep(delay) => true,
    }
}

/// Fixed-rate timer whose first tick is one full period after creation.
pub(crate) fn periodic(period: Duration) -> Interval {
    let period = period.max(MIN_PERIOD);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Runs a handler call on its own task so a panic is reported as an error
/// instead of tearing down the scheduler. `call` builds the handler future on
/// that task too, so a handler that panics before returning its future is
/// contained as well.
pub(crate) async fn run_handler<F>(call: F) -> HandlerResult
where
    F: FnOnce() -> BoxFuture<'static, HandlerResult> + Send + 'static,
{
    match tokio::spawn(async move { call().await }).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => Err(anyhow!("handler panicked")),
        Err(join_error) => Err(anyhow!("handler task aborted: {join_error}")),
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use futures_util::{future::BoxFuture, FutureExt};
    use tokio::time::Instant;

    use super::{periodic, run_control, run_handler, sleep_or_stop, stopped, RunControl};
    use crate::server::dispatch::HandlerResult;

    async fn succeeding_call() -> HandlerResult {
        Ok(())
    }

    async fn failing_call() -> HandlerResult {
        Err(anyhow!("rpc down"))
    }

    async fn panicking_call() -> HandlerResult {
        panic!("bad handler")
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_stop_completes_after_delay() {
        let (_control, mut rx) = run_control();
        let started = Instant::now();

        assert!(sleep_or_stop(Duration::from_secs(15), &mut rx).await);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_stop_is_cut_short_by_stop() {
        let (control, mut rx) = run_control();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            control.send_replace(RunControl::Stop);
            control
        });
        let started = Instant::now();

        assert!(!sleep_or_stop(Duration::from_secs(15), &mut rx).await);
        assert!(started.elapsed() < Duration::from_secs(15));
        let _control = stopper.await.unwrap();
    }

    #[tokio::test]
    async fn stopped_resolves_when_sender_is_dropped() {
        let (control, mut rx) = run_control();
        drop(control);
        stopped(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_first_tick_waits_one_period() {
        let started = Instant::now();
        let mut interval = periodic(Duration::from_secs(60));

        interval.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(60));
        interval.tick().await;
        assert!(started.elapsed() >= Duration::from_secs(120));
    }

    #[tokio::test]
    async fn periodic_tolerates_zero_period() {
        let mut interval = periodic(Duration::ZERO);
        interval.tick().await;
    }

    #[tokio::test]
    async fn run_handler_reports_errors_and_panics() {
        assert!(run_handler(|| succeeding_call().boxed()).await.is_ok());

        let failed = run_handler(|| failing_call().boxed()).await;
        assert_eq!(failed.unwrap_err().to_string(), "rpc down");

        let panicked = run_handler(|| panicking_call().boxed()).await;
        assert_eq!(panicked.unwrap_err().to_string(), "handler panicked");
    }

    #[tokio::test]
    async fn run_handler_contains_panic_while_building_the_call() {
        let outcome = run_handler(|| -> BoxFuture<'static, HandlerResult> {
            panic!("handler refused to build its call")
        })
        .await;

        assert_eq!(outcome.unwrap_err().to_string(), "handler panicked");
    }
}
