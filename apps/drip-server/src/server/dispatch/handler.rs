use std::{future::Future, sync::Arc};

use drip_core::{ClaimRequest, Origin};
use futures_util::future::BoxFuture;

/// Only `Err` vs `Ok` is observed by the dispatchers.
pub type HandlerResult = anyhow::Result<()>;

/// Receives a whole flush window at once.
///
/// Implemented for any `Fn(Arc<Origin>, Vec<ClaimRequest>) -> impl Future`.
pub trait BatchHandler: Send + Sync + 'static {
    fn handle_batch(
        &self,
        origin: Arc<Origin>,
        batch: Vec<ClaimRequest>,
    ) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> BatchHandler for F
where
    F: Fn(Arc<Origin>, Vec<ClaimRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle_batch(
        &self,
        origin: Arc<Origin>,
        batch: Vec<ClaimRequest>,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(origin, batch))
    }
}

/// Receives one drained task at a time, with the same value it was enqueued with.
pub trait TaskHandler<T>: Send + Sync + 'static {
    fn handle_task(&self, origin: Arc<Origin>, task: T) -> BoxFuture<'static, HandlerResult>;
}

impl<T, F, Fut> TaskHandler<T> for F
where
    F: Fn(Arc<Origin>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle_task(&self, origin: Arc<Origin>, task: T) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(origin, task))
    }
}

/// Handler that only logs what it would have sent. Wired in by the binary so
/// the service runs without a wallet backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunHandler;

impl BatchHandler for DryRunHandler {
    fn handle_batch(
        &self,
        origin: Arc<Origin>,
        batch: Vec<ClaimRequest>,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move {
            tracing::info!(
                event = "dispatch.dry_run.batch",
                origin = %origin.address(),
                batch_size = batch.len(),
            );
            for request in &batch {
                log_dry_run_transfer(&origin, request);
            }
            Ok(())
        })
    }
}

impl TaskHandler<ClaimRequest> for DryRunHandler {
    fn handle_task(
        &self,
        origin: Arc<Origin>,
        task: ClaimRequest,
    ) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async move {
            log_dry_run_transfer(&origin, &task);
            Ok(())
        })
    }
}

fn log_dry_run_transfer(origin: &Origin, request: &ClaimRequest) {
    tracing::info!(
        event = "dispatch.dry_run.transfer",
        origin = %origin.address(),
        claim_id = %request.id(),
        address = %request.address(),
        value = request.value(),
    );
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use drip_core::{ClaimRequest, Origin, SigningKey, WalletAddress};

    use super::{BatchHandler, DryRunHandler, HandlerResult, TaskHandler};

    fn origin() -> Arc<Origin> {
        Arc::new(Origin::new(
            WalletAddress::try_from("origin1").unwrap(),
            SigningKey::try_from(String::from("key")).unwrap(),
        ))
    }

    fn claim(address: &str, value: u64) -> ClaimRequest {
        ClaimRequest::new(WalletAddress::try_from(address).unwrap(), value)
    }

    #[tokio::test]
    async fn closures_act_as_batch_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |origin: Arc<Origin>, batch: Vec<ClaimRequest>| {
            let sink = Arc::clone(&sink);
            async move {
                let mut sink = sink.lock().unwrap();
                sink.push(origin.address().as_str().to_owned());
                sink.extend(batch.iter().map(|r| r.address().as_str().to_owned()));
                HandlerResult::Ok(())
            }
        };

        handler
            .handle_batch(origin(), vec![claim("a", 1), claim("b", 2)])
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["origin1", "a", "b"]);
    }

    #[tokio::test]
    async fn closures_act_as_task_handlers_and_surface_errors() {
        let handler = |_origin: Arc<Origin>, task: u32| async move {
            if task == 2 {
                return Err(anyhow!("boom"));
            }
            Ok(())
        };

        assert!(handler.handle_task(origin(), 1).await.is_ok());
        let error = handler.handle_task(origin(), 2).await.unwrap_err();
        assert_eq!(error.to_string(), "boom");
    }

    #[tokio::test]
    async fn dry_run_handler_always_succeeds() {
        let handler = DryRunHandler;
        assert!(handler
            .handle_batch(origin(), vec![claim("a", 1)])
            .await
            .is_ok());
        assert!(handler.handle_task(origin(), claim("b", 5)).await.is_ok());
    }
}
