//! Request context
//!
//! Carries the request id, cancellation token and optional deadline of one
//! unit of work. Every collaborator call is raced against the context, so a
//! canceled or expired context aborts the in-flight call and stops any
//! later step.

use std::future::Future;
use std::time::Duration;

use spillway_services::ServiceError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{CancelReason, PipelineError, Result, Step};

#[derive(Debug, Clone)]
pub struct Context {
    request_id: Uuid,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context that stops when `cancel` is canceled
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancel,
            deadline: None,
        }
    }

    /// Creates a context with its own token and no deadline
    #[allow(dead_code)]
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    /// Limits the context to `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[allow(dead_code)]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns why the context is done, if it is
    pub fn done(&self) -> Option<CancelReason> {
        if self.cancel.is_cancelled() {
            return Some(CancelReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Runs `fut` unless the context finishes first
    pub async fn guard<F: Future>(&self, step: Step, id: &str, fut: F) -> Result<F::Output> {
        let canceled = |reason| PipelineError::Canceled {
            step,
            id: id.to_string(),
            reason,
        };

        if let Some(reason) = self.done() {
            return Err(canceled(reason));
        }

        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(canceled(CancelReason::Canceled)),
            _ = expiry => Err(canceled(CancelReason::DeadlineExceeded)),
            output = fut => Ok(output),
        }
    }

    /// Runs a collaborator call, wrapping its failure with the step and pipeline id
    pub async fn call<T, F>(&self, step: Step, id: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ServiceError>>,
    {
        self.guard(step, id, fut)
            .await?
            .map_err(|source| PipelineError::Collaborator {
                step,
                id: id.to_string(),
                source,
            })
    }

    /// Sleeps for `duration` unless the context finishes first
    pub async fn sleep(&self, step: Step, id: &str, duration: Duration) -> Result<()> {
        self.guard(step, id, tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_wraps_service_error() {
        let ctx = Context::background();

        let err = ctx
            .call(Step::CreateQueue, "p1", async {
                Err::<(), _>(ServiceError::Unavailable("down".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Collaborator {
                step: Step::CreateQueue,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_canceled_context_skips_call() {
        let ctx = Context::background();
        ctx.cancellation().cancel();
        let mut ran = false;

        let err = ctx
            .guard(Step::CreateQueue, "p1", async { ran = true })
            .await
            .unwrap_err();

        assert!(err.is_canceled());
        assert!(!ran);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_call() {
        let ctx = Context::background();
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = ctx
            .guard(
                Step::CreateConsumer,
                "p1",
                tokio::time::sleep(Duration::from_secs(60)),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Canceled {
                reason: CancelReason::Canceled,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));

        let err = ctx
            .sleep(Step::PollConsumerState, "p1", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Canceled {
                reason: CancelReason::DeadlineExceeded,
                ..
            }
        ));
    }

    #[test]
    fn test_request_ids_differ() {
        assert_ne!(
            Context::background().request_id(),
            Context::background().request_id()
        );
    }
}
