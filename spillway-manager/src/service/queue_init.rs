//! Batch queue initializer
//!
//! Creates a queue pair for every configuration id at once. Each id gets its
//! own task; a failure for one id never stops the others, and every failure
//! is reported in one aggregate error.

use std::collections::HashSet;
use std::sync::Arc;

use spillway_services::QueueService;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::queues::create_queue_pair;
use crate::context::Context;
use crate::error::{BatchAggregateError, PipelineError, QueueCreationFailure};

/// Outcome reported by one per-id task
struct Outcome {
    id: String,
    queue_name: String,
    result: crate::error::Result<()>,
}

pub struct QueueInitializer {
    queues: Arc<dyn QueueService>,
}

impl QueueInitializer {
    pub fn new(queues: Arc<dyn QueueService>) -> Self {
        Self { queues }
    }

    /// Name of the primary queue for a configuration
    pub fn queue_name(id: &str) -> String {
        format!("{id}-queue")
    }

    /// Creates a primary and dead-letter queue for every id
    ///
    /// Returns once exactly one outcome has arrived per id. Duplicate ids
    /// are set up once.
    pub async fn setup_queues(
        &self,
        ctx: &Context,
        ids: &[String],
    ) -> Result<(), BatchAggregateError> {
        let mut seen = HashSet::new();
        let ids: Vec<&String> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        let attempted = ids.len();
        if attempted == 0 {
            debug!("no configurations to set up");
            return Ok(());
        }

        // Sized to the batch so no task ever waits to report
        let (tx, mut rx) = mpsc::channel::<Outcome>(attempted);
        let mut pending: HashSet<String> = HashSet::with_capacity(attempted);

        for id in ids {
            pending.insert(id.clone());
            let tx = tx.clone();
            let ctx = ctx.clone();
            let queues = Arc::clone(&self.queues);
            let id = id.clone();

            tokio::spawn(async move {
                let queue_name = Self::queue_name(&id);
                let result = create_queue_pair(&ctx, queues.as_ref(), &id, &queue_name, None)
                    .await
                    .map(|_| ());
                // The receiver outlives every sender
                let _ = tx
                    .send(Outcome {
                        id,
                        queue_name,
                        result,
                    })
                    .await;
            });
        }
        drop(tx);

        let mut failures = Vec::new();
        while let Some(outcome) = rx.recv().await {
            pending.remove(&outcome.id);
            match outcome.result {
                Ok(()) => {
                    debug!(config_id = %outcome.id, queue = %outcome.queue_name, "queues ready")
                }
                Err(source) => {
                    warn!(
                        config_id = %outcome.id,
                        queue = %outcome.queue_name,
                        "queue setup failed: {}",
                        source
                    );
                    failures.push(QueueCreationFailure {
                        id: outcome.id,
                        queue_name: outcome.queue_name,
                        source,
                    });
                }
            }
        }

        // A task that panicked dropped its sender without reporting
        let mut lost: Vec<String> = pending.into_iter().collect();
        lost.sort();
        for id in lost {
            failures.push(QueueCreationFailure {
                queue_name: Self::queue_name(&id),
                source: PipelineError::PanicRecovered {
                    message: format!("queue setup task for {id} ended without reporting"),
                    backtrace: String::new(),
                },
                id,
            });
        }

        info!(
            attempted,
            failed = failures.len(),
            "batch queue setup finished"
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchAggregateError {
                attempted,
                failures,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Step;
    use async_trait::async_trait;
    use spillway_core::QueueIdentifier;
    use spillway_services::{InMemoryQueueService, QueueAttributes, Simulation};
    use std::time::Duration;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_others() {
        let sim = Simulation::new();
        sim.fail("queue.create", "b-queue-dlq");
        let queues = Arc::new(InMemoryQueueService::new(sim.clone()));
        let initializer = QueueInitializer::new(queues.clone());

        let err = initializer
            .setup_queues(&Context::background(), &ids(&["a", "b", "c"]))
            .await
            .unwrap_err();

        assert_eq!(err.attempted, 3);
        assert_eq!(err.failed_ids(), vec!["b"]);
        assert_eq!(err.failures[0].queue_name, "b-queue");
        assert!(matches!(
            err.failures[0].source,
            PipelineError::Collaborator {
                step: Step::CreateDeadLetterQueue,
                ..
            }
        ));
        assert_eq!(
            queues.queue_names(),
            vec!["a-queue", "a-queue-dlq", "c-queue", "c-queue-dlq"]
        );
    }

    #[tokio::test]
    async fn test_all_success_is_ok() {
        let queues = Arc::new(InMemoryQueueService::new(Simulation::new()));
        let initializer = QueueInitializer::new(queues.clone());

        initializer
            .setup_queues(&Context::background(), &ids(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(queues.queue_names().len(), 6);
    }

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let sim = Simulation::new();
        let initializer = QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim.clone())));

        initializer
            .setup_queues(&Context::background(), &[])
            .await
            .unwrap();

        assert!(sim.journal().entries().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_set_up_once() {
        let sim = Simulation::new();
        let initializer = QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim.clone())));

        initializer
            .setup_queues(&Context::background(), &ids(&["a", "a"]))
            .await
            .unwrap();

        assert_eq!(sim.journal().entries().len(), 2);
    }

    #[tokio::test]
    async fn test_every_failure_reported() {
        let sim = Simulation::new();
        sim.fail("queue.create", "a-queue");
        sim.fail("queue.create", "c-queue-dlq");
        let initializer = QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim)));

        let err = initializer
            .setup_queues(&Context::background(), &ids(&["a", "b", "c"]))
            .await
            .unwrap_err();

        let mut failed = err.failed_ids();
        failed.sort();
        assert_eq!(failed, vec!["a", "c"]);
        assert!(
            err.to_string()
                .starts_with("queue creation failed for 2 of 3 configurations")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_runs_concurrently() {
        let sim = Simulation::new();
        sim.set_latency(Some(Duration::from_secs(1)));
        let initializer = QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim)));
        let started = tokio::time::Instant::now();

        initializer
            .setup_queues(&Context::background(), &ids(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        // Two sequential creates per id, ids in parallel
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_each_id() {
        let sim = Simulation::new();
        sim.set_latency(Some(Duration::from_secs(60)));
        let initializer = QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim)));
        let ctx = Context::background();
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });

        let err = initializer
            .setup_queues(&ctx, &ids(&["a", "b"]))
            .await
            .unwrap_err();

        assert_eq!(err.failures.len(), 2);
        assert!(err.failures.iter().all(|f| f.source.is_canceled()));
    }

    struct PanickingQueues;

    #[async_trait]
    impl QueueService for PanickingQueues {
        async fn create_queue(
            &self,
            name: &str,
            _attributes: &QueueAttributes,
        ) -> spillway_services::Result<QueueIdentifier> {
            if name.starts_with("boom") {
                panic!("queue backend exploded");
            }
            Ok(QueueIdentifier {
                url: format!("https://q/{name}"),
                arn: format!("arn:q:{name}"),
            })
        }

        async fn get_queue_attribute(
            &self,
            _url: &str,
            _name: &str,
        ) -> spillway_services::Result<String> {
            Ok(String::new())
        }

        async fn set_queue_attribute(
            &self,
            _url: &str,
            _name: &str,
            _value: &str,
        ) -> spillway_services::Result<()> {
            Ok(())
        }

        async fn delete_queue(&self, _url: &str) -> spillway_services::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_failure() {
        let initializer = QueueInitializer::new(Arc::new(PanickingQueues));

        let err = initializer
            .setup_queues(&Context::background(), &ids(&["ok", "boom"]))
            .await
            .unwrap_err();

        assert_eq!(err.failed_ids(), vec!["boom"]);
        assert!(matches!(
            err.failures[0].source,
            PipelineError::PanicRecovered { .. }
        ));
    }
}
