//! Queue sweeper
//!
//! On every tick, lists configuration ids and runs the batch queue
//! initializer over them. Queue creation is idempotent, so sweeping ids
//! that already have queues is harmless.

use anyhow::{Context as AnyhowContext, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spillway_services::ConfigSource;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::service::QueueInitializer;

/// Outcome of one sweep
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    /// Ids whose queues could not be created
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Periodic batch queue setup
pub struct QueueSweeper {
    interval: Duration,
    request_timeout: Duration,
    configs: Arc<dyn ConfigSource>,
    initializer: QueueInitializer,
}

impl QueueSweeper {
    pub fn new(
        interval: Duration,
        request_timeout: Duration,
        configs: Arc<dyn ConfigSource>,
        initializer: QueueInitializer,
    ) -> Self {
        Self {
            interval,
            request_timeout,
            configs,
            initializer,
        }
    }

    /// Sweeps on every tick until `shutdown` is cancelled
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting queue sweeper (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping queue sweeper");
                    break;
                }

                _ = interval.tick() => {
                    let ctx = Context::new(shutdown.child_token())
                        .with_timeout(self.request_timeout);
                    match self.sweep_once(&ctx).await {
                        Ok(report) if report.is_success() => {
                            debug!(attempted = report.attempted, "sweep finished");
                        }
                        Ok(report) => {
                            warn!(
                                attempted = report.attempted,
                                failed = ?report.failed,
                                "sweep finished with failures"
                            );
                        }
                        Err(e) => {
                            error!("Error during sweep: {:#}", e);
                        }
                    }
                }
            }
        }
    }

    /// Performs a single sweep
    ///
    /// Only a failure to list the ids is an error; per-id failures are
    /// listed in the report.
    pub async fn sweep_once(&self, ctx: &Context) -> Result<SweepReport> {
        let started_at = Utc::now();
        let request_id = ctx.request_id();

        let ids = self
            .configs
            .list_ids()
            .await
            .context("Failed to list configuration ids")?;
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        let failed = match self.initializer.setup_queues(ctx, &ids).await {
            Ok(()) => Vec::new(),
            Err(err) => {
                error!(%request_id, "{}", err);
                err.failed_ids().into_iter().map(str::to_string).collect()
            }
        };

        let report = SweepReport {
            started_at,
            finished_at: Utc::now(),
            attempted: ids.len(),
            failed,
        };
        info!(
            %request_id,
            attempted = report.attempted,
            failed = report.failed.len(),
            started_at = %report.started_at,
            finished_at = %report.finished_at,
            "sweep report"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spillway_services::{InMemoryQueueService, ServiceError, Simulation, StaticConfigSource};

    struct BrokenSource;

    struct RepeatingSource;

    #[async_trait]
    impl ConfigSource for RepeatingSource {
        async fn list_ids(&self) -> spillway_services::Result<Vec<String>> {
            Ok(vec!["a".to_string(), "a".to_string(), "b".to_string()])
        }
    }

    #[async_trait]
    impl ConfigSource for BrokenSource {
        async fn list_ids(&self) -> spillway_services::Result<Vec<String>> {
            Err(ServiceError::Unavailable("listing down".to_string()))
        }
    }

    fn sweeper(sim: &Simulation, configs: Arc<dyn ConfigSource>) -> QueueSweeper {
        QueueSweeper::new(
            Duration::from_secs(60),
            Duration::from_secs(30),
            configs,
            QueueInitializer::new(Arc::new(InMemoryQueueService::new(sim.clone()))),
        )
    }

    #[tokio::test]
    async fn test_sweep_once_reports_failures() {
        let sim = Simulation::new();
        sim.fail("queue.create", "b-queue");
        let sweeper = sweeper(&sim, Arc::new(StaticConfigSource::from_csv("a,b,c")));

        let report = sweeper.sweep_once(&Context::background()).await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, vec!["b".to_string()]);
        assert!(!report.is_success());
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_repeated_sweeps_are_idempotent() {
        let sim = Simulation::new();
        let sweeper = sweeper(&sim, Arc::new(StaticConfigSource::from_csv("a,b")));

        let first = sweeper.sweep_once(&Context::background()).await.unwrap();
        let second = sweeper.sweep_once(&Context::background()).await.unwrap();

        assert!(first.is_success());
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_attempted_once() {
        let sim = Simulation::new();
        sim.fail("queue.create", "a-queue");
        let sweeper = sweeper(&sim, Arc::new(RepeatingSource));

        let report = sweeper.sweep_once(&Context::background()).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_an_error() {
        let sim = Simulation::new();
        let sweeper = sweeper(&sim, Arc::new(BrokenSource));

        let err = sweeper
            .sweep_once(&Context::background())
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to list configuration ids"));
        assert!(sim.journal().entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_until_shutdown() {
        let sim = Simulation::new();
        let sweeper = sweeper(&sim, Arc::new(StaticConfigSource::from_csv("a")));
        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(150)).await;
            stopper.cancel();
        });

        sweeper.run(shutdown).await;

        // Ticks at 0s, 60s and 120s
        let creates = sim
            .journal()
            .entries()
            .iter()
            .filter(|entry| entry.as_str() == "queue.create:a-queue")
            .count();
        assert_eq!(creates, 3);
    }
}
