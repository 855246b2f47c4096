//! Queue pair creation shared by the adder and the batch initializer

use spillway_core::QueuePair;
use spillway_services::{
    ATTR_REDRIVE_POLICY, ATTR_VISIBILITY_TIMEOUT, QueueAttributes, QueueService, RedrivePolicy,
};

use crate::context::Context;
use crate::error::{PipelineError, Result, Step};

/// Receives before a message moves to the dead-letter queue
pub const DEFAULT_REDRIVE_COUNT: u32 = 2;

pub const DEAD_LETTER_SUFFIX: &str = "-dlq";

/// Creates `name` and its dead-letter queue `name-dlq`
///
/// The dead-letter queue is created first so the primary can carry a
/// redrive policy pointing at its ARN. A visibility timeout is set on the
/// primary only when given.
pub(crate) async fn create_queue_pair(
    ctx: &Context,
    queues: &dyn QueueService,
    id: &str,
    name: &str,
    visibility_timeout_seconds: Option<u32>,
) -> Result<QueuePair> {
    let dead_letter_name = format!("{name}{DEAD_LETTER_SUFFIX}");
    let dead_letter = ctx
        .call(
            Step::CreateDeadLetterQueue,
            id,
            queues.create_queue(&dead_letter_name, &QueueAttributes::new()),
        )
        .await?;

    let attributes = primary_attributes(id, &dead_letter.arn, visibility_timeout_seconds)?;
    let primary = ctx
        .call(Step::CreateQueue, id, queues.create_queue(name, &attributes))
        .await?;

    tracing::debug!(
        pipeline_id = %id,
        queue_url = %primary.url,
        dead_letter_queue_url = %dead_letter.url,
        "created queue pair"
    );

    Ok(QueuePair {
        primary,
        dead_letter,
    })
}

fn primary_attributes(
    id: &str,
    dead_letter_arn: &str,
    visibility_timeout_seconds: Option<u32>,
) -> Result<QueueAttributes> {
    let policy = RedrivePolicy::new(DEFAULT_REDRIVE_COUNT, dead_letter_arn)
        .to_attribute()
        .map_err(|source| PipelineError::Collaborator {
            step: Step::CreateQueue,
            id: id.to_string(),
            source,
        })?;

    let mut attributes = QueueAttributes::new();
    attributes.insert(ATTR_REDRIVE_POLICY.to_string(), policy);
    if let Some(timeout) = visibility_timeout_seconds {
        attributes.insert(ATTR_VISIBILITY_TIMEOUT.to_string(), timeout.to_string());
    }
    Ok(attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_services::{InMemoryQueueService, Simulation};

    #[tokio::test]
    async fn test_dead_letter_created_first_and_linked() {
        let sim = Simulation::new();
        let queues = InMemoryQueueService::new(sim.clone());

        let pair = create_queue_pair(&Context::background(), &queues, "p1", "p1-dev-queue", Some(30))
            .await
            .unwrap();

        assert_eq!(
            sim.journal().entries(),
            vec![
                "queue.create:p1-dev-queue-dlq".to_string(),
                "queue.create:p1-dev-queue".to_string(),
            ]
        );
        let attributes = queues.attributes(&pair.primary.url).unwrap();
        assert_eq!(attributes[ATTR_VISIBILITY_TIMEOUT], "30");
        let policy: RedrivePolicy =
            serde_json::from_str(&attributes[ATTR_REDRIVE_POLICY]).unwrap();
        assert_eq!(policy, RedrivePolicy::new(2, pair.dead_letter.arn.clone()));
    }

    #[tokio::test]
    async fn test_defaults_leave_visibility_unset() {
        let queues = InMemoryQueueService::new(Simulation::new());

        let pair = create_queue_pair(&Context::background(), &queues, "a", "a-queue", None)
            .await
            .unwrap();

        let attributes = queues.attributes(&pair.primary.url).unwrap();
        assert!(!attributes.contains_key(ATTR_VISIBILITY_TIMEOUT));
        assert!(attributes.contains_key(ATTR_REDRIVE_POLICY));
    }

    #[tokio::test]
    async fn test_dead_letter_failure_stops_primary() {
        let sim = Simulation::new();
        sim.fail("queue.create", "a-queue-dlq");
        let queues = InMemoryQueueService::new(sim.clone());

        let err = create_queue_pair(&Context::background(), &queues, "a", "a-queue", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Collaborator {
                step: Step::CreateDeadLetterQueue,
                ..
            }
        ));
        assert_eq!(
            sim.journal().entries(),
            vec!["queue.create:a-queue-dlq".to_string()]
        );
    }
}
