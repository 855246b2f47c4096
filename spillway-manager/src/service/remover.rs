//! Delete path
//!
//! Tears a pipeline down in dependency order: the consumer first, then both
//! queues, then the identifier record. The record stays until every
//! resource it names is gone, so a redelivered delete can finish the job.

use std::future::Future;

use spillway_core::{ConfigSnapshot, EnvironmentConstants};
use spillway_services::ServiceError;

use super::{Collaborators, lookup_identifier};
use crate::context::Context;
use crate::error::{PipelineError, Result, Step};

pub(crate) async fn delete_pipeline(
    ctx: &Context,
    collaborators: &Collaborators,
    constants: &EnvironmentConstants,
    config: &ConfigSnapshot,
) -> Result<()> {
    let id = config.id.as_str();
    let table = constants.identifiers_table.as_str();
    let record = lookup_identifier(ctx, collaborators.identifiers.as_ref(), table, id).await?;

    // The queues still feed the consumer, so a consumer we could not remove
    // leaves them in place.
    let consumer = remove(
        ctx,
        Step::DeleteConsumer,
        id,
        collaborators.compute.delete_function(&record.consumer_name),
    )
    .await;
    match consumer {
        Ok(()) => {}
        Err(err) if err.is_canceled() => return Err(err),
        Err(err) => return Err(teardown(id, vec![err])),
    }

    let mut failures = Vec::new();
    for (step, url) in [
        (Step::DeleteQueue, &record.queue_url),
        (Step::DeleteDeadLetterQueue, &record.dead_letter_queue_url),
    ] {
        match remove(ctx, step, id, collaborators.queues.delete_queue(url)).await {
            Ok(()) => {}
            Err(err) if err.is_canceled() => return Err(err),
            Err(err) => failures.push(err),
        }
    }
    if !failures.is_empty() {
        return Err(teardown(id, failures));
    }

    ctx.call(
        Step::DeleteIdentifier,
        id,
        collaborators.identifiers.delete(table, id),
    )
    .await
}

/// Deletes one resource, treating an already missing resource as deleted
async fn remove<F>(ctx: &Context, step: Step, id: &str, fut: F) -> Result<()>
where
    F: Future<Output = std::result::Result<(), ServiceError>>,
{
    match ctx.call(step, id, fut).await {
        Err(PipelineError::Collaborator { source, .. }) if source.is_not_found() => {
            tracing::warn!(pipeline_id = %id, %step, "resource already gone: {}", source);
            Ok(())
        }
        other => other,
    }
}

fn teardown(id: &str, failures: Vec<PipelineError>) -> PipelineError {
    PipelineError::Teardown {
        id: id.to_string(),
        failures,
    }
}
