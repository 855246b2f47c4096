//! Update path
//!
//! Applies only the settings present in the instruction to the live
//! resources named by the pipeline's identifier record.

use spillway_core::{ConfigSnapshot, EnvironmentConstants};
use spillway_services::ATTR_VISIBILITY_TIMEOUT;

use super::{Collaborators, lookup_identifier};
use crate::context::Context;
use crate::error::{Result, Step};

pub(crate) async fn update_pipeline(
    ctx: &Context,
    collaborators: &Collaborators,
    constants: &EnvironmentConstants,
    config: &ConfigSnapshot,
) -> Result<()> {
    let id = config.id.as_str();
    let record = lookup_identifier(
        ctx,
        collaborators.identifiers.as_ref(),
        &constants.identifiers_table,
        id,
    )
    .await?;

    if config.has_no_settings() {
        tracing::debug!(pipeline_id = %id, "no settings changed");
        return Ok(());
    }

    let compute = collaborators.compute.as_ref();
    if let Some(limit) = config.concurrency_limit {
        ctx.call(
            Step::UpdateConsumerConcurrency,
            id,
            compute.set_concurrency(&record.consumer_name, limit),
        )
        .await?;
    }

    if let Some(timeout) = config.function_timeout_seconds {
        ctx.call(
            Step::UpdateConsumerTimeout,
            id,
            compute.set_timeout(&record.consumer_name, timeout),
        )
        .await?;
    }

    if let Some(timeout) = config.queue_visibility_timeout_seconds {
        ctx.call(
            Step::UpdateQueueVisibility,
            id,
            collaborators.queues.set_queue_attribute(
                &record.queue_url,
                ATTR_VISIBILITY_TIMEOUT,
                &timeout.to_string(),
            ),
        )
        .await?;
    }

    Ok(())
}
