//! Add path
//!
//! Provisions a new pipeline: queue pair, consumer, concurrency, queue
//! binding, then the identifier record. Each step feeds the next and a
//! failure stops the sequence, leaving earlier resources in place.

use spillway_core::{ConfigSnapshot, EnvironmentConstants, FunctionIdentifier, PipelineIdentifier};
use spillway_services::{ArtifactLocation, ComputeService, FunctionSpec, FunctionState};

use super::queues::create_queue_pair;
use super::{Collaborators, ManagerSettings};
use crate::context::Context;
use crate::error::{PipelineError, Result, Step};

/// Messages handed to the consumer per invocation
pub const CONSUMER_BATCH_SIZE: u32 = 1;

/// Settings every add instruction must carry
struct AddSettings {
    visibility_timeout_seconds: u32,
    function_timeout_seconds: u32,
    concurrency_limit: u32,
}

pub(crate) async fn add_pipeline(
    ctx: &Context,
    collaborators: &Collaborators,
    settings: &ManagerSettings,
    constants: &EnvironmentConstants,
    config: &ConfigSnapshot,
) -> Result<()> {
    let id = config.id.as_str();
    let required = validate(config)?;

    let queues = create_queue_pair(
        ctx,
        collaborators.queues.as_ref(),
        id,
        &settings.queue_name(id),
        Some(required.visibility_timeout_seconds),
    )
    .await?;

    let spec = FunctionSpec {
        name: settings.consumer_name(id),
        artifact: ArtifactLocation {
            bucket: constants.consumer_bucket.clone(),
            key: constants.consumer_key.clone(),
        },
        role_arn: constants.consumer_role_arn.clone(),
        timeout_seconds: required.function_timeout_seconds,
    };
    let compute = collaborators.compute.as_ref();
    let consumer = ctx
        .call(Step::CreateConsumer, id, compute.create_function(&spec))
        .await?;

    wait_until_active(ctx, compute, settings, id, &consumer).await?;

    ctx.call(
        Step::SetConsumerConcurrency,
        id,
        compute.set_concurrency(&consumer.name, required.concurrency_limit),
    )
    .await?;

    ctx.call(
        Step::BindQueue,
        id,
        compute.bind_event_source(
            &consumer.name,
            &queues.primary.arn,
            CONSUMER_BATCH_SIZE,
            true,
        ),
    )
    .await?;

    let record = PipelineIdentifier::new(id, &queues, &consumer);
    ctx.call(
        Step::PutIdentifier,
        id,
        collaborators
            .identifiers
            .put(&constants.identifiers_table, &record),
    )
    .await?;

    tracing::debug!(pipeline_id = %id, consumer = %consumer.name, "pipeline provisioned");
    Ok(())
}

/// Polls the consumer until it is active
///
/// Gives up after the configured number of checks, or immediately when the
/// consumer reports `Failed` since it will never recover on its own.
async fn wait_until_active(
    ctx: &Context,
    compute: &dyn ComputeService,
    settings: &ManagerSettings,
    id: &str,
    consumer: &FunctionIdentifier,
) -> Result<()> {
    let mut attempts = 0;
    let mut state = FunctionState::Pending;

    while attempts < settings.readiness_attempts {
        if attempts > 0 {
            ctx.sleep(Step::PollConsumerState, id, settings.readiness_interval)
                .await?;
        }
        attempts += 1;

        state = ctx
            .call(
                Step::PollConsumerState,
                id,
                compute.get_function_state(&consumer.name),
            )
            .await?;

        match state {
            FunctionState::Active => return Ok(()),
            FunctionState::Failed => break,
            FunctionState::Pending | FunctionState::Inactive => {
                tracing::debug!(pipeline_id = %id, %state, attempt = attempts, "consumer not ready");
            }
        }
    }

    Err(PipelineError::ResourceNotReady {
        id: id.to_string(),
        name: consumer.name.clone(),
        state,
        attempts,
    })
}

// =============================================================================
// Validation
// =============================================================================

fn validate(config: &ConfigSnapshot) -> Result<AddSettings> {
    let missing = |field| PipelineError::Validation {
        id: config.id.clone(),
        field,
    };

    Ok(AddSettings {
        visibility_timeout_seconds: config
            .queue_visibility_timeout_seconds
            .ok_or_else(|| missing("queue_visibility_timeout_seconds"))?,
        function_timeout_seconds: config
            .function_timeout_seconds
            .ok_or_else(|| missing("function_timeout_seconds"))?,
        concurrency_limit: config
            .concurrency_limit
            .ok_or_else(|| missing("concurrency_limit"))?,
    })
}
