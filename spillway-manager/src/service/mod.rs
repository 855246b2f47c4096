//! Service layer
//!
//! Services contain the provisioning logic of the manager. They drive the
//! collaborator services in dependency order and report which step failed.
//!
//! - [`PipelineManager`]: add / update / delete state machine behind the
//!   middleware chain
//! - [`QueueInitializer`]: concurrent batch queue setup

mod adder;
mod manager;
mod queue_init;
mod queues;
mod remover;
mod updater;

pub use manager::PipelineManager;
pub use queue_init::QueueInitializer;

use std::sync::Arc;
use std::time::Duration;

use spillway_core::PipelineIdentifier;
use spillway_services::{ComputeService, IdentifierStore, QueueService};

use crate::context::Context;
use crate::error::{PipelineError, Result, Step};

/// The collaborator services, built once at startup and shared
#[derive(Clone)]
pub struct Collaborators {
    pub queues: Arc<dyn QueueService>,
    pub compute: Arc<dyn ComputeService>,
    pub identifiers: Arc<dyn IdentifierStore>,
}

/// Deployment settings of the pipeline manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Environment name embedded in every resource name
    pub env_name: String,
    /// How many times consumer readiness is checked
    pub readiness_attempts: u32,
    /// Pause between readiness checks
    pub readiness_interval: Duration,
}

impl ManagerSettings {
    pub fn new(env_name: impl Into<String>) -> Self {
        Self {
            env_name: env_name.into(),
            readiness_attempts: 20,
            readiness_interval: Duration::from_secs(1),
        }
    }

    pub fn queue_name(&self, id: &str) -> String {
        format!("{}-{}-queue", id, self.env_name)
    }

    pub fn consumer_name(&self, id: &str) -> String {
        format!("{}-{}-consumer", id, self.env_name)
    }
}

/// Reads the identifier record of an existing pipeline
async fn lookup_identifier(
    ctx: &Context,
    identifiers: &dyn IdentifierStore,
    table: &str,
    id: &str,
) -> Result<PipelineIdentifier> {
    ctx.call(Step::GetIdentifier, id, identifiers.get(table, id))
        .await?
        .ok_or_else(|| PipelineError::NotFound {
            id: id.to_string(),
            table: table.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_names() {
        let settings = ManagerSettings::new("dev");

        assert_eq!(settings.queue_name("p1"), "p1-dev-queue");
        assert_eq!(settings.consumer_name("p1"), "p1-dev-consumer");
        assert_eq!(settings.readiness_attempts, 20);
        assert_eq!(settings.readiness_interval, Duration::from_secs(1));
    }
}
