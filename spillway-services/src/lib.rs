//! Spillway Services
//!
//! Capability interfaces for the external systems a pipeline is built from,
//! and in-memory implementations of each.
//!
//! - [`QueueService`]: primary and dead-letter queues
//! - [`ComputeService`]: the consumer function attached to a queue
//! - [`IdentifierStore`]: durable pipeline identifier records
//! - [`ConfigSource`]: listing of known configuration ids
//!
//! The in-memory implementations share a [`Simulation`] so that calls made
//! across services land in one ordered [`Journal`], and so failures and
//! latency can be injected per operation.
//!
//! # Example
//!
//! ```
//! use spillway_services::{InMemoryQueueService, QueueAttributes, QueueService, Simulation};
//!
//! # async fn example() -> spillway_services::Result<()> {
//! let simulation = Simulation::new();
//! let queues = InMemoryQueueService::new(simulation.clone());
//! let ident = queues.create_queue("jobs", &QueueAttributes::new()).await?;
//! assert!(simulation.journal().contains("queue.create:jobs"));
//! # let _ = ident;
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod error;
pub mod functions;
pub mod identifiers;
pub mod queues;
pub mod simulation;

pub use configs::{ConfigSource, StaticConfigSource};
pub use error::{Result, ServiceError};
pub use functions::{
    ArtifactLocation, ComputeService, EventSourceBinding, FunctionSpec, FunctionState,
    InMemoryComputeService,
};
pub use identifiers::{IdentifierStore, InMemoryIdentifierStore};
pub use queues::{
    ATTR_QUEUE_ARN, ATTR_REDRIVE_POLICY, ATTR_VISIBILITY_TIMEOUT, InMemoryQueueService,
    QueueAttributes, QueueService, RedrivePolicy,
};
pub use simulation::{Journal, Simulation};
