//! Pipeline manager error taxonomy

use std::fmt;

use spillway_core::{InstructionError, Operation};
use spillway_services::{FunctionState, ServiceError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single collaborator step, named by its purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateDeadLetterQueue,
    CreateQueue,
    CreateConsumer,
    PollConsumerState,
    SetConsumerConcurrency,
    BindQueue,
    PutIdentifier,
    GetIdentifier,
    UpdateConsumerConcurrency,
    UpdateConsumerTimeout,
    UpdateQueueVisibility,
    DeleteConsumer,
    DeleteQueue,
    DeleteDeadLetterQueue,
    DeleteIdentifier,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::CreateDeadLetterQueue => "create dead-letter queue",
            Step::CreateQueue => "create queue",
            Step::CreateConsumer => "create consumer",
            Step::PollConsumerState => "poll consumer state",
            Step::SetConsumerConcurrency => "set consumer concurrency",
            Step::BindQueue => "bind consumer to queue",
            Step::PutIdentifier => "put pipeline identifier",
            Step::GetIdentifier => "get pipeline identifier",
            Step::UpdateConsumerConcurrency => "update consumer concurrency",
            Step::UpdateConsumerTimeout => "update consumer timeout",
            Step::UpdateQueueVisibility => "update queue visibility timeout",
            Step::DeleteConsumer => "delete consumer",
            Step::DeleteQueue => "delete queue",
            Step::DeleteDeadLetterQueue => "delete dead-letter queue",
            Step::DeleteIdentifier => "delete pipeline identifier",
        };
        f.write_str(s)
    }
}

/// Why a request stopped before finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Canceled => f.write_str("request canceled"),
            CancelReason::DeadlineExceeded => f.write_str("request deadline exceeded"),
        }
    }
}

/// Errors surfaced while handling an instruction
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The change record could not be turned into an instruction
    #[error(transparent)]
    Instruction(#[from] InstructionError),

    /// An add instruction is missing a required setting
    #[error("invalid add config for pipeline {id}: missing {field}")]
    Validation { id: String, field: &'static str },

    /// The consumer never became active
    #[error("consumer {name} for pipeline {id} is {state} after {attempts} readiness checks")]
    ResourceNotReady {
        id: String,
        name: String,
        state: FunctionState,
        attempts: u32,
    },

    /// Update or delete referenced a pipeline with no identifier record
    #[error("no identifier for pipeline {id} in table {table}")]
    NotFound { id: String, table: String },

    /// A collaborator call failed
    #[error("failed to {step} for pipeline {id}: {source}")]
    Collaborator {
        step: Step,
        id: String,
        #[source]
        source: ServiceError,
    },

    /// The request context was canceled or ran out of time
    #[error("{reason} during {step} for pipeline {id}")]
    Canceled {
        step: Step,
        id: String,
        reason: CancelReason,
    },

    /// One or more resource deletions failed; each failure is kept
    #[error("failed to tear down pipeline {id}: {}", join_errors(.failures))]
    Teardown {
        id: String,
        failures: Vec<PipelineError>,
    },

    /// Added by the logging middleware around any handler failure
    #[error("handling instruction for pipeline {id}: {source}")]
    Handling {
        id: String,
        operation: Operation,
        #[source]
        source: Box<PipelineError>,
    },

    /// A panic raised by the handler, contained by the panic middleware
    #[error("panic occurred: {message}")]
    PanicRecovered { message: String, backtrace: String },
}

impl PipelineError {
    /// Strips `Handling` wrappers
    pub fn innermost(&self) -> &PipelineError {
        match self {
            PipelineError::Handling { source, .. } => source.innermost(),
            other => other,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.innermost(), PipelineError::Canceled { .. })
    }

    #[allow(dead_code)]
    pub fn is_not_found(&self) -> bool {
        matches!(self.innermost(), PipelineError::NotFound { .. })
    }
}

fn join_errors(errors: &[PipelineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One configuration whose queues could not be created
#[derive(Debug, Error)]
#[error("config {id} (queue {queue_name}): {source}")]
pub struct QueueCreationFailure {
    pub id: String,
    pub queue_name: String,
    #[source]
    pub source: PipelineError,
}

/// Every per-configuration failure of one batch queue setup
#[derive(Debug, Error)]
#[error("queue creation failed for {} of {attempted} configurations: {}", .failures.len(), join_failures(.failures))]
pub struct BatchAggregateError {
    pub attempted: usize,
    pub failures: Vec<QueueCreationFailure>,
}

impl BatchAggregateError {
    /// Ids of the failed configurations, in the order failures arrived
    pub fn failed_ids(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.id.as_str()).collect()
    }
}

fn join_failures(failures: &[QueueCreationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_names_step_and_pipeline() {
        let err = PipelineError::Collaborator {
            step: Step::CreateDeadLetterQueue,
            id: "p1".to_string(),
            source: ServiceError::Unavailable("boom".to_string()),
        };

        assert_eq!(
            err.to_string(),
            "failed to create dead-letter queue for pipeline p1: service unavailable: boom"
        );
    }

    #[test]
    fn test_innermost_unwraps_handling() {
        let err = PipelineError::Handling {
            id: "p1".to_string(),
            operation: Operation::Delete,
            source: Box::new(PipelineError::NotFound {
                id: "p1".to_string(),
                table: "idents".to_string(),
            }),
        };

        assert!(err.is_not_found());
        assert!(
            err.to_string()
                .starts_with("handling instruction for pipeline p1: no identifier")
        );
    }

    #[test]
    fn test_teardown_lists_every_failure() {
        let err = PipelineError::Teardown {
            id: "p1".to_string(),
            failures: vec![
                PipelineError::Collaborator {
                    step: Step::DeleteQueue,
                    id: "p1".to_string(),
                    source: ServiceError::Unavailable("a".to_string()),
                },
                PipelineError::Collaborator {
                    step: Step::DeleteDeadLetterQueue,
                    id: "p1".to_string(),
                    source: ServiceError::Unavailable("b".to_string()),
                },
            ],
        };

        let message = err.to_string();
        assert!(message.contains("failed to delete queue for pipeline p1"));
        assert!(message.contains("failed to delete dead-letter queue for pipeline p1"));
    }
}
