//! Error types for collaborator services

use thiserror::Error;

/// Result type alias for collaborator calls
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors returned by queue, compute and record-store services
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The named resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists
    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    /// The service refused the request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service could not be reached or failed internally
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
