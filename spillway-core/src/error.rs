//! Error types for decoding and instruction building

use std::fmt;
use thiserror::Error;

/// Errors raised while decoding an attribute snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing required attribute `{field}`")]
    MissingField { field: &'static str },

    #[error("attribute `{field}` must be {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("attribute `{field}` is not a valid integer: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("attribute `{field}` must be a positive integer, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("attribute `{field}` must not be empty")]
    Empty { field: &'static str },
}

/// Which image of a change record failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Before,
    After,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Snapshot::Before => f.write_str("before"),
            Snapshot::After => f.write_str("after"),
        }
    }
}

/// Errors raised while turning a change record into an instruction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("failed to decode {snapshot} snapshot: {source}")]
    Decode {
        snapshot: Snapshot,
        #[source]
        source: DecodeError,
    },

    #[error("unknown instruction operation: change has neither a before nor an after snapshot")]
    UnknownOperation,
}
