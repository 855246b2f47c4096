//! Spillway Core
//!
//! Core types and pure transforms for the Spillway pipeline manager.
//!
//! This crate contains:
//! - Domain types: configuration snapshots, instructions, pipeline identifiers
//! - DTOs: the change-event wire shape delivered by the configuration store
//! - Decoding: attribute maps to typed snapshots
//! - Instruction building: change records to Add/Update/Delete instructions

pub mod decode;
pub mod domain;
pub mod dto;
pub mod error;

pub use decode::decode_config;
pub use domain::config::ConfigSnapshot;
pub use domain::identifier::{FunctionIdentifier, PipelineIdentifier, QueueIdentifier, QueuePair};
pub use domain::instruction::{
    EnvironmentConstants, Instruction, InstructionBuilder, Operation, derive_change,
};
pub use error::{DecodeError, InstructionError, Snapshot};
