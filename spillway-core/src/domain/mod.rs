//! Core domain types
//!
//! These types flow between the change intake, the pipeline manager and the
//! collaborator services. Snapshots and instructions are ephemeral; the
//! pipeline identifier is the only record that outlives a single change.

pub mod config;
pub mod identifier;
pub mod instruction;
