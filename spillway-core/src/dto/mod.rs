//! Data Transfer Objects
//!
//! Wire shapes delivered by the configuration store's change stream. They
//! are schema-less; `crate::decode` turns them into domain types.

pub mod change;
