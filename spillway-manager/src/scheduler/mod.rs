//! Scheduler layer for the manager
//!
//! Periodically lists every known configuration and makes sure each one has
//! its queue pair.

pub mod sweeper;

pub use sweeper::QueueSweeper;
