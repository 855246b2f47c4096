//! Shared behaviour of the in-memory services
//!
//! Every in-memory service records its calls in a [`Journal`] shared across
//! services, so tests can assert the global call order. Failures and latency
//! can be injected per operation and target.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, ServiceError};

/// Ordered log of collaborator calls, e.g. `queue.create:p1-dev-queue`
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Snapshot of all entries in call order
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Index of the first entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .position(|entry| entry.starts_with(prefix))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Journal, injected failures and latency shared by a set of services
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    journal: Journal,
    failures: Arc<Mutex<HashSet<(String, String)>>>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl Simulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Makes every future `op` call against `target` fail
    pub fn fail(&self, op: &str, target: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((op.to_string(), target.to_string()));
    }

    /// Removes a previously injected failure
    pub fn heal(&self, op: &str, target: &str) {
        self.failures
            .lock()
            .unwrap()
            .remove(&(op.to_string(), target.to_string()));
    }

    /// Delays every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Records the call, applies latency, then applies any injected failure
    pub(crate) async fn call(&self, op: &str, target: &str) -> Result<()> {
        self.journal.record(format!("{op}:{target}"));

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .failures
            .lock()
            .unwrap()
            .contains(&(op.to_string(), target.to_string()));
        if injected {
            return Err(ServiceError::Unavailable(format!(
                "injected failure for {op} on {target}"
            )));
        }

        Ok(())
    }
}
