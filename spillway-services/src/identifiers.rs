//! Identifier record store

use async_trait::async_trait;
use spillway_core::PipelineIdentifier;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::simulation::Simulation;

/// Repository trait for pipeline identifier records
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    /// Writes the record, replacing any record with the same id
    async fn put(&self, table: &str, record: &PipelineIdentifier) -> Result<()>;

    /// Reads the record for `id`, `None` when absent
    async fn get(&self, table: &str, id: &str) -> Result<Option<PipelineIdentifier>>;

    async fn delete(&self, table: &str, id: &str) -> Result<()>;
}

/// In-memory implementation of IdentifierStore
///
/// Journal operations: `identifier.put:<id>`, `identifier.get:<id>`,
/// `identifier.delete:<id>`.
pub struct InMemoryIdentifierStore {
    records: Mutex<HashMap<(String, String), PipelineIdentifier>>,
    simulation: Simulation,
}

impl InMemoryIdentifierStore {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            simulation,
        }
    }

    /// Reads a record without touching the journal
    pub fn peek(&self, table: &str, id: &str) -> Option<PipelineIdentifier> {
        self.records
            .lock()
            .unwrap()
            .get(&(table.to_string(), id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdentifierStore for InMemoryIdentifierStore {
    async fn put(&self, table: &str, record: &PipelineIdentifier) -> Result<()> {
        self.simulation.call("identifier.put", &record.id).await?;

        if table.is_empty() {
            return Err(ServiceError::InvalidRequest("table name is empty".to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .insert((table.to_string(), record.id.clone()), record.clone());
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<PipelineIdentifier>> {
        self.simulation.call("identifier.get", id).await?;
        Ok(self.peek(table, id))
    }

    async fn delete(&self, table: &str, id: &str) -> Result<()> {
        self.simulation.call("identifier.delete", id).await?;

        self.records
            .lock()
            .unwrap()
            .remove(&(table.to_string(), id.to_string()));
        Ok(())
    }
}
