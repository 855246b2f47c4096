//! Compute service
//!
//! Capability interface for the serverless compute backend that hosts
//! pipeline consumers, plus an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spillway_core::FunctionIdentifier;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::simulation::Simulation;

/// Readiness state of a compute function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionState {
    Pending,
    Active,
    Inactive,
    Failed,
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FunctionState::Pending => "Pending",
            FunctionState::Active => "Active",
            FunctionState::Inactive => "Inactive",
            FunctionState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Where the deployable artifact of a function lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

/// Everything needed to create a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub artifact: ArtifactLocation,
    pub role_arn: String,
    pub timeout_seconds: u32,
}

/// An event source feeding a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceBinding {
    pub source_arn: String,
    pub batch_size: u32,
    pub enabled: bool,
}

/// Repository trait for compute function operations
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Creates a function; it may not be active yet when this returns
    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionIdentifier>;

    async fn get_function_state(&self, name: &str) -> Result<FunctionState>;

    /// Sets the reserved concurrency of a function
    async fn set_concurrency(&self, name: &str, limit: u32) -> Result<()>;

    /// Sets the execution timeout of a function
    async fn set_timeout(&self, name: &str, timeout_seconds: u32) -> Result<()>;

    /// Feeds messages from `source_arn` into the function
    async fn bind_event_source(
        &self,
        name: &str,
        source_arn: &str,
        batch_size: u32,
        enabled: bool,
    ) -> Result<()>;

    async fn delete_function(&self, name: &str) -> Result<()>;
}

/// Live state of one in-memory function
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub spec: FunctionSpec,
    pub arn: String,
    pub concurrency: Option<u32>,
    pub bindings: Vec<EventSourceBinding>,
    pending_polls: u32,
}

/// In-memory implementation of ComputeService
///
/// New functions report `Pending` for a configurable number of state polls
/// before settling, on `Active` unless configured otherwise.
///
/// Journal operations: `function.create:<name>`,
/// `function.state:<name>`, `function.concurrency:<name>`,
/// `function.timeout:<name>`, `function.bind:<name>`, `function.delete:<name>`.
pub struct InMemoryComputeService {
    functions: Mutex<HashMap<String, FunctionRecord>>,
    activation_polls: u32,
    settled_state: FunctionState,
    simulation: Simulation,
}

impl InMemoryComputeService {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            functions: Mutex::new(HashMap::new()),
            activation_polls: 0,
            settled_state: FunctionState::Active,
            simulation,
        }
    }

    /// Functions stay `Pending` for `polls` state reads after creation
    pub fn with_activation_polls(mut self, polls: u32) -> Self {
        self.activation_polls = polls;
        self
    }

    /// State reported once the pending polls are used up, `Active` by default
    pub fn with_settled_state(mut self, state: FunctionState) -> Self {
        self.settled_state = state;
        self
    }

    pub fn arn_for(name: &str) -> String {
        format!("arn:local:function:{name}")
    }

    pub fn function(&self, name: &str) -> Option<FunctionRecord> {
        self.functions.lock().unwrap().get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    fn with_function<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut FunctionRecord) -> T,
    ) -> Result<T> {
        let mut functions = self.functions.lock().unwrap();
        let record = functions
            .get_mut(name)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        Ok(f(record))
    }
}

#[async_trait]
impl ComputeService for InMemoryComputeService {
    async fn create_function(&self, spec: &FunctionSpec) -> Result<FunctionIdentifier> {
        self.simulation.call("function.create", &spec.name).await?;

        if spec.timeout_seconds == 0 {
            return Err(ServiceError::InvalidRequest(
                "timeout must be at least one second".to_string(),
            ));
        }

        let mut functions = self.functions.lock().unwrap();
        if functions.contains_key(&spec.name) {
            return Err(ServiceError::AlreadyExists(spec.name.clone()));
        }

        let arn = Self::arn_for(&spec.name);
        functions.insert(
            spec.name.clone(),
            FunctionRecord {
                spec: spec.clone(),
                arn: arn.clone(),
                concurrency: None,
                bindings: Vec::new(),
                pending_polls: self.activation_polls,
            },
        );

        Ok(FunctionIdentifier {
            name: spec.name.clone(),
            arn,
        })
    }

    async fn get_function_state(&self, name: &str) -> Result<FunctionState> {
        self.simulation.call("function.state", name).await?;

        let settled = self.settled_state;
        self.with_function(name, |record| {
            if record.pending_polls == 0 {
                settled
            } else {
                record.pending_polls -= 1;
                FunctionState::Pending
            }
        })
    }

    async fn set_concurrency(&self, name: &str, limit: u32) -> Result<()> {
        self.simulation.call("function.concurrency", name).await?;
        self.with_function(name, |record| record.concurrency = Some(limit))
    }

    async fn set_timeout(&self, name: &str, timeout_seconds: u32) -> Result<()> {
        self.simulation.call("function.timeout", name).await?;

        if timeout_seconds == 0 {
            return Err(ServiceError::InvalidRequest(
                "timeout must be at least one second".to_string(),
            ));
        }
        self.with_function(name, |record| record.spec.timeout_seconds = timeout_seconds)
    }

    async fn bind_event_source(
        &self,
        name: &str,
        source_arn: &str,
        batch_size: u32,
        enabled: bool,
    ) -> Result<()> {
        self.simulation.call("function.bind", name).await?;

        self.with_function(name, |record| {
            record.bindings.push(EventSourceBinding {
                source_arn: source_arn.to_string(),
                batch_size,
                enabled,
            })
        })
    }

    async fn delete_function(&self, name: &str) -> Result<()> {
        self.simulation.call("function.delete", name).await?;

        self.functions
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }
}
