//! Instructions and the instruction builder
//!
//! An instruction tells the pipeline manager what to do with one pipeline.
//! It is derived from a single change record and consumed once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::decode::decode_config;
use crate::domain::config::ConfigSnapshot;
use crate::dto::change::{AttributeMap, ChangeRecord};
use crate::error::{InstructionError, Snapshot};

/// What the pipeline manager should do with a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Add => f.write_str("add"),
            Operation::Update => f.write_str("update"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// Deployment-wide parameters shared by every instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConstants {
    /// Bucket holding the consumer artifact
    pub consumer_bucket: String,
    /// Object key of the consumer artifact
    pub consumer_key: String,
    /// Execution role assumed by every consumer
    pub consumer_role_arn: String,
    /// Table holding pipeline identifier records
    pub identifiers_table: String,
}

/// The unit of work handed to the pipeline manager
///
/// For `Add` the config is the full snapshot, for `Update` it carries only
/// the fields that changed, and for `Delete` only the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub operation: Operation,
    pub config: ConfigSnapshot,
    pub constants: Arc<EnvironmentConstants>,
}

impl Instruction {
    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// Builds instructions from change records
///
/// The constants are injected once at construction and shared by every
/// instruction the builder produces.
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    constants: Arc<EnvironmentConstants>,
}

impl InstructionBuilder {
    pub fn new(constants: EnvironmentConstants) -> Self {
        Self {
            constants: Arc::new(constants),
        }
    }

    pub fn constants(&self) -> &Arc<EnvironmentConstants> {
        &self.constants
    }

    /// Classifies the change and derives its instruction
    pub fn build(&self, record: &ChangeRecord) -> Result<Instruction, InstructionError> {
        let (operation, config) = derive_change(record.before(), record.after())?;

        Ok(Instruction {
            operation,
            config,
            constants: Arc::clone(&self.constants),
        })
    }
}

/// Classifies a before/after pair and computes the snapshot to carry
///
/// - only `after` present: `Add` with the full `after` snapshot
/// - both present: `Update` with the changed fields of `after`
/// - only `before` present: `Delete` with the id of `before`
/// - neither present: [`InstructionError::UnknownOperation`]
pub fn derive_change(
    before: Option<&AttributeMap>,
    after: Option<&AttributeMap>,
) -> Result<(Operation, ConfigSnapshot), InstructionError> {
    match (before, after) {
        (None, Some(after)) => Ok((Operation::Add, decode(after, Snapshot::After)?)),
        (Some(before), Some(after)) => {
            let after = decode(after, Snapshot::After)?;
            let before = decode(before, Snapshot::Before)?;
            Ok((Operation::Update, ConfigSnapshot::delta(&before, &after)))
        }
        (Some(before), None) => Ok((
            Operation::Delete,
            decode(before, Snapshot::Before)?.id_only(),
        )),
        (None, None) => Err(InstructionError::UnknownOperation),
    }
}

fn decode(map: &AttributeMap, snapshot: Snapshot) -> Result<ConfigSnapshot, InstructionError> {
    decode_config(map).map_err(|source| InstructionError::Decode { snapshot, source })
}
