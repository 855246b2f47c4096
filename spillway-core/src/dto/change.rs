//! Change-stream DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single typed attribute value, e.g. `{"S": "p1"}` or `{"N": "5"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    /// Numbers travel as strings
    #[serde(rename = "N")]
    N(String),
    /// Base64-encoded bytes
    #[serde(rename = "B")]
    B(String),
    #[serde(rename = "SS")]
    StringSet(Vec<String>),
    #[serde(rename = "NS")]
    NumberSet(Vec<String>),
    #[serde(rename = "BS")]
    BinarySet(Vec<String>),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "M")]
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Short type tag used in decode errors
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "string",
            AttributeValue::N(_) => "number",
            AttributeValue::B(_) => "binary",
            AttributeValue::StringSet(_) => "string set",
            AttributeValue::NumberSet(_) => "number set",
            AttributeValue::BinarySet(_) => "binary set",
            AttributeValue::Bool(_) => "bool",
            AttributeValue::Null(_) => "null",
            AttributeValue::L(_) => "list",
            AttributeValue::M(_) => "map",
        }
    }
}

/// A full attribute snapshot of one stored item
pub type AttributeMap = HashMap<String, AttributeValue>;

/// The before/after images of one stored item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<AttributeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<AttributeMap>,
}

/// One change notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "eventID", default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(rename = "eventName", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(rename = "dynamodb", default)]
    pub change: StreamChange,
}

impl ChangeRecord {
    /// Creates a record from raw before/after images
    pub fn new(before: Option<AttributeMap>, after: Option<AttributeMap>) -> Self {
        Self {
            event_id: None,
            event_name: None,
            change: StreamChange {
                old_image: before,
                new_image: after,
            },
        }
    }

    pub fn before(&self) -> Option<&AttributeMap> {
        self.change.old_image.as_ref()
    }

    pub fn after(&self) -> Option<&AttributeMap> {
        self.change.new_image.as_ref()
    }
}

/// A batch of change notifications as delivered by the trigger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<ChangeRecord>,
}
