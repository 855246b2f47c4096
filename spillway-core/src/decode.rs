//! Attribute snapshot decoding
//!
//! Each entity declares a field table naming its attributes, their kind and
//! whether they are required. Decoding walks the table, so a missing
//! required attribute fails closed and unknown attributes are ignored.

use std::collections::HashMap;

use crate::domain::config::ConfigSnapshot;
use crate::dto::change::{AttributeMap, AttributeValue};
use crate::error::DecodeError;

pub const FIELD_ID: &str = "id";
pub const FIELD_CONCURRENCY_LIMIT: &str = "concurrency_limit";
pub const FIELD_FUNCTION_TIMEOUT: &str = "function_timeout_secs";
pub const FIELD_VISIBILITY_TIMEOUT: &str = "queue_visibility_timeout_secs";

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// Non-empty string
    Text,
    /// Integer in `1..=u32::MAX`
    PositiveInt,
}

#[derive(Debug, Clone, Copy)]
struct Field {
    name: &'static str,
    kind: FieldKind,
    required: bool,
}

const CONFIG_FIELDS: &[Field] = &[
    Field {
        name: FIELD_ID,
        kind: FieldKind::Text,
        required: true,
    },
    Field {
        name: FIELD_CONCURRENCY_LIMIT,
        kind: FieldKind::PositiveInt,
        required: false,
    },
    Field {
        name: FIELD_FUNCTION_TIMEOUT,
        kind: FieldKind::PositiveInt,
        required: false,
    },
    Field {
        name: FIELD_VISIBILITY_TIMEOUT,
        kind: FieldKind::PositiveInt,
        required: false,
    },
];

#[derive(Debug, Clone, PartialEq)]
enum Decoded {
    Text(String),
    Int(u32),
}

/// Decoded values keyed by field name; absent and null fields are missing
struct Fields(HashMap<&'static str, Decoded>);

impl Fields {
    fn text(&mut self, name: &'static str) -> Result<String, DecodeError> {
        match self.0.remove(name) {
            Some(Decoded::Text(value)) => Ok(value),
            _ => Err(DecodeError::MissingField { field: name }),
        }
    }

    fn int(&mut self, name: &'static str) -> Option<u32> {
        match self.0.remove(name) {
            Some(Decoded::Int(value)) => Some(value),
            _ => None,
        }
    }
}

fn read_fields(map: &AttributeMap, table: &[Field]) -> Result<Fields, DecodeError> {
    let mut fields = HashMap::with_capacity(table.len());

    for field in table {
        let value = match map.get(field.name) {
            None | Some(AttributeValue::Null(_)) => {
                if field.required {
                    return Err(DecodeError::MissingField { field: field.name });
                }
                continue;
            }
            Some(value) => value,
        };

        let decoded = match field.kind {
            FieldKind::Text => Decoded::Text(decode_text(field.name, value)?),
            FieldKind::PositiveInt => Decoded::Int(decode_positive(field.name, value)?),
        };
        fields.insert(field.name, decoded);
    }

    Ok(Fields(fields))
}

fn decode_text(field: &'static str, value: &AttributeValue) -> Result<String, DecodeError> {
    match value {
        AttributeValue::S(s) if s.trim().is_empty() => Err(DecodeError::Empty { field }),
        AttributeValue::S(s) => Ok(s.clone()),
        other => Err(DecodeError::WrongType {
            field,
            expected: "string",
            found: other.kind(),
        }),
    }
}

fn decode_positive(field: &'static str, value: &AttributeValue) -> Result<u32, DecodeError> {
    let raw = match value {
        AttributeValue::N(raw) => raw,
        other => {
            return Err(DecodeError::WrongType {
                field,
                expected: "number",
                found: other.kind(),
            });
        }
    };

    let parsed = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| DecodeError::InvalidNumber {
            field,
            value: raw.clone(),
        })?;

    if parsed <= 0 {
        return Err(DecodeError::NotPositive {
            field,
            value: parsed,
        });
    }

    u32::try_from(parsed).map_err(|_| DecodeError::InvalidNumber {
        field,
        value: raw.clone(),
    })
}

/// Decodes one configuration snapshot from its attribute map
pub fn decode_config(map: &AttributeMap) -> Result<ConfigSnapshot, DecodeError> {
    let mut fields = read_fields(map, CONFIG_FIELDS)?;

    Ok(ConfigSnapshot {
        id: fields.text(FIELD_ID)?,
        concurrency_limit: fields.int(FIELD_CONCURRENCY_LIMIT),
        function_timeout_seconds: fields.int(FIELD_FUNCTION_TIMEOUT),
        queue_visibility_timeout_seconds: fields.int(FIELD_VISIBILITY_TIMEOUT),
    })
}
