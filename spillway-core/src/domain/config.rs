//! Pipeline configuration snapshots

use serde::{Deserialize, Serialize};

/// One pipeline's configuration at a point in time.
///
/// Optional fields are `None` when unset, which is distinct from any
/// concrete value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_visibility_timeout_seconds: Option<u32>,
}

impl ConfigSnapshot {
    /// Creates a snapshot carrying only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_concurrency_limit(mut self, limit: u32) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn with_function_timeout(mut self, seconds: u32) -> Self {
        self.function_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.queue_visibility_timeout_seconds = Some(seconds);
        self
    }

    /// Builds the partial snapshot of fields that changed from `before` to `after`
    ///
    /// A field is carried only when `after` holds a value that differs from
    /// `before`. A field cleared in `after` is never carried. The id always
    /// comes from `after`.
    pub fn delta(before: &Self, after: &Self) -> Self {
        Self {
            id: after.id.clone(),
            concurrency_limit: changed(before.concurrency_limit, after.concurrency_limit),
            function_timeout_seconds: changed(
                before.function_timeout_seconds,
                after.function_timeout_seconds,
            ),
            queue_visibility_timeout_seconds: changed(
                before.queue_visibility_timeout_seconds,
                after.queue_visibility_timeout_seconds,
            ),
        }
    }

    /// Strips every field except the id
    pub fn id_only(&self) -> Self {
        Self::new(self.id.clone())
    }

    /// True when no optional field is set
    pub fn has_no_settings(&self) -> bool {
        self.concurrency_limit.is_none()
            && self.function_timeout_seconds.is_none()
            && self.queue_visibility_timeout_seconds.is_none()
    }
}

fn changed<T: PartialEq + Copy>(before: Option<T>, after: Option<T>) -> Option<T> {
    match after {
        Some(value) if before != Some(value) => Some(value),
        _ => None,
    }
}
