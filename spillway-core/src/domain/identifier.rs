//! Provisioned resource identifiers

use serde::{Deserialize, Serialize};

/// URL and ARN of one provisioned queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueIdentifier {
    pub url: String,
    pub arn: String,
}

/// A primary queue and its dead-letter companion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePair {
    pub primary: QueueIdentifier,
    pub dead_letter: QueueIdentifier,
}

/// Name and ARN of a provisioned consumer function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionIdentifier {
    pub name: String,
    pub arn: String,
}

/// Durable record linking a pipeline id to its provisioned resources
///
/// The record exists if and only if the resources it names exist: it is
/// written after every resource is created and removed after every resource
/// is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineIdentifier {
    pub id: String,
    pub queue_url: String,
    pub queue_arn: String,
    pub dead_letter_queue_url: String,
    pub dead_letter_queue_arn: String,
    pub consumer_name: String,
    pub consumer_arn: String,
}

impl PipelineIdentifier {
    pub fn new(id: impl Into<String>, queues: &QueuePair, consumer: &FunctionIdentifier) -> Self {
        Self {
            id: id.into(),
            queue_url: queues.primary.url.clone(),
            queue_arn: queues.primary.arn.clone(),
            dead_letter_queue_url: queues.dead_letter.url.clone(),
            dead_letter_queue_arn: queues.dead_letter.arn.clone(),
            consumer_name: consumer.name.clone(),
            consumer_arn: consumer.arn.clone(),
        }
    }
}
