//! Queue service
//!
//! Capability interface for the message-queue backend plus an in-memory
//! implementation used by the local runtime and tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spillway_core::QueueIdentifier;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{Result, ServiceError};
use crate::simulation::Simulation;

pub const ATTR_QUEUE_ARN: &str = "QueueArn";
pub const ATTR_REDRIVE_POLICY: &str = "RedrivePolicy";
pub const ATTR_VISIBILITY_TIMEOUT: &str = "VisibilityTimeout";

/// Queue attributes keyed by attribute name
pub type QueueAttributes = BTreeMap<String, String>;

/// Moves messages to a dead-letter queue after repeated failed receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
    pub dead_letter_target_arn: String,
}

impl RedrivePolicy {
    pub fn new(max_receive_count: u32, dead_letter_target_arn: impl Into<String>) -> Self {
        Self {
            max_receive_count,
            dead_letter_target_arn: dead_letter_target_arn.into(),
        }
    }

    /// Encodes the policy as the JSON attribute value
    pub fn to_attribute(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ServiceError::InvalidRequest(format!("unencodable redrive policy: {e}")))
    }
}

/// Repository trait for queue operations
#[async_trait]
pub trait QueueService: Send + Sync {
    /// Creates a queue and returns its URL and ARN
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueIdentifier>;

    /// Reads one attribute of the queue at `url`
    async fn get_queue_attribute(&self, url: &str, name: &str) -> Result<String>;

    /// Sets one attribute of the queue at `url`
    async fn set_queue_attribute(&self, url: &str, name: &str, value: &str) -> Result<()>;

    /// Deletes the queue at `url`
    async fn delete_queue(&self, url: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredQueue {
    name: String,
    attributes: QueueAttributes,
}

/// In-memory implementation of QueueService
///
/// Journal operations: `queue.create:<name>`, `queue.get_attribute:<url>`,
/// `queue.set_attribute:<url>`, `queue.delete:<url>`.
pub struct InMemoryQueueService {
    queues: Mutex<HashMap<String, StoredQueue>>,
    simulation: Simulation,
}

impl InMemoryQueueService {
    pub fn new(simulation: Simulation) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            simulation,
        }
    }

    pub fn url_for(name: &str) -> String {
        format!("https://queue.local/{name}")
    }

    pub fn arn_for(name: &str) -> String {
        format!("arn:local:queue:{name}")
    }

    /// Names of all live queues, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .queues
            .lock()
            .unwrap()
            .values()
            .map(|q| q.name.clone())
            .collect();
        names.sort();
        names
    }

    /// All attributes of the queue at `url`
    pub fn attributes(&self, url: &str) -> Option<QueueAttributes> {
        self.queues
            .lock()
            .unwrap()
            .get(url)
            .map(|q| q.attributes.clone())
    }
}

#[async_trait]
impl QueueService for InMemoryQueueService {
    async fn create_queue(
        &self,
        name: &str,
        attributes: &QueueAttributes,
    ) -> Result<QueueIdentifier> {
        self.simulation.call("queue.create", name).await?;

        if name.is_empty() {
            return Err(ServiceError::InvalidRequest("queue name is empty".to_string()));
        }

        let url = Self::url_for(name);
        let arn = Self::arn_for(name);
        let mut queues = self.queues.lock().unwrap();

        // Re-creating with identical attributes returns the existing queue
        if let Some(existing) = queues.get(&url) {
            let mut requested = attributes.clone();
            requested.insert(ATTR_QUEUE_ARN.to_string(), arn.clone());
            if existing.attributes != requested {
                return Err(ServiceError::AlreadyExists(name.to_string()));
            }
            return Ok(QueueIdentifier { url, arn });
        }

        let mut stored = attributes.clone();
        stored.insert(ATTR_QUEUE_ARN.to_string(), arn.clone());
        queues.insert(
            url.clone(),
            StoredQueue {
                name: name.to_string(),
                attributes: stored,
            },
        );
        tracing::debug!(queue = %name, "created in-memory queue");

        Ok(QueueIdentifier { url, arn })
    }

    async fn get_queue_attribute(&self, url: &str, name: &str) -> Result<String> {
        self.simulation.call("queue.get_attribute", url).await?;

        let queues = self.queues.lock().unwrap();
        let queue = queues
            .get(url)
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))?;
        queue
            .attributes
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("attribute {name} on {url}")))
    }

    async fn set_queue_attribute(&self, url: &str, name: &str, value: &str) -> Result<()> {
        self.simulation.call("queue.set_attribute", url).await?;

        if name == ATTR_QUEUE_ARN {
            return Err(ServiceError::InvalidRequest(format!(
                "attribute {name} is read-only"
            )));
        }

        let mut queues = self.queues.lock().unwrap();
        let queue = queues
            .get_mut(url)
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))?;
        queue.attributes.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_queue(&self, url: &str) -> Result<()> {
        self.simulation.call("queue.delete", url).await?;

        self.queues
            .lock()
            .unwrap()
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redrive_policy_encoding() {
        let policy = RedrivePolicy::new(2, "arn:local:queue:p1-dlq");
        assert_eq!(
            policy.to_attribute().unwrap(),
            r#"{"maxReceiveCount":2,"deadLetterTargetArn":"arn:local:queue:p1-dlq"}"#
        );
    }

    #[tokio::test]
    async fn test_create_and_read_attributes() {
        let service = InMemoryQueueService::new(Simulation::new());
        let mut attributes = QueueAttributes::new();
        attributes.insert(ATTR_VISIBILITY_TIMEOUT.to_string(), "30".to_string());

        let ident = service.create_queue("jobs", &attributes).await.unwrap();

        assert_eq!(ident.arn, "arn:local:queue:jobs");
        assert_eq!(
            service
                .get_queue_attribute(&ident.url, ATTR_QUEUE_ARN)
                .await
                .unwrap(),
            ident.arn
        );
        assert_eq!(
            service
                .get_queue_attribute(&ident.url, ATTR_VISIBILITY_TIMEOUT)
                .await
                .unwrap(),
            "30"
        );
    }

    #[tokio::test]
    async fn test_create_is_idempotent_for_same_attributes() {
        let service = InMemoryQueueService::new(Simulation::new());
        let attributes = QueueAttributes::new();

        let first = service.create_queue("jobs", &attributes).await.unwrap();
        let second = service.create_queue("jobs", &attributes).await.unwrap();
        assert_eq!(first, second);

        let mut changed = QueueAttributes::new();
        changed.insert(ATTR_VISIBILITY_TIMEOUT.to_string(), "5".to_string());
        let err = service.create_queue("jobs", &changed).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_set_and_delete() {
        let service = InMemoryQueueService::new(Simulation::new());
        let ident = service
            .create_queue("jobs", &QueueAttributes::new())
            .await
            .unwrap();

        service
            .set_queue_attribute(&ident.url, ATTR_VISIBILITY_TIMEOUT, "45")
            .await
            .unwrap();
        assert_eq!(
            service.attributes(&ident.url).unwrap()[ATTR_VISIBILITY_TIMEOUT],
            "45"
        );

        service.delete_queue(&ident.url).await.unwrap();
        assert!(service.queue_names().is_empty());
        assert!(
            service
                .delete_queue(&ident.url)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_queue_arn_is_read_only() {
        let service = InMemoryQueueService::new(Simulation::new());
        let ident = service
            .create_queue("jobs", &QueueAttributes::new())
            .await
            .unwrap();

        let err = service
            .set_queue_attribute(&ident.url, ATTR_QUEUE_ARN, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRequest(_)));
    }
}
