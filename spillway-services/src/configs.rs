//! Configuration listing source

use async_trait::async_trait;

use crate::error::Result;

/// Lists the ids of every known pipeline configuration
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn list_ids(&self) -> Result<Vec<String>>;
}

/// A fixed list of configuration ids
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    ids: Vec<String>,
}

impl StaticConfigSource {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    /// Parses a comma-separated id list, skipping blanks and duplicates
    pub fn from_csv(csv: &str) -> Self {
        let mut ids: Vec<String> = Vec::new();
        for id in csv.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        Self { ids }
    }
}

#[async_trait]
impl ConfigSource for StaticConfigSource {
    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.ids.clone())
    }
}
