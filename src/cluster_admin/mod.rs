// Inner modules
mod errors;
mod kafka;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Exports
pub use errors::{AdminError, AdminResult};
pub use kafka::KafkaClusterAdmin;

/// Topic to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl NewTopic {
    /// Reject requests the cluster would refuse anyway.
    pub fn validate(&self) -> AdminResult<()> {
        if self.name.trim().is_empty() {
            return Err(AdminError::InvalidRequest("Topic 'name' is required".to_string()));
        }
        if self.partitions < 1 {
            return Err(AdminError::InvalidRequest(format!(
                "Topic '{}' needs at least 1 partition",
                self.name
            )));
        }
        if self.replication_factor < 1 {
            return Err(AdminError::InvalidRequest(format!(
                "Topic '{}' needs a replication factor of at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Record to produce. Without `partition`, the producer partitioner picks one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutgoingRecord {
    pub key: Option<String>,
    pub value: String,
    pub partition: Option<i32>,
}

/// Where a produced record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducedRecord {
    pub partition: i32,
    pub offset: i64,
}

/// Changes to the cluster: Topics lifecycle, and records production.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()>;

    async fn delete_topic(&self, name: &str) -> AdminResult<()>;

    /// Produce a record, returning once the cluster acknowledged it.
    async fn produce(&self, topic: &str, record: &OutgoingRecord) -> AdminResult<ProducedRecord>;
}
