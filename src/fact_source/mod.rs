// Inner modules
mod errors;
mod kafka;
mod stream;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::kafka_types::{
    Broker, CommittedOffset, GroupDescription, StartOffset, TopicDetail,
};

// Exports
pub use errors::{is_transport_failure, FactSourceError, FactSourceResult};
pub use kafka::KafkaFactSource;
pub use stream::{RecordStream, StreamEvent};

/// Everything the service needs to know about a Kafka cluster, one remote query at a time.
///
/// Implementations are expected to be cheap to share across tasks (`Arc<dyn ClusterFactSource>`):
/// every method can be called concurrently.
/// No method retries: failures are reported as they happen, and the caller decides
/// if a failure is fatal to what it's doing, or just a gap in the data.
#[async_trait]
pub trait ClusterFactSource: Send + Sync {
    /// All the Brokers constituting the cluster.
    async fn list_brokers(&self) -> FactSourceResult<Vec<Broker>>;

    /// All the Topics in the cluster.
    async fn list_topics(&self) -> FactSourceResult<Vec<TopicDetail>>;

    /// Value of a Topic configuration entry, `None` if not set.
    async fn get_topic_config(&self, topic: &str, key: &str) -> FactSourceResult<Option<String>>;

    /// Partition identifiers of a Topic.
    async fn get_partitions(&self, topic: &str) -> FactSourceResult<Vec<i32>>;

    /// Brokers holding a replica of the Topic Partition.
    async fn get_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>>;

    /// Brokers whose replica of the Topic Partition is in sync with the leader.
    async fn get_in_sync_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>>;

    /// Broker leading the Topic Partition.
    async fn get_leader(&self, topic: &str, partition: i32) -> FactSourceResult<i32>;

    /// Latest offset (end of the log) of the Topic Partition.
    async fn get_latest_offset(&self, topic: &str, partition: i32) -> FactSourceResult<i64>;

    /// Identifiers of all the Consumer Groups known to the cluster.
    async fn list_consumer_groups(&self) -> FactSourceResult<Vec<String>>;

    /// Describe the given Consumer Groups: state and members.
    async fn describe_consumer_groups(
        &self,
        groups: &[String],
    ) -> FactSourceResult<Vec<GroupDescription>>;

    /// Broker acting as coordinator of the Consumer Group.
    async fn get_group_coordinator(&self, group: &str) -> FactSourceResult<i32>;

    /// Offset committed by the Consumer Group for the Topic Partition.
    async fn get_committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> FactSourceResult<CommittedOffset>;

    /// Open a stream of records of `topic`, consumed as member of Consumer Group `group`.
    ///
    /// Partition assignment and rebalancing are handled by the cluster group protocol.
    /// The returned stream commits progress via [`RecordStream::commit`].
    async fn open_group_stream(&self, topic: &str, group: &str) -> FactSourceResult<RecordStream>;

    /// Open a stream of records of a single Topic Partition, starting at `start`.
    async fn open_partition_stream(
        &self,
        topic: &str,
        partition: i32,
        start: StartOffset,
    ) -> FactSourceResult<RecordStream>;
}
