//! In-memory [`ClusterAdmin`]: Topics are a list of partition end offsets.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};

use super::{AdminError, AdminResult, ClusterAdmin, NewTopic, OutgoingRecord, ProducedRecord};

#[derive(Default)]
pub struct MockClusterAdmin {
    topics: Mutex<BTreeMap<String, Vec<i64>>>,
    unreachable: bool,
}

impl MockClusterAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic(self, name: &str, partitions: usize) -> Self {
        self.topics.lock().unwrap().insert(name.to_string(), vec![0; partitions]);
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// End offset of each partition of the Topic, if it exists.
    pub fn end_offsets(&self, name: &str) -> Option<Vec<i64>> {
        self.topics.lock().unwrap().get(name).cloned()
    }

    fn check_reachable(&self) -> AdminResult<()> {
        if self.unreachable {
            Err(AdminError::Kafka(KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterAdmin for MockClusterAdmin {
    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()> {
        self.check_reachable()?;
        let mut guard = self.topics.lock().unwrap();
        if guard.contains_key(&topic.name) {
            return Err(AdminError::TopicAlreadyExists(topic.name.clone()));
        }
        guard.insert(topic.name.clone(), vec![0; topic.partitions as usize]);
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        self.check_reachable()?;
        match self.topics.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(AdminError::TopicNotFound(name.to_string())),
        }
    }

    async fn produce(&self, topic: &str, record: &OutgoingRecord) -> AdminResult<ProducedRecord> {
        self.check_reachable()?;
        let mut guard = self.topics.lock().unwrap();
        let partitions = guard.get_mut(topic).ok_or_else(|| AdminError::TopicNotFound(topic.to_string()))?;

        let partition = record.partition.unwrap_or_default();
        let end = partitions
            .get_mut(partition as usize)
            .ok_or_else(|| AdminError::TopicOperation(topic.to_string(), RDKafkaErrorCode::UnknownPartition))?;

        let offset = *end;
        *end += 1;
        Ok(ProducedRecord {
            partition,
            offset,
        })
    }
}
