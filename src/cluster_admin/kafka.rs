use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, TopicReplication, TopicResult};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;

use super::errors::{AdminError, AdminResult};
use super::{ClusterAdmin, NewTopic, OutgoingRecord, ProducedRecord};

/// [`ClusterAdmin`] backed by the `librdkafka` Admin API and a [`FutureProducer`].
pub struct KafkaClusterAdmin {
    admin_client: AdminClient<DefaultClientContext>,
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaClusterAdmin {
    /// Create a new [`KafkaClusterAdmin`].
    ///
    /// # Arguments
    ///
    /// * `client_config` - Kafka client configuration, shared by the admin client and the producer
    /// * `timeout` - Upper bound to every operation, including record delivery
    pub fn new(client_config: &ClientConfig, timeout: Duration) -> AdminResult<Self> {
        Ok(Self {
            admin_client: client_config.create()?,
            producer: client_config.create()?,
            timeout,
        })
    }

    fn options(&self) -> AdminOptions {
        AdminOptions::new().request_timeout(Some(self.timeout)).operation_timeout(Some(self.timeout))
    }
}

fn single_topic_result(results: Vec<TopicResult>) -> AdminResult<()> {
    match results.into_iter().next() {
        Some(Ok(_)) | None => Ok(()),
        Some(Err((t, RDKafkaErrorCode::TopicAlreadyExists))) => Err(AdminError::TopicAlreadyExists(t)),
        Some(Err((t, RDKafkaErrorCode::UnknownTopicOrPartition))) => Err(AdminError::TopicNotFound(t)),
        Some(Err((t, code))) => Err(AdminError::TopicOperation(t, code)),
    }
}

#[async_trait]
impl ClusterAdmin for KafkaClusterAdmin {
    async fn create_topic(&self, topic: &NewTopic) -> AdminResult<()> {
        let new_topic = rdkafka::admin::NewTopic::new(
            &topic.name,
            topic.partitions,
            TopicReplication::Fixed(topic.replication_factor),
        );

        let results = self.admin_client.create_topics(&[new_topic], &self.options()).await?;
        single_topic_result(results)?;

        info!(
            "Created Topic '{}' ({} partitions, replication factor {})",
            topic.name, topic.partitions, topic.replication_factor
        );
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> AdminResult<()> {
        let results = self.admin_client.delete_topics(&[name], &self.options()).await?;
        single_topic_result(results)?;

        info!("Deleted Topic '{name}'");
        Ok(())
    }

    async fn produce(&self, topic: &str, record: &OutgoingRecord) -> AdminResult<ProducedRecord> {
        let mut future_record: FutureRecord<'_, str, str> =
            FutureRecord::to(topic).payload(record.value.as_str());
        if let Some(k) = record.key.as_deref() {
            future_record = future_record.key(k);
        }
        if let Some(p) = record.partition {
            future_record = future_record.partition(p);
        }

        match self.producer.send(future_record, self.timeout).await {
            Ok((partition, offset)) => {
                debug!("Produced record to '{topic}:{partition}' at offset {offset}");
                Ok(ProducedRecord {
                    partition,
                    offset,
                })
            },
            Err((
                KafkaError::MessageProduction(
                    RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic,
                ),
                _,
            )) => Err(AdminError::TopicNotFound(topic.to_string())),
            Err((e, _)) => Err(AdminError::Kafka(e)),
        }
    }
}
