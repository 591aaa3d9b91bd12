use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use konsumer_offsets::ConsumerProtocolSubscription;
use rdkafka::admin::{AdminClient, AdminOptions, ResourceSpecifier};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::groups::GroupInfo;
use rdkafka::metadata::MetadataPartition;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use super::errors::{is_transport_failure, FactSourceError, FactSourceResult};
use super::stream::{OffsetCommitter, RecordStream, RecordStreamSender};
use super::ClusterFactSource;
use crate::constants::PARTITION_CONSUMER_GROUP;
use crate::kafka_types::{
    Broker, CommittedOffset, ConsumedRecord, GroupDescription, GroupMember, StartOffset,
    TopicDetail,
};

const STREAM_CHANNEL_SIZE: usize = 1_000;

/// [`ClusterFactSource`] backed by `librdkafka`.
///
/// Metadata, watermarks, group lists and committed offsets are fetched via blocking calls:
/// those run on the blocking thread pool, so they never stall the async runtime.
/// Topic configuration is fetched via the (async) Admin API.
///
/// Committed offsets are scoped by `group.id`: one client per Consumer Group is kept,
/// and dropped once the Group is no longer listed by the cluster.
pub struct KafkaFactSource {
    client_config: ClientConfig,
    admin_client: AdminClient<DefaultClientContext>,
    metadata_client: Arc<BaseConsumer>,
    group_clients: Mutex<HashMap<String, Arc<BaseConsumer>>>,
    fetch_timeout: Duration,
}

impl KafkaFactSource {
    /// Create a new [`KafkaFactSource`].
    ///
    /// # Arguments
    ///
    /// * `client_config` - Kafka client configuration, used by every client this allocates
    /// * `fetch_timeout` - Upper bound to every single remote query
    pub fn new(client_config: ClientConfig, fetch_timeout: Duration) -> FactSourceResult<Self> {
        Ok(Self {
            admin_client: client_config.create()?,
            metadata_client: Arc::new(client_config.create()?),
            group_clients: Mutex::new(HashMap::new()),
            client_config,
            fetch_timeout,
        })
    }

    /// Identifier of the cluster, defined as `cluster.id` in Brokers' configuration.
    pub async fn cluster_id(&self) -> Option<String> {
        self.fetch(|c, timeout| Ok(c.client().fetch_cluster_id(timeout))).await.ok().flatten()
    }

    /// Run a blocking fetch against the shared metadata client, on the blocking thread pool.
    async fn fetch<T, F>(&self, f: F) -> FactSourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> FactSourceResult<T> + Send + 'static,
    {
        self.fetch_with(self.metadata_client.clone(), f).await
    }

    /// Run a blocking fetch against the given client, on the blocking thread pool.
    async fn fetch_with<T, F>(&self, client: Arc<BaseConsumer>, f: F) -> FactSourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> FactSourceResult<T> + Send + 'static,
    {
        let timeout = self.fetch_timeout;

        spawn_blocking(move || f(&client, timeout).map_err(classify))
            .await
            .map_err(|e| FactSourceError::BlockingFetch(e.to_string()))?
    }

    /// Client whose `group.id` is the given Consumer Group, created on first use.
    async fn group_client(&self, group: &str) -> FactSourceResult<Arc<BaseConsumer>> {
        let mut guard = self.group_clients.lock().await;

        if let Some(c) = guard.get(group) {
            return Ok(c.clone());
        }

        let mut config = self.client_config.clone();
        config.set("group.id", group).set("enable.auto.commit", "false");
        let client: Arc<BaseConsumer> = Arc::new(config.create()?);
        debug!("Created client for Group '{group}'");

        guard.insert(group.to_string(), client.clone());
        Ok(client)
    }

    /// Fetch the metadata of a single Topic Partition, and extract from it via `f`.
    async fn fetch_partition<T, F>(&self, topic: &str, partition: i32, f: F) -> FactSourceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&MetadataPartition) -> FactSourceResult<T> + Send + 'static,
    {
        let topic = topic.to_string();

        self.fetch(move |c, timeout| {
            let metadata = c.fetch_metadata(Some(&topic), timeout)?;
            let mt = metadata
                .topics()
                .iter()
                .find(|mt| mt.name() == topic && mt.error().is_none())
                .ok_or_else(|| FactSourceError::TopicNotFound(topic.clone()))?;
            let mp = mt
                .partitions()
                .iter()
                .find(|mp| mp.id() == partition)
                .ok_or_else(|| FactSourceError::PartitionNotFound(topic.clone(), partition))?;

            f(mp)
        })
        .await
    }

    fn stream_client_config(&self, group: Option<&str>) -> ClientConfig {
        let mut config = self.client_config.clone();

        match group {
            Some(g) => {
                // Offsets are stored only once the record was handled, and then auto-committed
                config
                    .set("group.id", g)
                    .set("enable.auto.commit", "true")
                    .set("enable.auto.offset.store", "false")
                    .set("auto.offset.reset", "latest");
            },
            None => {
                if config.get("group.id").is_none() {
                    config.set("group.id", PARTITION_CONSUMER_GROUP);
                }
                config.set("enable.auto.commit", "false");
            },
        }

        trace!("Created:\n{:#?}", config);
        config
    }
}

/// Failures to reach the cluster at all, as opposed to failures of a single lookup,
/// become [`FactSourceError::Unreachable`].
fn classify(e: FactSourceError) -> FactSourceError {
    match e {
        FactSourceError::Kafka(ke) if is_transport_failure(&ke) => {
            FactSourceError::Unreachable(ke.to_string())
        },
        other => other,
    }
}

fn describe_group(g: &GroupInfo) -> GroupDescription {
    GroupDescription {
        group_id: g.name().to_string(),
        state: g.state().to_string(),
        members: g
            .members()
            .iter()
            .map(|m| GroupMember {
                id: m.id().to_string(),
                subscribed_topics: m.metadata().and_then(|metadata_bytes| {
                    match ConsumerProtocolSubscription::try_from(metadata_bytes) {
                        Ok(cps) => Some(cps.subscribed_topics),
                        Err(e) => {
                            debug!(
                                "Unable to parse 'metadata' bytes of Member '{}' of Group '{}': {}",
                                m.id(),
                                g.name(),
                                e
                            );
                            None
                        },
                    }
                }),
            })
            .collect(),
    }
}

/// Moves records from a [`StreamConsumer`] into a [`RecordStreamSender`],
/// until either the consumer fails or the receiving [`RecordStream`] is dropped.
async fn pump_records(consumer: Arc<StreamConsumer>, sender: RecordStreamSender, source: String) {
    debug!("Begin streaming records of {source}");

    loop {
        let record = tokio::select! {
            _ = sender.closed() => break,
            res = consumer.recv() => match res {
                Ok(m) => ConsumedRecord::from(&m),
                Err(e) => {
                    warn!("Failed to receive record of {source}: {e}");
                    sender.send_error(FactSourceError::Kafka(e)).await;
                    break;
                },
            },
        };

        if !sender.send_record(record).await {
            break;
        }
    }

    debug!("Stopped streaming records of {source}");
}

/// Stores the offset of handled records: the group consumer then auto-commits them.
struct StoreOffsetCommitter {
    consumer: Arc<StreamConsumer>,
}

impl OffsetCommitter for StoreOffsetCommitter {
    fn commit(&self, record: &ConsumedRecord) -> FactSourceResult<()> {
        // The stored offset is the next one the group should consume
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset + 1)
            .map_err(FactSourceError::from)
    }
}

#[async_trait]
impl ClusterFactSource for KafkaFactSource {
    async fn list_brokers(&self) -> FactSourceResult<Vec<Broker>> {
        self.fetch(|c, timeout| {
            let metadata = c.fetch_metadata(None, timeout)?;
            Ok(metadata.brokers().iter().map(Broker::from).collect())
        })
        .await
    }

    async fn list_topics(&self) -> FactSourceResult<Vec<TopicDetail>> {
        self.fetch(|c, timeout| {
            let metadata = c.fetch_metadata(None, timeout)?;
            Ok(metadata
                .topics()
                .iter()
                .filter(|mt| mt.error().is_none())
                .map(TopicDetail::from)
                .collect())
        })
        .await
    }

    async fn get_topic_config(&self, topic: &str, key: &str) -> FactSourceResult<Option<String>> {
        let opts = AdminOptions::new().request_timeout(Some(self.fetch_timeout));
        let results = self
            .admin_client
            .describe_configs(&[ResourceSpecifier::Topic(topic)], &opts)
            .await
            .map_err(|e| classify(e.into()))?;

        match results.into_iter().next() {
            Some(Ok(resource)) => Ok(resource.get(key).and_then(|entry| entry.value.clone())),
            Some(Err(code)) => Err(FactSourceError::Kafka(KafkaError::AdminOp(code))),
            None => Ok(None),
        }
    }

    async fn get_partitions(&self, topic: &str) -> FactSourceResult<Vec<i32>> {
        let topic = topic.to_string();

        self.fetch(move |c, timeout| {
            let metadata = c.fetch_metadata(Some(&topic), timeout)?;
            metadata
                .topics()
                .iter()
                .find(|mt| mt.name() == topic && mt.error().is_none())
                .map(|mt| mt.partitions().iter().map(|mp| mp.id()).collect())
                .ok_or(FactSourceError::TopicNotFound(topic))
        })
        .await
    }

    async fn get_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>> {
        self.fetch_partition(topic, partition, |mp| Ok(mp.replicas().to_vec())).await
    }

    async fn get_in_sync_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>> {
        self.fetch_partition(topic, partition, |mp| Ok(mp.isr().to_vec())).await
    }

    async fn get_leader(&self, topic: &str, partition: i32) -> FactSourceResult<i32> {
        let t = topic.to_string();

        self.fetch_partition(topic, partition, move |mp| {
            // A leader-less partition reports `-1`
            if mp.leader() < 0 {
                Err(FactSourceError::LeaderUnknown(t, partition))
            } else {
                Ok(mp.leader())
            }
        })
        .await
    }

    async fn get_latest_offset(&self, topic: &str, partition: i32) -> FactSourceResult<i64> {
        let topic = topic.to_string();

        self.fetch(move |c, timeout| {
            let (_, high) = c.fetch_watermarks(&topic, partition, timeout)?;
            Ok(high)
        })
        .await
    }

    async fn list_consumer_groups(&self) -> FactSourceResult<Vec<String>> {
        let groups: Vec<String> = self
            .fetch(|c, timeout| {
                let gl = c.fetch_group_list(None, timeout)?;
                Ok(gl.groups().iter().map(|g| g.name().to_string()).collect())
            })
            .await?;

        // Forget clients of Groups that are gone
        self.group_clients.lock().await.retain(|g, _| groups.contains(g));

        Ok(groups)
    }

    async fn describe_consumer_groups(
        &self,
        groups: &[String],
    ) -> FactSourceResult<Vec<GroupDescription>> {
        let groups = groups.to_vec();

        self.fetch(move |c, timeout| {
            let mut res = Vec::with_capacity(groups.len());
            for g in groups {
                let gl = c.fetch_group_list(Some(&g), timeout)?;
                match gl.groups().iter().find(|gi| gi.name() == g) {
                    Some(gi) => res.push(describe_group(gi)),
                    None => warn!("Group '{g}' vanished while being described: ignoring"),
                }
            }
            Ok(res)
        })
        .await
    }

    async fn get_group_coordinator(&self, group: &str) -> FactSourceResult<i32> {
        // `FindCoordinator` is not exposed by the librdkafka bindings
        Err(FactSourceError::CoordinatorUnknown(group.to_string()))
    }

    async fn get_committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> FactSourceResult<CommittedOffset> {
        let group_client = self.group_client(group).await?;
        let topic = topic.to_string();

        self.fetch_with(group_client, move |c, timeout| {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition(&topic, partition);

            let committed = c.committed_offsets(tpl, timeout)?;
            let offset = committed.find_partition(&topic, partition).map(|e| e.offset());

            Ok(match offset {
                Some(Offset::Offset(o)) => CommittedOffset::from(o),
                _ => CommittedOffset::Uncommitted,
            })
        })
        .await
    }

    async fn open_group_stream(&self, topic: &str, group: &str) -> FactSourceResult<RecordStream> {
        let consumer: StreamConsumer = self.stream_client_config(Some(group)).create()?;
        consumer.subscribe(&[topic])?;
        let consumer = Arc::new(consumer);

        let (sender, stream) = RecordStream::channel(STREAM_CHANNEL_SIZE);
        tokio::spawn(pump_records(
            consumer.clone(),
            sender,
            format!("Topic '{topic}' (Group '{group}')"),
        ));

        Ok(stream.with_committer(Box::new(StoreOffsetCommitter {
            consumer,
        })))
    }

    async fn open_partition_stream(
        &self,
        topic: &str,
        partition: i32,
        start: StartOffset,
    ) -> FactSourceResult<RecordStream> {
        let consumer: StreamConsumer = self.stream_client_config(None).create()?;

        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            topic,
            partition,
            match start {
                StartOffset::Earliest => Offset::Beginning,
                StartOffset::Latest => Offset::End,
            },
        )?;
        consumer.assign(&tpl)?;

        let (sender, stream) = RecordStream::channel(STREAM_CHANNEL_SIZE);
        tokio::spawn(pump_records(
            Arc::new(consumer),
            sender,
            format!("Topic Partition '{topic}:{partition}'"),
        ));

        Ok(stream)
    }
}
