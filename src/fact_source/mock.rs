//! In-memory [`ClusterFactSource`], to exercise the aggregators and the consumption
//! coordinator without a Kafka cluster.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{sleep, Duration, Instant};

use super::stream::{OffsetCommitter, RecordStreamSender};
use super::{ClusterFactSource, FactSourceError, FactSourceResult, RecordStream};
use crate::kafka_types::{
    Broker, CommittedOffset, ConsumedRecord, GroupDescription, GroupMember, StartOffset,
    TopicDetail, TopicPartition,
};

const STREAM_CHANNEL_SIZE: usize = 100;

/// Lookups that can be made to fail, to exercise partial failures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Failing {
    Partitions(String),
    Replicas(TopicPartition),
    InSyncReplicas(TopicPartition),
    Leader(TopicPartition),
    LatestOffset(TopicPartition),
    TopicConfig(String),
    CommittedOffset(String, TopicPartition),
    PartitionStream(TopicPartition),
    GroupStream(String),
}

#[derive(Debug, Clone, Default)]
struct MockPartition {
    replicas: Vec<i32>,
    in_sync_replicas: Vec<i32>,
    leader: i32,
    latest_offset: i64,
}

#[derive(Default)]
struct MockState {
    unreachable: bool,
    brokers: Vec<Broker>,
    topics: BTreeMap<String, BTreeMap<i32, MockPartition>>,
    configs: HashMap<(String, String), String>,
    groups: BTreeMap<String, GroupDescription>,
    coordinators: HashMap<String, i32>,
    failing: HashSet<Failing>,
    latest_offset_delays: HashMap<TopicPartition, Duration>,
    partition_streams: HashMap<TopicPartition, (StartOffset, RecordStreamSender)>,
    group_streams: HashMap<(String, String), RecordStreamSender>,
}

type CommittedOffsets = Arc<Mutex<HashMap<(String, TopicPartition), i64>>>;

#[derive(Default)]
pub struct MockFactSource {
    state: Mutex<MockState>,
    committed: CommittedOffsets,
}

/// Commits into the same map [`MockFactSource::get_committed_offset`] reads from.
struct MockCommitter {
    group: String,
    committed: CommittedOffsets,
}

impl OffsetCommitter for MockCommitter {
    fn commit(&self, record: &ConsumedRecord) -> FactSourceResult<()> {
        self.committed.lock().unwrap().insert(
            (self.group.clone(), TopicPartition::new(record.topic.clone(), record.partition)),
            record.offset + 1,
        );
        Ok(())
    }
}

impl MockFactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broker(self, id: i32) -> Self {
        self.state.lock().unwrap().brokers.push(Broker {
            id,
            host: format!("broker-{id}.local"),
            port: 9092,
        });
        self
    }

    /// Add (or replace) a Topic Partition. The first replica is the leader.
    pub fn with_partition(
        self,
        topic: &str,
        partition: i32,
        replicas: &[i32],
        in_sync_replicas: &[i32],
        latest_offset: i64,
    ) -> Self {
        self.state.lock().unwrap().topics.entry(topic.to_string()).or_default().insert(
            partition,
            MockPartition {
                replicas: replicas.to_vec(),
                in_sync_replicas: in_sync_replicas.to_vec(),
                leader: replicas.first().copied().unwrap_or(-1),
                latest_offset,
            },
        );
        self
    }

    pub fn with_leader(self, topic: &str, partition: i32, leader: i32) -> Self {
        self.partition_mut(topic, partition, |p| p.leader = leader)
            .unwrap_or_else(|| panic!("Unknown partition {topic}:{partition}"));
        self
    }

    pub fn with_topic_config(self, topic: &str, key: &str, value: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .configs
            .insert((topic.to_string(), key.to_string()), value.to_string());
        self
    }

    /// Add a Consumer Group: one Member per entry of `members_topics`, subscribed to those topics.
    /// An entry of `None` is a Member whose metadata can't be decoded.
    pub fn with_group(self, group: &str, state: &str, members_topics: &[Option<&[&str]>]) -> Self {
        let members = members_topics
            .iter()
            .enumerate()
            .map(|(i, topics)| GroupMember {
                id: format!("{group}-member-{i}"),
                subscribed_topics: topics.map(|ts| ts.iter().map(|t| t.to_string()).collect()),
            })
            .collect();

        self.state.lock().unwrap().groups.insert(
            group.to_string(),
            GroupDescription {
                group_id: group.to_string(),
                state: state.to_string(),
                members,
            },
        );
        self
    }

    pub fn with_coordinator(self, group: &str, broker: i32) -> Self {
        self.state.lock().unwrap().coordinators.insert(group.to_string(), broker);
        self
    }

    pub fn with_committed(self, group: &str, topic: &str, partition: i32, offset: i64) -> Self {
        self.set_committed(group, topic, partition, offset);
        self
    }

    pub fn failing(self, f: Failing) -> Self {
        self.state.lock().unwrap().failing.insert(f);
        self
    }

    /// Make a lookup fail, from now on.
    pub fn fail(&self, f: Failing) {
        self.state.lock().unwrap().failing.insert(f);
    }

    /// Make a lookup previously made to fail succeed again.
    pub fn recover(&self, f: &Failing) {
        self.state.lock().unwrap().failing.remove(f);
    }

    /// The next latest offset lookup of the Topic Partition reads the offset,
    /// then takes `delay` to return it.
    pub fn delay_latest_offset_once(&self, topic: &str, partition: i32, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .latest_offset_delays
            .insert(TopicPartition::new(topic, partition), delay);
    }

    pub fn unreachable(self) -> Self {
        self.state.lock().unwrap().unreachable = true;
        self
    }

    /// Change the latest offset of an existing Topic Partition.
    pub fn set_latest_offset(&self, topic: &str, partition: i32, latest_offset: i64) {
        self.partition_mut(topic, partition, |p| p.latest_offset = latest_offset)
            .unwrap_or_else(|| panic!("Unknown partition {topic}:{partition}"));
    }

    pub fn set_committed(&self, group: &str, topic: &str, partition: i32, offset: i64) {
        self.committed
            .lock()
            .unwrap()
            .insert((group.to_string(), TopicPartition::new(topic, partition)), offset);
    }

    /// Sender side of the partition streams opened so far.
    pub fn partition_senders(&self) -> HashMap<TopicPartition, RecordStreamSender> {
        self.state
            .lock()
            .unwrap()
            .partition_streams
            .iter()
            .map(|(tp, (_, s))| (tp.clone(), s.clone()))
            .collect()
    }

    pub fn partition_stream_start(&self, topic: &str, partition: i32) -> Option<StartOffset> {
        self.state
            .lock()
            .unwrap()
            .partition_streams
            .get(&TopicPartition::new(topic, partition))
            .map(|(start, _)| *start)
    }

    pub fn group_sender(&self, topic: &str, group: &str) -> Option<RecordStreamSender> {
        self.state
            .lock()
            .unwrap()
            .group_streams
            .get(&(topic.to_string(), group.to_string()))
            .cloned()
    }

    /// Drop the sender side of every stream opened so far: the streams terminate.
    pub fn close_streams(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.partition_streams.clear();
        guard.group_streams.clear();
    }

    fn partition_mut<F: FnOnce(&mut MockPartition)>(
        &self,
        topic: &str,
        partition: i32,
        f: F,
    ) -> Option<()> {
        let mut guard = self.state.lock().unwrap();
        let p = guard.topics.get_mut(topic)?.get_mut(&partition)?;
        f(p);
        Some(())
    }

    fn check(&self, f: Failing) -> FactSourceResult<()> {
        let guard = self.state.lock().unwrap();
        if guard.unreachable {
            return Err(FactSourceError::Unreachable("mock cluster is down".to_string()));
        }
        if guard.failing.contains(&f) {
            return Err(FactSourceError::Unreachable(format!("lookup failure injected: {f:?}")));
        }
        Ok(())
    }

    fn check_reachable(&self) -> FactSourceResult<()> {
        if self.state.lock().unwrap().unreachable {
            Err(FactSourceError::Unreachable("mock cluster is down".to_string()))
        } else {
            Ok(())
        }
    }

    fn partition(&self, topic: &str, partition: i32) -> FactSourceResult<MockPartition> {
        let guard = self.state.lock().unwrap();
        guard
            .topics
            .get(topic)
            .ok_or_else(|| FactSourceError::TopicNotFound(topic.to_string()))?
            .get(&partition)
            .cloned()
            .ok_or_else(|| FactSourceError::PartitionNotFound(topic.to_string(), partition))
    }
}

const BLOCK_ON_CONDITION_CHECK_FREQ: Duration = Duration::from_millis(10);

/// Wait for a condition to become true, failing the test if it doesn't happen before `timeout`.
pub async fn block_on<F, Fut>(f: F, timeout: Duration)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if f().await {
            break;
        }

        assert!(
            Instant::now().duration_since(start) < timeout,
            "Timed out waiting on desired condition"
        );
        sleep(BLOCK_ON_CONDITION_CHECK_FREQ).await;
    }
}

/// Build a record with a textual payload.
pub fn record(topic: &str, partition: i32, offset: i64) -> ConsumedRecord {
    ConsumedRecord {
        topic: topic.to_string(),
        partition,
        offset,
        key: None,
        payload: Some(format!("payload-{offset}").into_bytes()),
        timestamp: None,
    }
}

#[async_trait]
impl ClusterFactSource for MockFactSource {
    async fn list_brokers(&self) -> FactSourceResult<Vec<Broker>> {
        self.check_reachable()?;
        Ok(self.state.lock().unwrap().brokers.clone())
    }

    async fn list_topics(&self) -> FactSourceResult<Vec<TopicDetail>> {
        self.check_reachable()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .topics
            .iter()
            .map(|(name, partitions)| TopicDetail {
                name: name.clone(),
                partitions: partitions.len() as i32,
                replication_factor: partitions
                    .values()
                    .next()
                    .map(|p| p.replicas.len() as i16)
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn get_topic_config(&self, topic: &str, key: &str) -> FactSourceResult<Option<String>> {
        self.check(Failing::TopicConfig(topic.to_string()))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .configs
            .get(&(topic.to_string(), key.to_string()))
            .cloned())
    }

    async fn get_partitions(&self, topic: &str) -> FactSourceResult<Vec<i32>> {
        self.check(Failing::Partitions(topic.to_string()))?;
        self.state
            .lock()
            .unwrap()
            .topics
            .get(topic)
            .map(|ps| ps.keys().copied().collect())
            .ok_or_else(|| FactSourceError::TopicNotFound(topic.to_string()))
    }

    async fn get_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>> {
        self.check(Failing::Replicas(TopicPartition::new(topic, partition)))?;
        Ok(self.partition(topic, partition)?.replicas)
    }

    async fn get_in_sync_replicas(&self, topic: &str, partition: i32) -> FactSourceResult<Vec<i32>> {
        self.check(Failing::InSyncReplicas(TopicPartition::new(topic, partition)))?;
        Ok(self.partition(topic, partition)?.in_sync_replicas)
    }

    async fn get_leader(&self, topic: &str, partition: i32) -> FactSourceResult<i32> {
        self.check(Failing::Leader(TopicPartition::new(topic, partition)))?;
        match self.partition(topic, partition)?.leader {
            l if l < 0 => Err(FactSourceError::LeaderUnknown(topic.to_string(), partition)),
            l => Ok(l),
        }
    }

    async fn get_latest_offset(&self, topic: &str, partition: i32) -> FactSourceResult<i64> {
        let tp = TopicPartition::new(topic, partition);
        self.check(Failing::LatestOffset(tp.clone()))?;
        let latest_offset = self.partition(topic, partition)?.latest_offset;

        let delay = self.state.lock().unwrap().latest_offset_delays.remove(&tp);
        if let Some(d) = delay {
            sleep(d).await;
        }
        Ok(latest_offset)
    }

    async fn list_consumer_groups(&self) -> FactSourceResult<Vec<String>> {
        self.check_reachable()?;
        Ok(self.state.lock().unwrap().groups.keys().cloned().collect())
    }

    async fn describe_consumer_groups(
        &self,
        groups: &[String],
    ) -> FactSourceResult<Vec<GroupDescription>> {
        self.check_reachable()?;
        let guard = self.state.lock().unwrap();
        // Unknown Groups are described as `Dead` and without Members, as the cluster does
        Ok(groups
            .iter()
            .map(|g| {
                guard.groups.get(g).cloned().unwrap_or_else(|| GroupDescription {
                    group_id: g.clone(),
                    state: "Dead".to_string(),
                    members: Vec::new(),
                })
            })
            .collect())
    }

    async fn get_group_coordinator(&self, group: &str) -> FactSourceResult<i32> {
        self.check_reachable()?;
        self.state
            .lock()
            .unwrap()
            .coordinators
            .get(group)
            .copied()
            .ok_or_else(|| FactSourceError::CoordinatorUnknown(group.to_string()))
    }

    async fn get_committed_offset(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> FactSourceResult<CommittedOffset> {
        let tp = TopicPartition::new(topic, partition);
        self.check(Failing::CommittedOffset(group.to_string(), tp.clone()))?;
        Ok(self
            .committed
            .lock()
            .unwrap()
            .get(&(group.to_string(), tp))
            .map(|o| CommittedOffset::from(*o))
            .unwrap_or(CommittedOffset::Uncommitted))
    }

    async fn open_group_stream(&self, topic: &str, group: &str) -> FactSourceResult<RecordStream> {
        self.check(Failing::GroupStream(group.to_string()))?;
        let (sender, stream) = RecordStream::channel(STREAM_CHANNEL_SIZE);
        self.state
            .lock()
            .unwrap()
            .group_streams
            .insert((topic.to_string(), group.to_string()), sender);
        Ok(stream.with_committer(Box::new(MockCommitter {
            group: group.to_string(),
            committed: self.committed.clone(),
        })))
    }

    async fn open_partition_stream(
        &self,
        topic: &str,
        partition: i32,
        start: StartOffset,
    ) -> FactSourceResult<RecordStream> {
        let tp = TopicPartition::new(topic, partition);
        self.check(Failing::PartitionStream(tp.clone()))?;
        self.partition(topic, partition)?;

        let (sender, stream) = RecordStream::channel(STREAM_CHANNEL_SIZE);
        self.state.lock().unwrap().partition_streams.insert(tp, (start, sender));
        Ok(stream)
    }
}
