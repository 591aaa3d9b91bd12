use std::collections::BTreeMap;
use std::sync::Arc;

use prometheus::{register_histogram_vec_with_registry, HistogramVec, Registry};
use serde::Serialize;

use super::errors::{ClusterMetadataError, ClusterMetadataResult};
use crate::constants::{CLEANUP_POLICY_CONFIG, INTERNAL_TOPIC_PREFIX};
use crate::fact_source::ClusterFactSource;
use crate::kafka_types::{Broker, TopicDetail};
use crate::prometheus_metrics::LABEL_AGGREGATION;

const MET_RUN_NAME: &str = "metadata_aggregation_duration_seconds";
const MET_RUN_HELP: &str = "Time (seconds) taken to aggregate cluster metadata";

const AGGREGATION_BROKERS: &str = "brokers";
const AGGREGATION_TOPICS: &str = "topics";

/// Partition counts of a Broker.
///
/// Both `partitions_led` and `in_sync_partitions` never exceed `partitions_owned`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub id: i32,
    pub host: String,
    pub port: u16,

    /// Partitions this Broker holds a replica of.
    #[serde(rename = "partitions")]
    pub partitions_owned: usize,

    /// Partitions this Broker is the leader of.
    #[serde(rename = "partitions_leader")]
    pub partitions_led: usize,

    /// Partitions whose in-sync replicas include this Broker.
    pub in_sync_partitions: usize,
}

impl From<&Broker> for BrokerStats {
    fn from(b: &Broker) -> Self {
        Self {
            id: b.id,
            host: b.host.clone(),
            port: b.port,
            partitions_owned: 0,
            partitions_led: 0,
            in_sync_partitions: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
    pub internal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_policy: Option<String>,

    /// Replicas of all partitions, summed: the same Broker is counted once per partition.
    pub replicas: usize,

    /// In-sync replicas of all partitions, summed like `replicas`.
    pub in_sync_replicas: usize,
}

/// What is known about a single partition, for the purpose of counting Broker ownership.
///
/// `leader` and `in_sync_replicas` are `None` when their lookup failed.
struct PartitionFacts {
    replicas: Vec<i32>,
    leader: Option<i32>,
    in_sync_replicas: Option<Vec<i32>>,
}

impl PartitionFacts {
    fn count_for(&self, stats: &mut BrokerStats) {
        if !self.replicas.contains(&stats.id) {
            return;
        }

        stats.partitions_owned += 1;
        if self.leader == Some(stats.id) {
            stats.partitions_led += 1;
        }
        if self.in_sync_replicas.as_ref().is_some_and(|isr| isr.contains(&stats.id)) {
            stats.in_sync_partitions += 1;
        }
    }
}

/// Computes [`BrokerStats`] and [`TopicStats`], from scratch, on every call.
pub struct MetadataAggregator {
    source: Arc<dyn ClusterFactSource>,

    // Prometheus Metrics
    metric_run: HistogramVec,
}

impl MetadataAggregator {
    pub fn new(source: Arc<dyn ClusterFactSource>, metrics: Arc<Registry>) -> Self {
        Self {
            source,
            metric_run: register_histogram_vec_with_registry!(
                MET_RUN_NAME,
                MET_RUN_HELP,
                &[LABEL_AGGREGATION],
                metrics
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RUN_NAME}': {e}")),
        }
    }

    /// Partition counts of every Broker, ordered by Broker id.
    ///
    /// Fails only if Brokers or Topics can't be listed. A partition whose replicas can't be
    /// looked up is not counted at all; if only its leader (or in-sync replicas) can't be
    /// looked up, only the corresponding counter is skipped.
    pub async fn broker_stats(&self) -> ClusterMetadataResult<Vec<BrokerStats>> {
        let _timer = self.metric_run.with_label_values(&[AGGREGATION_BROKERS]).start_timer();

        let brokers = self.source.list_brokers().await.map_err(ClusterMetadataError::BrokersListing)?;
        let topics = self.source.list_topics().await.map_err(ClusterMetadataError::TopicsListing)?;

        let mut stats: BTreeMap<i32, BrokerStats> =
            brokers.iter().map(|b| (b.id, BrokerStats::from(b))).collect();

        for t in topics {
            let partitions = match self.source.get_partitions(&t.name).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping Topic '{}' in Broker stats: {e}", t.name);
                    continue;
                },
            };

            for p in partitions {
                if let Some(facts) = self.partition_facts(&t.name, p).await {
                    stats.values_mut().for_each(|bs| facts.count_for(bs));
                }
            }
        }

        Ok(stats.into_values().collect())
    }

    async fn partition_facts(&self, topic: &str, partition: i32) -> Option<PartitionFacts> {
        let replicas = match self.source.get_replicas(topic, partition).await {
            Ok(r) => r,
            Err(e) => {
                debug!("Replicas of '{topic}:{partition}' unknown: {e}");
                return None;
            },
        };

        let leader = self
            .source
            .get_leader(topic, partition)
            .await
            .map_err(|e| debug!("Leader of '{topic}:{partition}' unknown: {e}"))
            .ok();
        let in_sync_replicas = self
            .source
            .get_in_sync_replicas(topic, partition)
            .await
            .map_err(|e| debug!("In-sync replicas of '{topic}:{partition}' unknown: {e}"))
            .ok();

        Some(PartitionFacts {
            replicas,
            leader,
            in_sync_replicas,
        })
    }

    /// Statistics of every Topic, ordered by name.
    ///
    /// Fails only if Topics can't be listed. A Topic whose partitions can't be listed
    /// is left out; partitions whose replicas can't be looked up are not summed.
    pub async fn topic_stats(&self) -> ClusterMetadataResult<Vec<TopicStats>> {
        let _timer = self.metric_run.with_label_values(&[AGGREGATION_TOPICS]).start_timer();

        let mut topics = self.source.list_topics().await.map_err(ClusterMetadataError::TopicsListing)?;
        topics.sort_by(|a, b| a.name.cmp(&b.name));

        let mut res = Vec::with_capacity(topics.len());
        for t in topics {
            if let Some(ts) = self.single_topic_stats(t).await {
                res.push(ts);
            }
        }

        Ok(res)
    }

    async fn single_topic_stats(&self, t: TopicDetail) -> Option<TopicStats> {
        let partitions = self
            .source
            .get_partitions(&t.name)
            .await
            .map_err(|e| warn!("Skipping Topic '{}' in Topic stats: {e}", t.name))
            .ok()?;

        let cleanup_policy = match self.source.get_topic_config(&t.name, CLEANUP_POLICY_CONFIG).await {
            Ok(v) => v,
            Err(e) => {
                debug!("Config '{CLEANUP_POLICY_CONFIG}' of Topic '{}' unknown: {e}", t.name);
                None
            },
        };

        let mut replicas = 0;
        let mut in_sync_replicas = 0;
        for p in partitions {
            match self.source.get_replicas(&t.name, p).await {
                Ok(r) => replicas += r.len(),
                Err(e) => debug!("Replicas of '{}:{p}' unknown: {e}", t.name),
            }
            match self.source.get_in_sync_replicas(&t.name, p).await {
                Ok(isr) => in_sync_replicas += isr.len(),
                Err(e) => debug!("In-sync replicas of '{}:{p}' unknown: {e}", t.name),
            }
        }

        Some(TopicStats {
            internal: t.name.starts_with(INTERNAL_TOPIC_PREFIX),
            name: t.name,
            partitions: t.partitions,
            replication_factor: t.replication_factor,
            cleanup_policy,
            replicas,
            in_sync_replicas,
        })
    }
}
