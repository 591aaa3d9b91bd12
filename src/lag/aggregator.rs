use std::collections::BTreeSet;
use std::sync::Arc;

use prometheus::{register_histogram_with_registry, Histogram, Registry};
use serde::Serialize;

use super::errors::{LagError, LagResult};
use crate::constants::UNKNOWN_COORDINATOR;
use crate::fact_source::ClusterFactSource;
use crate::kafka_types::{CommittedOffset, GroupDescription};

const MET_RUN_NAME: &str = "lag_aggregation_duration_seconds";
const MET_RUN_HELP: &str = "Time (seconds) taken to aggregate the lag of Consumer Groups";

/// Lag of a Consumer Group on a single Topic Partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TopicPartitionLag {
    pub topic: String,
    pub partition: i32,
    pub lag: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerGroupStats {
    pub group_id: String,

    /// Number of Members.
    pub members: usize,

    /// Number of distinct Topics the Members are subscribed to.
    pub topics: usize,

    /// Sum of `topic_lags`. Negative only if offsets regressed after a commit.
    pub lag: i64,

    /// Broker coordinating the Group, or `-1` if unknown.
    pub coordinator: i32,
    pub state: String,

    /// Ordered by Topic, then partition.
    pub topic_lags: Vec<TopicPartitionLag>,
}

/// Computes the lag of Consumer Groups: how far their committed offsets are behind
/// the latest offsets of the partitions they consume.
///
/// Partitions a Group has not committed anything for are left out, instead of counting
/// as a backlog: a freshly created Group would otherwise report the entire Topic as lag.
pub struct LagAggregator {
    source: Arc<dyn ClusterFactSource>,

    // Prometheus Metrics
    metric_run: Histogram,
}

impl LagAggregator {
    pub fn new(source: Arc<dyn ClusterFactSource>, metrics: Arc<Registry>) -> Self {
        Self {
            source,
            metric_run: register_histogram_with_registry!(MET_RUN_NAME, MET_RUN_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RUN_NAME}': {e}")),
        }
    }

    /// Stats of every Consumer Group known to the cluster, ordered by Group id.
    pub async fn consumer_groups(&self) -> LagResult<Vec<ConsumerGroupStats>> {
        let _timer = self.metric_run.start_timer();

        let groups = self.source.list_consumer_groups().await.map_err(LagError::GroupsListing)?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let mut descriptions = self
            .source
            .describe_consumer_groups(&groups)
            .await
            .map_err(LagError::GroupsDescription)?;
        descriptions.sort_by(|a, b| a.group_id.cmp(&b.group_id));

        let mut res = Vec::with_capacity(descriptions.len());
        for gd in descriptions {
            res.push(self.group_stats(gd).await);
        }
        Ok(res)
    }

    /// Stats of a single Consumer Group.
    pub async fn consumer_group(&self, group: &str) -> LagResult<ConsumerGroupStats> {
        let _timer = self.metric_run.start_timer();

        // Describing an unknown Group succeeds (as a `Dead` Group without Members)
        let groups = self.source.list_consumer_groups().await.map_err(LagError::GroupsListing)?;
        if !groups.iter().any(|g| g == group) {
            return Err(LagError::GroupNotFound(group.to_string()));
        }

        let gd = self
            .source
            .describe_consumer_groups(&[group.to_string()])
            .await
            .map_err(LagError::GroupsDescription)?
            .into_iter()
            .find(|gd| gd.group_id == group)
            .ok_or_else(|| LagError::GroupNotFound(group.to_string()))?;

        Ok(self.group_stats(gd).await)
    }

    async fn group_stats(&self, gd: GroupDescription) -> ConsumerGroupStats {
        // Members whose metadata couldn't be decoded contribute no Topic
        let topics: BTreeSet<&str> = gd
            .members
            .iter()
            .filter_map(|m| {
                if m.subscribed_topics.is_none() {
                    trace!("Member '{}' of Group '{}' has no known subscription", m.id, gd.group_id);
                }
                m.subscribed_topics.as_ref()
            })
            .flatten()
            .map(String::as_str)
            .collect();

        let coordinator = match self.source.get_group_coordinator(&gd.group_id).await {
            Ok(c) => c,
            Err(e) => {
                debug!("Coordinator of Group '{}' unknown: {e}", gd.group_id);
                UNKNOWN_COORDINATOR
            },
        };

        let mut topic_lags = Vec::new();
        for t in topics.iter() {
            self.collect_topic_lags(&gd.group_id, t, &mut topic_lags).await;
        }
        topic_lags.sort();

        ConsumerGroupStats {
            members: gd.members.len(),
            topics: topics.len(),
            lag: topic_lags.iter().map(|tpl| tpl.lag).sum(),
            coordinator,
            group_id: gd.group_id,
            state: gd.state,
            topic_lags,
        }
    }

    async fn collect_topic_lags(&self, group: &str, topic: &str, acc: &mut Vec<TopicPartitionLag>) {
        let partitions = match self.source.get_partitions(topic).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping Topic '{topic}' in lag of Group '{group}': {e}");
                return;
            },
        };

        for p in partitions {
            let latest = match self.source.get_latest_offset(topic, p).await {
                Ok(o) => o,
                Err(e) => {
                    debug!("Latest offset of '{topic}:{p}' unknown: {e}");
                    continue;
                },
            };

            match self.source.get_committed_offset(group, topic, p).await {
                Ok(CommittedOffset::Committed(committed)) => acc.push(TopicPartitionLag {
                    topic: topic.to_string(),
                    partition: p,
                    lag: latest - committed,
                }),
                Ok(CommittedOffset::Uncommitted) => {
                    trace!("Group '{group}' has no commit for '{topic}:{p}'");
                },
                Err(e) => debug!("Offset committed by '{group}' for '{topic}:{p}' unknown: {e}"),
            }
        }
    }
}
