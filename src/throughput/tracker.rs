use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::{register_histogram_with_registry, Histogram, Registry};
use serde::Serialize;
use tokio::sync::Mutex;

use super::errors::{ThroughputError, ThroughputResult};
use super::window::OffsetHistory;
use crate::constants::THROUGHPUT_TOTAL_KEY;
use crate::fact_source::ClusterFactSource;
use crate::kafka_types::CommittedOffset;

const MET_POLL_NAME: &str = "throughput_poll_duration_seconds";
const MET_POLL_HELP: &str = "Time (seconds) taken to poll the offsets used to compute throughput";

/// Records produced and consumed for a Topic, over the long window (`*_count`)
/// and the short window (`*_per_sec`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThroughputRecord {
    pub topic: String,
    pub produced_count: i64,
    pub consumed_count: i64,
    pub produced_per_sec: i64,
    pub consumed_per_sec: i64,
}

impl ThroughputRecord {
    fn accumulate(&mut self, other: &ThroughputRecord) {
        self.produced_count += other.produced_count;
        self.consumed_count += other.consumed_count;
        self.produced_per_sec += other.produced_per_sec;
        self.consumed_per_sec += other.consumed_per_sec;
    }
}

#[derive(Debug, Default)]
struct TopicHistories {
    produced: OffsetHistory,
    consumed: OffsetHistory,
}

/// Offsets observed for a Topic during a poll.
struct TopicTotals {
    produced: i64,
    consumed: i64,
}

/// Outcome of sampling the cluster: the Topics it knows about, and the totals
/// of those whose offsets could be collected.
struct SampledTotals {
    known_topics: HashSet<String>,
    totals: BTreeMap<String, TopicTotals>,
}

/// Tracks, per Topic, how many records were produced and consumed within a rolling window.
///
/// Every poll sums up the latest offsets of each Topic (produced) and the offsets
/// committed on it by _every_ Consumer Group (consumed), appending the sums to
/// the Topic histories. The histories are shared by all callers, and guarded by a lock
/// held for the whole poll.
pub struct ThroughputTracker {
    source: Arc<dyn ClusterFactSource>,
    window: Duration,
    rate_window: Duration,
    histories: Mutex<HashMap<String, TopicHistories>>,

    // Prometheus Metrics
    metric_poll: Histogram,
}

impl ThroughputTracker {
    /// Creates a new [`ThroughputTracker`].
    ///
    /// # Arguments
    ///
    /// * `source` - Where offsets are read from
    /// * `window` - Samples older than this are discarded: deltas over it are the `*_count` fields
    /// * `rate_window` - Deltas over this (shorter) window are the `*_per_sec` fields
    /// * `metrics` - Registry the poll duration histogram is registered with
    pub fn new(
        source: Arc<dyn ClusterFactSource>,
        window: Duration,
        rate_window: Duration,
        metrics: Arc<Registry>,
    ) -> Self {
        Self {
            source,
            window,
            rate_window,
            histories: Mutex::new(HashMap::new()),
            metric_poll: register_histogram_with_registry!(MET_POLL_NAME, MET_POLL_HELP, metrics)
                .unwrap_or_else(|e| panic!("Failed to create metric '{MET_POLL_NAME}': {e}")),
        }
    }

    /// Sample offsets of every Topic, and return the throughput of each (ordered by Topic),
    /// followed by the sum across all Topics.
    ///
    /// Concurrent polls are serialized: a sample is never older than those already recorded.
    pub async fn poll(&self) -> ThroughputResult<Vec<ThroughputRecord>> {
        let mut histories = self.histories.lock().await;
        let sampled = self.collect_totals().await?;

        Ok(self.update(&mut histories, sampled, Instant::now()))
    }

    /// Same as [`Self::poll`], with samples taken at the given instant.
    #[cfg(test)]
    async fn poll_at(&self, now: Instant) -> ThroughputResult<Vec<ThroughputRecord>> {
        let mut histories = self.histories.lock().await;
        let sampled = self.collect_totals().await?;

        Ok(self.update(&mut histories, sampled, now))
    }

    async fn collect_totals(&self) -> ThroughputResult<SampledTotals> {
        let _timer = self.metric_poll.start_timer();

        let topics = self.source.list_topics().await.map_err(ThroughputError::TopicsListing)?;
        let groups = self.source.list_consumer_groups().await.map_err(ThroughputError::GroupsListing)?;

        let mut res = SampledTotals {
            known_topics: topics.iter().map(|t| t.name.clone()).collect(),
            totals: BTreeMap::new(),
        };
        for t in topics {
            let partitions = match self.source.get_partitions(&t.name).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping Topic '{}' in throughput: {e}", t.name);
                    continue;
                },
            };

            let mut totals = TopicTotals {
                produced: 0,
                consumed: 0,
            };
            for p in partitions {
                match self.source.get_latest_offset(&t.name, p).await {
                    Ok(o) => totals.produced += o,
                    Err(e) => debug!("Latest offset of '{}:{p}' unknown: {e}", t.name),
                }

                for g in groups.iter() {
                    match self.source.get_committed_offset(g, &t.name, p).await {
                        Ok(CommittedOffset::Committed(o)) => totals.consumed += o,
                        Ok(CommittedOffset::Uncommitted) => {},
                        Err(e) => debug!("Offset committed by '{g}' for '{}:{p}' unknown: {e}", t.name),
                    }
                }
            }

            res.totals.insert(t.name, totals);
        }

        Ok(res)
    }

    fn update(
        &self,
        histories: &mut HashMap<String, TopicHistories>,
        sampled: SampledTotals,
        now: Instant,
    ) -> Vec<ThroughputRecord> {
        // Forget Topics that are gone from the cluster
        histories.retain(|t, _| sampled.known_topics.contains(t));
        let totals = sampled.totals;

        let mut total = ThroughputRecord {
            topic: THROUGHPUT_TOTAL_KEY.to_string(),
            ..Default::default()
        };
        let mut res = Vec::with_capacity(totals.len() + 1);

        for (topic, tt) in totals {
            let h = histories.entry(topic.clone()).or_default();

            h.produced.record(tt.produced, now);
            h.produced.prune(now, self.window);
            h.consumed.record(tt.consumed, now);
            h.consumed.prune(now, self.window);
            trace!("Topic '{topic}' throughput history: {} samples", h.produced.len());

            let record = ThroughputRecord {
                produced_count: h.produced.delta(),
                consumed_count: h.consumed.delta(),
                produced_per_sec: h.produced.delta_within(now, self.rate_window),
                consumed_per_sec: h.consumed.delta_within(now, self.rate_window),
                topic,
            };
            total.accumulate(&record);
            res.push(record);
        }

        res.push(total);
        res
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use prometheus::Registry;

    use super::*;
    use crate::fact_source::mock::{Failing, MockFactSource};

    fn tracker(source: Arc<MockFactSource>) -> ThroughputTracker {
        ThroughputTracker::new(
            source,
            Duration::from_secs(60),
            Duration::from_secs(1),
            Arc::new(Registry::new()),
        )
    }

    fn at(t0: Instant, millis: u64) -> Instant {
        t0 + Duration::from_millis(millis)
    }

    fn record_of<'a>(records: &'a [ThroughputRecord], topic: &str) -> &'a ThroughputRecord {
        records.iter().find(|r| r.topic == topic).unwrap()
    }

    #[tokio::test]
    async fn should_only_count_samples_within_window() {
        let source = Arc::new(MockFactSource::new().with_partition("orders", 0, &[1], &[1], 10));
        let tracker = tracker(source.clone());
        let t0 = Instant::now();

        let res = tracker.poll_at(t0).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 0);

        source.set_latest_offset("orders", 0, 15);
        let res = tracker.poll_at(at(t0, 500)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 5);
        assert_eq!(record_of(&res, "orders").produced_per_sec, 5);

        // Both previous samples are now older than 60s
        source.set_latest_offset("orders", 0, 25);
        let res = tracker.poll_at(at(t0, 61_000)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 0);
        assert_eq!(record_of(&res, "orders").produced_per_sec, 0);

        source.set_latest_offset("orders", 0, 30);
        let res = tracker.poll_at(at(t0, 61_200)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 5);
        assert_eq!(record_of(&res, "orders").produced_per_sec, 5);

        // Short window only sees the latest sample, long window is not affected by it
        source.set_latest_offset("orders", 0, 40);
        let res = tracker.poll_at(at(t0, 62_500)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 15);
        assert_eq!(record_of(&res, "orders").produced_per_sec, 0);

        source.set_latest_offset("orders", 0, 42);
        let res = tracker.poll_at(at(t0, 63_000)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 17);
        assert_eq!(record_of(&res, "orders").produced_per_sec, 2);
    }

    #[tokio::test]
    async fn should_sum_across_partitions_and_groups() {
        let source = Arc::new(
            MockFactSource::new()
                .with_partition("orders", 0, &[1], &[1], 100)
                .with_partition("orders", 1, &[1], &[1], 200)
                .with_partition("payments", 0, &[1], &[1], 50)
                .with_group("billing", "Stable", &[Some(&["orders"])])
                // Not subscribed to "orders", yet its commits count too
                .with_group("audit", "Empty", &[])
                .with_committed("billing", "orders", 0, 80)
                .with_committed("billing", "orders", 1, 150)
                .with_committed("audit", "orders", 0, 10),
        );
        let tracker = tracker(source.clone());
        let t0 = Instant::now();

        tracker.poll_at(t0).await.unwrap();

        source.set_latest_offset("orders", 0, 110);
        source.set_latest_offset("orders", 1, 220);
        source.set_latest_offset("payments", 0, 51);
        source.set_committed("billing", "orders", 1, 160);
        source.set_committed("audit", "orders", 0, 12);
        let res = tracker.poll_at(at(t0, 500)).await.unwrap();

        let topics: Vec<&str> = res.iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(topics, vec!["orders", "payments", THROUGHPUT_TOTAL_KEY]);

        assert_eq!(
            res[0],
            ThroughputRecord {
                topic: "orders".to_string(),
                produced_count: 30,
                consumed_count: 12,
                produced_per_sec: 30,
                consumed_per_sec: 12,
            }
        );
        assert_eq!(
            res[2],
            ThroughputRecord {
                topic: THROUGHPUT_TOTAL_KEY.to_string(),
                produced_count: 31,
                consumed_count: 12,
                produced_per_sec: 31,
                consumed_per_sec: 12,
            }
        );
    }

    #[tokio::test]
    async fn should_drop_histories_of_vanished_topics() {
        let source = Arc::new(MockFactSource::new().with_partition("orders", 0, &[1], &[1], 10));
        let tracker = tracker(source);

        tracker.poll_at(Instant::now()).await.unwrap();
        tracker.histories.lock().await.insert("gone".to_string(), TopicHistories::default());

        let res = tracker.poll().await.unwrap();
        assert_eq!(res.len(), 2);
        assert!(!tracker.histories.lock().await.contains_key("gone"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_poll_concurrently() {
        let source = Arc::new(
            MockFactSource::new()
                .with_partition("orders", 0, &[1], &[1], 10)
                .with_partition("payments", 0, &[1], &[1], 10),
        );
        let tracker = Arc::new(tracker(source.clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tracker = tracker.clone();
                let source = source.clone();
                tokio::spawn(async move {
                    source.set_latest_offset("orders", 0, 10 + i);
                    tracker.poll().await.unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap().len(), 3);
        }

        let histories = tracker.histories.lock().await;
        assert_eq!(histories.len(), 2);
        assert_eq!(histories["orders"].produced.len(), 16);
        assert_eq!(histories["payments"].consumed.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn should_not_record_stale_samples_after_newer_ones() {
        let source = Arc::new(MockFactSource::new().with_partition("orders", 0, &[1], &[1], 10));
        let tracker = Arc::new(tracker(source.clone()));

        // The slow poll reads 10, then takes a while to report it
        source.delay_latest_offset_once("orders", 0, Duration::from_millis(300));
        let slow = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.poll().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        source.set_latest_offset("orders", 0, 20);
        let fast = tracker.poll().await.unwrap();
        let slow = slow.await.unwrap().unwrap();

        assert_eq!(record_of(&slow, "orders").produced_count, 0);
        assert_eq!(record_of(&fast, "orders").produced_count, 10);
        assert_eq!(record_of(&fast, "orders").produced_per_sec, 10);
    }

    #[tokio::test]
    async fn should_keep_history_of_topics_whose_lookup_failed() {
        let source = Arc::new(
            MockFactSource::new()
                .with_partition("orders", 0, &[1], &[1], 10)
                .with_partition("payments", 0, &[1], &[1], 10),
        );
        let tracker = tracker(source.clone());
        let t0 = Instant::now();

        tracker.poll_at(t0).await.unwrap();

        let failing = Failing::Partitions("orders".to_string());
        source.fail(failing.clone());
        source.set_latest_offset("orders", 0, 15);
        let res = tracker.poll_at(at(t0, 500)).await.unwrap();
        let topics: Vec<&str> = res.iter().map(|r| r.topic.as_str()).collect();
        assert_eq!(topics, vec!["payments", THROUGHPUT_TOTAL_KEY]);
        assert_eq!(tracker.histories.lock().await["orders"].produced.len(), 1);

        source.recover(&failing);
        source.set_latest_offset("orders", 0, 20);
        let res = tracker.poll_at(at(t0, 1_000)).await.unwrap();
        assert_eq!(record_of(&res, "orders").produced_count, 10);
    }

    #[tokio::test]
    async fn should_fail_when_cluster_is_unreachable() {
        let tracker = tracker(Arc::new(MockFactSource::new().unreachable()));

        let err = tracker.poll().await.unwrap_err();
        assert!(matches!(err, ThroughputError::TopicsListing(_)));
        assert!(err.fact_source_error().is_connection());
    }
}
