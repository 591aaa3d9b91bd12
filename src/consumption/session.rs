use std::sync::Arc;

use prometheus::{register_int_counter_vec_with_registry, IntCounterVec, Registry};
use tokio_util::sync::CancellationToken;

use super::coordinator::{ConsumptionMode, PartitionConsumptionCoordinator, RecordHandler};
use crate::consumer_registry::ConsumerRegistry;
use crate::kafka_types::ConsumedRecord;
use crate::prometheus_metrics::LABEL_TOPIC;

const MET_RECORDS_NAME: &str = "consumer_session_records_total";
const MET_RECORDS_HELP: &str = "Records consumed by consumption sessions";

/// Starts consumption sessions in the background, tracking them in the [`ConsumerRegistry`].
///
/// A session runs until it's removed from the registry (or the parent token is cancelled),
/// or until its consumption terminates on its own: in that case it retires itself.
pub struct ConsumptionSessions {
    coordinator: Arc<PartitionConsumptionCoordinator>,
    registry: Arc<ConsumerRegistry>,

    // Prometheus Metrics
    metric_records: IntCounterVec,
}

impl ConsumptionSessions {
    pub fn new(
        coordinator: PartitionConsumptionCoordinator,
        registry: Arc<ConsumerRegistry>,
        metrics: Arc<Registry>,
    ) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            registry,
            metric_records: register_int_counter_vec_with_registry!(
                MET_RECORDS_NAME,
                MET_RECORDS_HELP,
                &[LABEL_TOPIC],
                metrics
            )
            .unwrap_or_else(|e| panic!("Failed to create metric '{MET_RECORDS_NAME}': {e}")),
        }
    }

    pub fn registry(&self) -> &Arc<ConsumerRegistry> {
        &self.registry
    }

    /// Start a session consuming `topic`, logging every record it receives.
    ///
    /// Returns `false`, and starts nothing, if a session with the same `id` is already live.
    ///
    /// # Arguments
    ///
    /// * `id` - Session identifier
    /// * `topic` - Topic to consume
    /// * `mode` - See [`ConsumptionMode`]
    /// * `parent` - The session stops when this token is cancelled, too
    pub async fn start(
        &self,
        id: &str,
        topic: &str,
        mode: ConsumptionMode,
        parent: &CancellationToken,
    ) -> bool {
        let cancel = parent.child_token();
        let generation =
            match self.registry.add_if_absent(id, topic, &mode.to_string(), cancel.clone()).await {
                Some(g) => g,
                None => return false,
            };

        let handler = self.logging_handler(id);
        let coordinator = self.coordinator.clone();
        let registry = self.registry.clone();
        let id = id.to_string();
        let topic = topic.to_string();

        tokio::spawn(async move {
            match coordinator.consume(&topic, &mode, handler, cancel.clone()).await {
                Ok(end) => info!("Session '{id}' on '{topic}' ended: {end:?}"),
                Err(e) => error!("Session '{id}' on '{topic}' failed: {e}"),
            }

            // Stop partition workers still running after a failure, then forget the session
            cancel.cancel();
            registry.retire(&id, generation).await;
        });

        true
    }

    fn logging_handler(&self, id: &str) -> RecordHandler {
        let id = id.to_string();
        let metric_records = self.metric_records.clone();

        Arc::new(move |r: &ConsumedRecord| {
            metric_records.with_label_values(&[&r.topic]).inc();
            info!(
                "[{id}] {}:{}@{} ts={} key={} payload={}",
                r.topic,
                r.partition,
                r.offset,
                r.timestamp.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
                r.key.as_deref().map(String::from_utf8_lossy).unwrap_or_default(),
                r.payload.as_deref().map(String::from_utf8_lossy).unwrap_or_default(),
            );
            Ok(())
        })
    }
}
