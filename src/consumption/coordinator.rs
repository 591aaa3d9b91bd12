use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::errors::{ConsumptionError, ConsumptionResult, HandlerError};
use crate::fact_source::{ClusterFactSource, StreamEvent};
use crate::kafka_types::{ConsumedRecord, StartOffset, TopicPartition};

/// Callback invoked for every consumed record.
///
/// Returning an error terminates the consumption.
pub type RecordHandler = Arc<dyn Fn(&ConsumedRecord) -> Result<(), HandlerError> + Send + Sync>;

/// How a Topic is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumptionMode {
    /// As member of a Consumer Group: the cluster assigns partitions, and progress is committed.
    Group {
        id: String,
    },

    /// Every partition of the Topic, independently, with nothing committed.
    GroupLess {
        start: StartOffset,
    },
}

impl fmt::Display for ConsumptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumptionMode::Group {
                id,
            } => write!(f, "group '{id}'"),
            ConsumptionMode::GroupLess {
                start,
            } => write!(f, "group-less from {start:?}"),
        }
    }
}

/// How a consumption terminated, when it did so without errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumptionEnd {
    /// The [`CancellationToken`] was cancelled.
    Cancelled,

    /// The stream(s) ended on their own.
    StreamClosed,
}

/// Consumes a Topic, forwarding every record to a [`RecordHandler`], until cancelled or failed.
pub struct PartitionConsumptionCoordinator {
    source: Arc<dyn ClusterFactSource>,
}

impl PartitionConsumptionCoordinator {
    pub fn new(source: Arc<dyn ClusterFactSource>) -> Self {
        Self {
            source,
        }
    }

    /// Consume `topic` according to `mode`.
    ///
    /// In group-less mode, one worker per partition is spawned: the first error reported
    /// by any worker is returned right away, without waiting for the other workers.
    /// Those keep running until `cancel` is cancelled, so callers should cancel it
    /// once this returns.
    /// On cancellation instead, this returns only after every worker has stopped:
    /// no more calls to `handler` happen after that.
    ///
    /// # Arguments
    ///
    /// * `topic` - Topic to consume
    /// * `mode` - See [`ConsumptionMode`]
    /// * `handler` - Invoked for every record
    /// * `cancel` - Stops the consumption once cancelled
    pub async fn consume(
        &self,
        topic: &str,
        mode: &ConsumptionMode,
        handler: RecordHandler,
        cancel: CancellationToken,
    ) -> ConsumptionResult<ConsumptionEnd> {
        match mode {
            ConsumptionMode::Group {
                id,
            } => self.consume_as_group(topic, id, handler, cancel).await,
            ConsumptionMode::GroupLess {
                start,
            } => self.consume_partitions(topic, *start, handler, cancel).await,
        }
    }

    async fn consume_as_group(
        &self,
        topic: &str,
        group: &str,
        handler: RecordHandler,
        cancel: CancellationToken,
    ) -> ConsumptionResult<ConsumptionEnd> {
        let mut stream = self.source.open_group_stream(topic, group).await.map_err(|source| {
            ConsumptionError::GroupStreamOpen {
                topic: topic.to_string(),
                group: group.to_string(),
                source,
            }
        })?;
        info!("Consuming Topic '{topic}' as Group '{group}'");

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Consumption of Topic '{topic}' as Group '{group}' cancelled");
                    return Ok(ConsumptionEnd::Cancelled);
                },
                event = stream.next_event() => match event {
                    Some(StreamEvent::Record(record)) => {
                        handler(&record).map_err(|reason| ConsumptionError::Handler {
                            topic: record.topic.clone(),
                            partition: record.partition,
                            offset: record.offset,
                            reason,
                        })?;

                        if let Err(e) = stream.commit(&record) {
                            warn!(
                                "Failed to commit offset {} of '{}:{}' for Group '{group}': {e}",
                                record.offset, record.topic, record.partition
                            );
                        }
                    },
                    Some(StreamEvent::Error(source)) => {
                        return Err(ConsumptionError::GroupStream {
                            topic: topic.to_string(),
                            group: group.to_string(),
                            source,
                        });
                    },
                    None => {
                        info!("Stream of Topic '{topic}' for Group '{group}' closed");
                        return Ok(ConsumptionEnd::StreamClosed);
                    },
                },
            }
        }
    }

    async fn consume_partitions(
        &self,
        topic: &str,
        start: StartOffset,
        handler: RecordHandler,
        cancel: CancellationToken,
    ) -> ConsumptionResult<ConsumptionEnd> {
        let partitions = self.source.get_partitions(topic).await.map_err(|source| {
            ConsumptionError::PartitionsListing {
                topic: topic.to_string(),
                source,
            }
        })?;
        info!("Consuming {} partitions of Topic '{topic}' from {start:?}", partitions.len());

        // Every worker reports at most one error: sending never blocks
        let (err_tx, mut err_rx) = mpsc::channel(partitions.len().max(1));

        let workers = partitions
            .into_iter()
            .map(|partition| {
                tokio::spawn(consume_partition(
                    self.source.clone(),
                    topic.to_string(),
                    partition,
                    start,
                    handler.clone(),
                    cancel.clone(),
                    err_tx.clone(),
                ))
            })
            .collect::<Vec<_>>();

        // Only workers hold a sender now: the channel closes once they are all done
        drop(err_tx);

        tokio::select! {
            res = err_rx.recv() => match res {
                Some(e) => {
                    warn!("Consumption of Topic '{topic}' failed: {e}");
                    Err(e)
                },
                None => {
                    info!("All streams of Topic '{topic}' closed");
                    Ok(ConsumptionEnd::StreamClosed)
                },
            },
            _ = cancel.cancelled() => {
                for w in workers {
                    if let Err(e) = w.await {
                        error!("Partition worker of Topic '{topic}' did not shut down cleanly: {e}");
                    }
                }
                info!("Consumption of Topic '{topic}' cancelled");
                Ok(ConsumptionEnd::Cancelled)
            },
        }
    }
}

/// Worker consuming a single Topic Partition.
///
/// Waits on the next record, the next stream error or the cancellation, whichever comes first.
async fn consume_partition(
    source: Arc<dyn ClusterFactSource>,
    topic: String,
    partition: i32,
    start: StartOffset,
    handler: RecordHandler,
    cancel: CancellationToken,
    err_tx: mpsc::Sender<ConsumptionError>,
) {
    let mut stream = match source.open_partition_stream(&topic, partition, start).await {
        Ok(s) => s,
        Err(source) => {
            let _ = err_tx
                .send(ConsumptionError::PartitionStreamOpen {
                    topic,
                    partition,
                    source,
                })
                .await;
            return;
        },
    };
    let tp = TopicPartition::new(topic.as_str(), partition);
    debug!("Worker of '{tp}' started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Worker of '{tp}' cancelled");
                break;
            },
            event = stream.next_event() => match event {
                Some(StreamEvent::Record(record)) => {
                    if let Err(reason) = handler(&record) {
                        let _ = err_tx
                            .send(ConsumptionError::Handler {
                                topic: record.topic,
                                partition: record.partition,
                                offset: record.offset,
                                reason,
                            })
                            .await;
                        break;
                    }
                },
                Some(StreamEvent::Error(source)) => {
                    let _ = err_tx
                        .send(ConsumptionError::PartitionStream {
                            topic: topic.clone(),
                            partition,
                            source,
                        })
                        .await;
                    break;
                },
                None => {
                    debug!("Stream of '{tp}' closed");
                    break;
                },
            },
        }
    }
}
