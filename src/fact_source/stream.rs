use tokio::sync::mpsc;

use super::errors::{FactSourceError, FactSourceResult};
use crate::kafka_types::ConsumedRecord;

/// What a [`RecordStream`] can yield.
#[derive(Debug)]
pub enum StreamEvent {
    Record(ConsumedRecord),
    Error(FactSourceError),
}

/// Records progress of a Consumer Group after a record has been handled.
pub trait OffsetCommitter: Send + Sync {
    fn commit(&self, record: &ConsumedRecord) -> FactSourceResult<()>;
}

/// A stream of records (and stream errors) coming from the cluster.
///
/// Records and errors travel on two separate channels, so that a consumer can wait on
/// either of them, as well as on its own shutdown signal, in a single `select!`.
///
/// Dropping the stream closes both channels: the producing side is expected to notice
/// via [`RecordStreamSender::closed`] and release its resources.
pub struct RecordStream {
    records: mpsc::Receiver<ConsumedRecord>,
    errors: mpsc::Receiver<FactSourceError>,
    committer: Option<Box<dyn OffsetCommitter>>,
}

/// Producing half of a [`RecordStream`].
#[derive(Clone)]
pub struct RecordStreamSender {
    records: mpsc::Sender<ConsumedRecord>,
    errors: mpsc::Sender<FactSourceError>,
}

impl RecordStream {
    /// Create a connected pair of [`RecordStreamSender`] and [`RecordStream`].
    ///
    /// # Arguments
    ///
    /// * `capacity` - How many records can be buffered before the sender has to wait
    pub fn channel(capacity: usize) -> (RecordStreamSender, RecordStream) {
        let (records_tx, records_rx) = mpsc::channel(capacity);
        // A stream terminates on its first error: no need to buffer more than one.
        let (errors_tx, errors_rx) = mpsc::channel(1);

        (
            RecordStreamSender {
                records: records_tx,
                errors: errors_tx,
            },
            RecordStream {
                records: records_rx,
                errors: errors_rx,
                committer: None,
            },
        )
    }

    /// Attach the [`OffsetCommitter`] used by [`Self::commit`].
    pub fn with_committer(mut self, committer: Box<dyn OffsetCommitter>) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Next [`StreamEvent`], or `None` once the producing side is gone.
    ///
    /// Cancel safe: if the returned future is dropped before completion,
    /// no record or error is lost.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        tokio::select! {
            Some(record) = self.records.recv() => Some(StreamEvent::Record(record)),
            Some(error) = self.errors.recv() => Some(StreamEvent::Error(error)),
            else => None,
        }
    }

    /// Commit progress up to (and including) the given record.
    ///
    /// Streams without an [`OffsetCommitter`] have no progress to record: this is a no-op.
    pub fn commit(&self, record: &ConsumedRecord) -> FactSourceResult<()> {
        match &self.committer {
            Some(c) => c.commit(record),
            None => Ok(()),
        }
    }
}

impl RecordStreamSender {
    /// Send a record, waiting for buffer space. Returns `false` if the stream was dropped.
    pub async fn send_record(&self, record: ConsumedRecord) -> bool {
        self.records.send(record).await.is_ok()
    }

    /// Send the (terminal) stream error. Returns `false` if the stream was dropped.
    pub async fn send_error(&self, error: FactSourceError) -> bool {
        self.errors.send(error).await.is_ok()
    }

    /// Completes once the consuming [`RecordStream`] has been dropped.
    pub async fn closed(&self) {
        self.records.closed().await
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.records.is_closed()
    }
}
