use thiserror::Error;

use crate::fact_source::FactSourceError;

/// Error returned by a [`super::coordinator::RecordHandler`]: it terminates the consumption session.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Possible errors from the [`super::coordinator`] module.
///
/// Any of these terminates the consumption it's reported by.
#[derive(Error, Debug)]
pub enum ConsumptionError {
    #[error("Failed to enumerate partitions of Topic '{topic}': {source}")]
    PartitionsListing {
        topic: String,
        source: FactSourceError,
    },

    #[error("Failed to open stream of Topic Partition '{topic}:{partition}': {source}")]
    PartitionStreamOpen {
        topic: String,
        partition: i32,
        source: FactSourceError,
    },

    #[error("Failed to open stream of Topic '{topic}' for Group '{group}': {source}")]
    GroupStreamOpen {
        topic: String,
        group: String,
        source: FactSourceError,
    },

    #[error("Stream of Topic Partition '{topic}:{partition}' failed: {source}")]
    PartitionStream {
        topic: String,
        partition: i32,
        source: FactSourceError,
    },

    #[error("Stream of Topic '{topic}' for Group '{group}' failed: {source}")]
    GroupStream {
        topic: String,
        group: String,
        source: FactSourceError,
    },

    #[error("Handler failed on record '{topic}:{partition}' at offset {offset}: {reason}")]
    Handler {
        topic: String,
        partition: i32,
        offset: i64,
        reason: HandlerError,
    },
}

pub type ConsumptionResult<T> = Result<T, ConsumptionError>;
