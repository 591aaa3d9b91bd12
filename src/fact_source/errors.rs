use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// Possible errors returned by a [`super::ClusterFactSource`].
#[derive(Error, Debug)]
pub enum FactSourceError {
    /// The cluster could not be reached, or did not answer in time.
    #[error("Unable to reach the cluster: {0}")]
    Unreachable(String),

    /// Error reported by the Kafka client.
    #[error("Kafka client error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Topic '{0}' not found")]
    TopicNotFound(String),

    #[error("Partition '{0}:{1}' not found")]
    PartitionNotFound(String, i32),

    #[error("Leader of '{0}:{1}' is unknown")]
    LeaderUnknown(String, i32),

    #[error("Coordinator of Group '{0}' is unknown")]
    CoordinatorUnknown(String),

    /// A blocking fetch could not be completed by the worker thread running it.
    #[error("Blocking fetch failed to complete: {0}")]
    BlockingFetch(String),
}

impl FactSourceError {
    /// `true` if the error means the cluster as a whole could not be reached,
    /// as opposed to a lookup failing for a single broker, partition or group.
    pub fn is_connection(&self) -> bool {
        match self {
            FactSourceError::Unreachable(_) | FactSourceError::BlockingFetch(_) => true,
            FactSourceError::Kafka(ke) => matches!(
                ke,
                KafkaError::ClientCreation(_) | KafkaError::MetadataFetch(_)
            ),
            _ => false,
        }
    }
}

/// `true` if the Kafka client gave up because no Broker could be reached in time.
pub fn is_transport_failure(ke: &KafkaError) -> bool {
    matches!(
        ke.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::AllBrokersDown
                | RDKafkaErrorCode::BrokerTransportFailure
                | RDKafkaErrorCode::OperationTimedOut
                | RDKafkaErrorCode::RequestTimedOut
        )
    )
}

pub type FactSourceResult<T> = Result<T, FactSourceError>;
