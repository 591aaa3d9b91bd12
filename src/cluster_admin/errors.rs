use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

use crate::fact_source::is_transport_failure;

/// Possible errors returned by a [`super::ClusterAdmin`].
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Topic '{0}' already exists")]
    TopicAlreadyExists(String),

    #[error("Topic '{0}' not found")]
    TopicNotFound(String),

    #[error("Operation on Topic '{0}' failed: {1}")]
    TopicOperation(String, RDKafkaErrorCode),

    #[error("Kafka client error: {0}")]
    Kafka(#[from] KafkaError),
}

impl AdminError {
    /// `true` if the cluster could not be reached at all.
    pub fn is_connection(&self) -> bool {
        match self {
            AdminError::Kafka(ke) => {
                matches!(ke, KafkaError::ClientCreation(_)) || is_transport_failure(ke)
            },
            _ => false,
        }
    }
}

pub type AdminResult<T> = Result<T, AdminError>;
