use thiserror::Error;

use crate::fact_source::FactSourceError;

/// Possible errors from the [`super::MetadataAggregator`].
///
/// Only failures that prevent the whole aggregation are reported:
/// lookups failing for a single partition are skipped.
#[derive(Error, Debug)]
pub enum ClusterMetadataError {
    #[error("Failed to list Brokers: {0}")]
    BrokersListing(#[source] FactSourceError),

    #[error("Failed to list Topics: {0}")]
    TopicsListing(#[source] FactSourceError),
}

impl ClusterMetadataError {
    /// Underlying [`FactSourceError`].
    pub fn fact_source_error(&self) -> &FactSourceError {
        match self {
            ClusterMetadataError::BrokersListing(e) | ClusterMetadataError::TopicsListing(e) => e,
        }
    }
}

pub type ClusterMetadataResult<T> = Result<T, ClusterMetadataError>;
