use thiserror::Error;

use crate::fact_source::FactSourceError;

/// Possible errors from the [`super::LagAggregator`].
#[derive(Error, Debug)]
pub enum LagError {
    #[error("Failed to list Consumer Groups: {0}")]
    GroupsListing(#[source] FactSourceError),

    #[error("Failed to describe Consumer Groups: {0}")]
    GroupsDescription(#[source] FactSourceError),

    #[error("Consumer Group '{0}' not found")]
    GroupNotFound(String),
}

impl LagError {
    /// Underlying [`FactSourceError`], if the error was caused by the cluster.
    pub fn fact_source_error(&self) -> Option<&FactSourceError> {
        match self {
            LagError::GroupsListing(e) | LagError::GroupsDescription(e) => Some(e),
            LagError::GroupNotFound(_) => None,
        }
    }
}

pub type LagResult<T> = Result<T, LagError>;
