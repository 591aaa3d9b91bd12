use thiserror::Error;

use crate::fact_source::FactSourceError;

/// Possible errors from the [`super::ThroughputTracker`].
#[derive(Error, Debug)]
pub enum ThroughputError {
    #[error("Failed to list Topics: {0}")]
    TopicsListing(#[source] FactSourceError),

    #[error("Failed to list Consumer Groups: {0}")]
    GroupsListing(#[source] FactSourceError),
}

impl ThroughputError {
    /// Underlying [`FactSourceError`].
    pub fn fact_source_error(&self) -> &FactSourceError {
        match self {
            ThroughputError::TopicsListing(e) | ThroughputError::GroupsListing(e) => e,
        }
    }
}

pub type ThroughputResult<T> = Result<T, ThroughputError>;
