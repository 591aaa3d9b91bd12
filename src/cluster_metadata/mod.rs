// Inner modules
mod aggregator;
mod errors;

// Exports
pub use aggregator::MetadataAggregator;
pub use errors::ClusterMetadataError;
