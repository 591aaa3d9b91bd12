// Inner modules
mod aggregator;
mod errors;

// Exports
pub use aggregator::LagAggregator;
pub use errors::LagError;
