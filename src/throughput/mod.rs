// Inner modules
mod errors;
mod tracker;
mod window;

// Exports
pub use errors::ThroughputError;
pub use tracker::ThroughputTracker;
