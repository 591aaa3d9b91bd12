// Inner module
mod registry;

// Exports
pub use registry::ConsumerRegistry;
