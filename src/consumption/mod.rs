// Inner modules
mod coordinator;
mod errors;
mod session;

// Exports
pub use coordinator::{ConsumptionMode, PartitionConsumptionCoordinator};
pub use session::ConsumptionSessions;
