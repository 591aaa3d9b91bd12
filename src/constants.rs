use const_format::formatcp;

pub(crate) const DEFAULT_CLUSTER_ID: &str = "__none__";

/// Prefix of internal Topics (e.g. `__consumer_offsets`, `_schemas`).
pub(crate) const INTERNAL_TOPIC_PREFIX: &str = "_";

/// Topic configuration entry holding the cleanup policy (`delete`, `compact`).
pub(crate) const CLEANUP_POLICY_CONFIG: &str = "cleanup.policy";

/// Sentinel for a Consumer Group coordinator that could not be resolved.
pub(crate) const UNKNOWN_COORDINATOR: i32 = -1;

/// Key of the synthetic record that sums up throughput across all Topics.
pub(crate) const THROUGHPUT_TOTAL_KEY: &str = "total";

/// This is the Consumer Group (`group.id`) value set on group-less partition consumers,
/// unless one was explicitly configured. Those consumers never commit.
pub(crate) const PARTITION_CONSUMER_GROUP: &str =
    formatcp!("__{}_partition_consumer", env!("CARGO_PKG_NAME"));

pub(crate) const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_HTTP_PORT: &str = "8080";
pub(crate) const DEFAULT_FETCH_TIMEOUT_SECS: &str = "10";
pub(crate) const DEFAULT_THROUGHPUT_WINDOW_SECS: &str = "60";
pub(crate) const DEFAULT_THROUGHPUT_RATE_WINDOW_SECS: &str = "1";
