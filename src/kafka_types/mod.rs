mod broker;
mod group;
mod offsets;
mod record;
mod topic;
mod topic_partition;

pub use broker::Broker;
pub use group::{GroupDescription, GroupMember};
pub use offsets::{CommittedOffset, StartOffset};
pub use record::ConsumedRecord;
pub use topic::TopicDetail;
pub use topic_partition::TopicPartition;
