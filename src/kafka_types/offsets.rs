use serde::Deserialize;

/// Offset committed by a Consumer Group for a Topic Partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommittedOffset {
    /// The Group committed this offset.
    Committed(i64),

    /// The Group has not committed anything for the Topic Partition yet.
    Uncommitted,
}

impl From<i64> for CommittedOffset {
    /// Kafka reports "no commit yet" with a negative offset (`-1`).
    fn from(offset: i64) -> Self {
        if offset < 0 {
            CommittedOffset::Uncommitted
        } else {
            CommittedOffset::Committed(offset)
        }
    }
}

/// Where a group-less consumption starts reading each partition from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    /// Oldest offset still available in the partition
    Earliest,

    /// Only records produced after the consumption began
    #[default]
    Latest,
}
