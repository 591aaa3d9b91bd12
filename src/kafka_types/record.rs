use chrono::{DateTime, Utc};
use rdkafka::message::{BorrowedMessage, Message};

/// A record received from a Topic Partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&BorrowedMessage<'_>> for ConsumedRecord {
    fn from(m: &BorrowedMessage<'_>) -> Self {
        ConsumedRecord {
            topic: m.topic().to_owned(),
            partition: m.partition(),
            offset: m.offset(),
            key: m.key().map(<[u8]>::to_vec),
            payload: m.payload().map(<[u8]>::to_vec),
            timestamp: m.timestamp().to_millis().and_then(DateTime::from_timestamp_millis),
        }
    }
}
