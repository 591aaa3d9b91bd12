use rdkafka::metadata::MetadataTopic;

/// Topic as listed by the cluster: name, partition count and replication factor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TopicDetail {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i16,
}

impl From<&MetadataTopic> for TopicDetail {
    fn from(t: &MetadataTopic) -> Self {
        TopicDetail {
            name: t.name().to_owned(),
            partitions: t.partitions().len() as i32,
            // Kafka has no per-topic replication factor in metadata: the first partition
            // replica set is what the admin tools report.
            replication_factor: t
                .partitions()
                .first()
                .map(|p| p.replicas().len() as i16)
                .unwrap_or_default(),
        }
    }
}
