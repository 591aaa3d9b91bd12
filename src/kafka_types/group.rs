/// Consumer Group Member
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupMember {
    /// Identifier
    pub id: String,

    /// Topics the Member subscribed to.
    ///
    /// `None` when the Member metadata could not be decoded.
    pub subscribed_topics: Option<Vec<String>>,
}

/// Consumer Group, as described by the cluster
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupDescription {
    /// Group name
    pub group_id: String,

    /// Group state (e.g. `Stable`, `Empty`, `PreparingRebalance`)
    pub state: String,

    /// Members currently part of the Group
    pub members: Vec<GroupMember>,
}
