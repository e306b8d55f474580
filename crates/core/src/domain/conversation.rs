use serde::{Deserialize, Serialize};

use crate::domain::identity::OrgId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Group,
    Direct,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Direct => "direct",
        }
    }
}

/// Announcement mode restricts posting to moderators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationMode {
    #[default]
    Open,
    Announcement,
}

/// A group space or one-to-one thread. `owner_org` is `None` when the
/// platform does not report an owner and the resolver could not supply one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub kind: ConversationKind,
    pub owner_org: Option<OrgId>,
    pub moderation: ModerationMode,
}

impl Conversation {
    pub fn new(id: impl Into<String>, kind: ConversationKind, owner_org: Option<&str>) -> Self {
        Self {
            id: ConversationId(id.into()),
            title: String::new(),
            kind,
            owner_org: owner_org.map(|org| OrgId(org.to_owned())),
            moderation: ModerationMode::Open,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn moderated(mut self, moderation: ModerationMode) -> Self {
        self.moderation = moderation;
        self
    }

    pub fn is_owned_by(&self, org: &OrgId) -> bool {
        self.owner_org.as_ref() == Some(org)
    }
}
