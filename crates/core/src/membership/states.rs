use serde::{Deserialize, Serialize};

use crate::domain::{Conversation, ConversationId, ModerationMode, OrgId, PersonId};
use crate::policy::{MembershipPolicy, Verdict};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipState {
    NotMember,
    Member(ModerationMode),
}

/// Lifecycle events about the agent's own membership.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    Added { conversation: Conversation, added_by: PersonId },
    Removed { conversation: ConversationId },
    Updated { conversation: ConversationId },
}

impl MembershipEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::Updated { .. } => "updated",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipContext<'a> {
    pub agent_org: &'a OrgId,
    pub policy: &'a MembershipPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipAction {
    PostOutsideOrgNotice { conversation: ConversationId },
    Leave { conversation: ConversationId },
    RequestPromotion { person: PersonId, conversation: ConversationId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: MembershipState,
    pub to: MembershipState,
    pub event: String,
    pub verdict: Option<Verdict>,
    /// Ordered; a notice must be posted before leaving.
    pub actions: Vec<MembershipAction>,
}
