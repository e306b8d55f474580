use relay_core::{Conversation, ConversationKind};
use tracing::warn;

use crate::platform::{ChatPlatform, PlatformError};

/// Conversations the agent currently belongs to, plus anything that could not be read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipListing {
    pub conversations: Vec<Conversation>,
    pub warnings: Vec<String>,
}

/// Reads group and direct memberships from the platform, sorted and deduplicated by id.
///
/// Missing owners are looked up only when `resolve_owners` is set. A failing group
/// listing aborts with the platform error. A failing direct listing or owner lookup
/// degrades to a warning and a partial listing.
pub async fn list_memberships(
    platform: &dyn ChatPlatform,
    resolve_owners: bool,
) -> Result<MembershipListing, PlatformError> {
    let mut warnings = Vec::new();
    let mut conversations = platform.list_my_conversations(ConversationKind::Group).await?;

    match platform.list_my_conversations(ConversationKind::Direct).await {
        Ok(direct) => conversations.extend(direct),
        Err(error) => {
            warn!(
                event_name = "relay.memberships.direct_listing_failed",
                error = %error,
                "continuing without direct conversations"
            );
            warnings.push(format!("direct conversations unavailable: {error}"));
        }
    }

    conversations.sort_by(|left, right| left.id.cmp(&right.id));
    conversations.dedup_by(|left, right| left.id == right.id);
    if !resolve_owners {
        return Ok(MembershipListing { conversations, warnings });
    }

    for conversation in conversations.iter_mut().filter(|c| c.owner_org.is_none()) {
        match platform.resolve_conversation_org(&conversation.id).await {
            Ok(owner) => conversation.owner_org = owner,
            Err(error) => {
                warn!(
                    event_name = "relay.memberships.owner_unresolved",
                    conversation_id = %conversation.id,
                    error = %error,
                    "conversation owner could not be resolved"
                );
                warnings.push(format!("owner of {} unresolved: {error}", conversation.id));
            }
        }
    }

    Ok(MembershipListing { conversations, warnings })
}

#[cfg(test)]
mod tests {
    use relay_core::{Conversation, ConversationKind, Identity, OrgId};

    use super::list_memberships;
    use crate::memory::InMemoryPlatform;
    use crate::platform::PlatformError;

    fn agent() -> Identity {
        Identity::new("BOT", "Relay", "relay@webex.bot", "ORG-A")
    }

    #[tokio::test]
    async fn merges_group_and_direct_sorted_by_id_with_owners_filled() {
        let platform = InMemoryPlatform::new(agent())
            .with_conversation(Conversation::new("R-3", ConversationKind::Group, Some("ORG-A")))
            .with_conversation(Conversation::new("D-1", ConversationKind::Direct, None))
            .with_conversation(Conversation::new("R-1", ConversationKind::Group, Some("ORG-B")))
            .with_conversation_org("D-1", "ORG-B");

        let listing = list_memberships(&platform, true).await.expect("listing succeeds");

        let ids: Vec<&str> = listing.conversations.iter().map(|c| c.id.0.as_str()).collect();
        assert_eq!(ids, vec!["D-1", "R-1", "R-3"]);
        assert_eq!(listing.conversations[0].owner_org, Some(OrgId("ORG-B".to_owned())));
        assert!(listing.warnings.is_empty());
    }

    #[tokio::test]
    async fn owners_are_left_alone_when_not_needed() {
        let platform = InMemoryPlatform::new(agent())
            .with_conversation(Conversation::new("D-1", ConversationKind::Direct, None))
            .with_conversation_org("D-1", "ORG-B");

        let listing = list_memberships(&platform, false).await.expect("listing succeeds");

        assert_eq!(listing.conversations.len(), 1);
        assert_eq!(listing.conversations[0].owner_org, None);
        assert!(listing.warnings.is_empty());
    }

    #[tokio::test]
    async fn direct_listing_failure_degrades_to_warning() {
        let platform = InMemoryPlatform::new(agent())
            .with_conversation(Conversation::new("R-1", ConversationKind::Group, Some("ORG-A")))
            .failing_direct_listing(PlatformError::Transport("503 from rooms".to_owned()));

        let listing = list_memberships(&platform, true).await.expect("partial listing");

        assert_eq!(listing.conversations.len(), 1);
        assert_eq!(listing.warnings.len(), 1);
        assert!(listing.warnings[0].contains("direct conversations unavailable"));
    }

    #[tokio::test]
    async fn group_listing_failure_is_fatal() {
        let platform = InMemoryPlatform::new(agent())
            .failing_group_listing(PlatformError::Unauthorized("401".to_owned()));

        let error = list_memberships(&platform, true).await.expect_err("group listing must fail");

        assert_eq!(error, PlatformError::Unauthorized("401".to_owned()));
    }
}
