use crate::domain::{Conversation, ConversationId, OrgId};
use crate::policy::DestinationPolicy;

/// Narrows the agent's memberships down to the broadcast fan-out set.
///
/// The origin conversation is always excluded. Each enabled filter is applied
/// independently, so with both enabled a conversation must be owned by an org
/// that is both the agent's and the author's.
pub fn select_destinations(
    memberships: &[Conversation],
    origin: &ConversationId,
    author_org: &OrgId,
    agent_org: &OrgId,
    policy: &DestinationPolicy,
) -> Vec<Conversation> {
    memberships
        .iter()
        .filter(|conversation| &conversation.id != origin)
        .filter(|conversation| !policy.restrict_to_own_org || conversation.is_owned_by(agent_org))
        .filter(|conversation| {
            !policy.restrict_to_sender_org || conversation.is_owned_by(author_org)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::select_destinations;
    use crate::domain::{Conversation, ConversationId, ConversationKind, OrgId};
    use crate::policy::DestinationPolicy;

    fn org(id: &str) -> OrgId {
        OrgId(id.to_owned())
    }

    fn memberships() -> Vec<Conversation> {
        vec![
            Conversation::new("R-1", ConversationKind::Group, Some("ORG-X")),
            Conversation::new("R-2", ConversationKind::Group, Some("ORG-Y")),
            Conversation::new("R-3", ConversationKind::Direct, None),
            Conversation::new("R-ORIGIN", ConversationKind::Direct, Some("ORG-X")),
        ]
    }

    fn ids(conversations: &[Conversation]) -> Vec<&str> {
        conversations.iter().map(|conversation| conversation.id.0.as_str()).collect()
    }

    #[test]
    fn no_filters_yield_memberships_minus_origin() {
        let policy =
            DestinationPolicy { restrict_to_own_org: false, restrict_to_sender_org: false };
        let selected = select_destinations(
            &memberships(),
            &ConversationId("R-ORIGIN".to_owned()),
            &org("ORG-Y"),
            &org("ORG-X"),
            &policy,
        );

        assert_eq!(ids(&selected), vec!["R-1", "R-2", "R-3"]);
    }

    #[test]
    fn origin_is_never_selected_under_any_policy() {
        let origin = ConversationId("R-ORIGIN".to_owned());
        for restrict_to_own_org in [false, true] {
            for restrict_to_sender_org in [false, true] {
                let policy = DestinationPolicy { restrict_to_own_org, restrict_to_sender_org };
                let (sender_org, agent_org) = (org("ORG-X"), org("ORG-X"));
                let selected =
                    select_destinations(&memberships(), &origin, &sender_org, &agent_org, &policy);
                assert!(selected.iter().all(|conversation| conversation.id != origin));
            }
        }
    }

    #[test]
    fn own_org_filter_keeps_agent_owned_conversations() {
        let policy = DestinationPolicy { restrict_to_own_org: true, restrict_to_sender_org: false };
        let selected = select_destinations(
            &memberships(),
            &ConversationId("R-ORIGIN".to_owned()),
            &org("ORG-X"),
            &org("ORG-X"),
            &policy,
        );

        assert_eq!(ids(&selected), vec!["R-1"]);
    }

    #[test]
    fn sender_org_filter_follows_author_org() {
        let policy = DestinationPolicy::default();
        let selected = select_destinations(
            &memberships(),
            &ConversationId("R-ORIGIN".to_owned()),
            &org("ORG-Y"),
            &org("ORG-X"),
            &policy,
        );

        assert_eq!(ids(&selected), vec!["R-2"]);
    }

    #[test]
    fn both_filters_with_mismatched_orgs_select_nothing() {
        let policy = DestinationPolicy { restrict_to_own_org: true, restrict_to_sender_org: true };
        let selected = select_destinations(
            &memberships(),
            &ConversationId("R-ORIGIN".to_owned()),
            &org("ORG-Y"),
            &org("ORG-X"),
            &policy,
        );

        assert!(selected.is_empty());
    }

    #[test]
    fn owners_matter_only_when_a_filter_is_enabled() {
        let open = DestinationPolicy { restrict_to_own_org: false, restrict_to_sender_org: false };

        assert!(!open.filters_by_owner());
        assert!(DestinationPolicy::default().filters_by_owner());
    }
}
