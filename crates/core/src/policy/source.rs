use crate::domain::{Conversation, Identity, OrgId};
use crate::policy::{DenyReason, MembershipPolicy, SourcePolicy, Verdict};

/// Decides whether `author` may trigger a broadcast.
///
/// The sender list, when enabled, is the only rule consulted: configuring both
/// restrictions means the list governs and org membership is not checked.
pub fn authorize(author: &Identity, agent_org: &OrgId, policy: &SourcePolicy) -> Verdict {
    if policy.restrict_to_sender_list {
        let listed = policy.sender_list.iter().any(|key| author.matches_key(key));
        return if listed { Verdict::Allow } else { Verdict::Deny(DenyReason::NotInSenderList) };
    }

    if policy.restrict_to_own_org && &author.org_id != agent_org {
        return Verdict::Deny(DenyReason::ForeignOrganization);
    }

    Verdict::Allow
}

/// Decides whether the agent may remain in a conversation it was added to.
pub fn accept_membership(
    conversation: &Conversation,
    agent_org: &OrgId,
    policy: &MembershipPolicy,
) -> Verdict {
    if policy.restrict_to_own_org && !conversation.is_owned_by(agent_org) {
        return Verdict::Deny(DenyReason::ForeignOrganization);
    }
    Verdict::Allow
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{accept_membership, authorize};
    use crate::domain::{Conversation, ConversationKind, Identity, OrgId};
    use crate::policy::{DenyReason, MembershipPolicy, SourcePolicy, Verdict};

    fn author(org: &str) -> Identity {
        Identity::new("P-AUTHOR", "Ada Lovelace", "ada@example.com", org)
    }

    fn sender_list(entries: &[&str]) -> BTreeSet<String> {
        entries.iter().map(|entry| (*entry).to_owned()).collect()
    }

    #[test]
    fn sender_list_governs_regardless_of_org() {
        let agent_org = OrgId("ORG-X".to_owned());
        for restrict_to_own_org in [false, true] {
            let listed = SourcePolicy {
                restrict_to_own_org,
                restrict_to_sender_list: true,
                sender_list: sender_list(&["P-AUTHOR"]),
            };
            let unlisted =
                SourcePolicy { sender_list: sender_list(&["P-OTHER"]), ..listed.clone() };

            assert_eq!(authorize(&author("ORG-Y"), &agent_org, &listed), Verdict::Allow);
            assert_eq!(authorize(&author("ORG-X"), &agent_org, &listed), Verdict::Allow);
            assert_eq!(
                authorize(&author("ORG-X"), &agent_org, &unlisted),
                Verdict::Deny(DenyReason::NotInSenderList)
            );
        }
    }

    #[test]
    fn sender_list_matches_primary_email() {
        let policy = SourcePolicy {
            restrict_to_own_org: false,
            restrict_to_sender_list: true,
            sender_list: sender_list(&["Ada@Example.com"]),
        };

        let verdict = authorize(&author("ORG-Y"), &OrgId("ORG-X".to_owned()), &policy);
        assert!(verdict.is_allowed());
    }

    #[test]
    fn empty_sender_list_denies_everyone() {
        let policy = SourcePolicy {
            restrict_to_own_org: false,
            restrict_to_sender_list: true,
            sender_list: BTreeSet::new(),
        };

        let verdict = authorize(&author("ORG-X"), &OrgId("ORG-X".to_owned()), &policy);
        assert_eq!(verdict, Verdict::Deny(DenyReason::NotInSenderList));
    }

    #[test]
    fn own_org_restriction_compares_author_and_agent_org() {
        let policy = SourcePolicy::default();
        let agent_org = OrgId("ORG-X".to_owned());

        assert_eq!(authorize(&author("ORG-X"), &agent_org, &policy), Verdict::Allow);
        assert_eq!(
            authorize(&author("ORG-Y"), &agent_org, &policy),
            Verdict::Deny(DenyReason::ForeignOrganization)
        );
    }

    #[test]
    fn unrestricted_policy_allows_unconditionally() {
        let policy = SourcePolicy {
            restrict_to_own_org: false,
            restrict_to_sender_list: false,
            sender_list: sender_list(&["P-OTHER"]),
        };

        assert!(authorize(&author("ORG-Z"), &OrgId("ORG-X".to_owned()), &policy).is_allowed());
    }

    #[test]
    fn membership_restriction_rejects_foreign_and_unknown_owners() {
        let agent_org = OrgId("ORG-X".to_owned());
        let policy = MembershipPolicy { restrict_to_own_org: true };

        let own = Conversation::new("R-1", ConversationKind::Group, Some("ORG-X"));
        let foreign = Conversation::new("R-2", ConversationKind::Group, Some("ORG-Y"));
        let unknown = Conversation::new("R-3", ConversationKind::Group, None);

        assert!(accept_membership(&own, &agent_org, &policy).is_allowed());
        assert!(!accept_membership(&foreign, &agent_org, &policy).is_allowed());
        assert!(!accept_membership(&unknown, &agent_org, &policy).is_allowed());
        assert!(accept_membership(&foreign, &agent_org, &MembershipPolicy::default()).is_allowed());
    }
}
