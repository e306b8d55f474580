use crate::domain::ModerationMode;
use crate::membership::states::{
    MembershipAction, MembershipContext, MembershipEvent, MembershipState, TransitionOutcome,
};
use crate::policy::accept_membership;

/// Pure membership state machine. It never performs the actions it emits and
/// keeps no state between events: the caller supplies the state the platform
/// currently reports.
#[derive(Clone, Debug, Default)]
pub struct MembershipMachine;

impl MembershipMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        current: MembershipState,
        event: &MembershipEvent,
        context: &MembershipContext<'_>,
    ) -> TransitionOutcome {
        use MembershipAction::{Leave, PostOutsideOrgNotice, RequestPromotion};
        use MembershipState::{Member, NotMember};

        let (to, verdict, actions) = match event {
            MembershipEvent::Added { conversation, added_by } => {
                let verdict = accept_membership(conversation, context.agent_org, context.policy);
                if !verdict.is_allowed() {
                    let actions = vec![
                        PostOutsideOrgNotice { conversation: conversation.id.clone() },
                        Leave { conversation: conversation.id.clone() },
                    ];
                    (NotMember, Some(verdict), actions)
                } else {
                    let actions = match conversation.moderation {
                        ModerationMode::Announcement => vec![RequestPromotion {
                            person: added_by.clone(),
                            conversation: conversation.id.clone(),
                        }],
                        ModerationMode::Open => Vec::new(),
                    };
                    (Member(conversation.moderation), Some(verdict), actions)
                }
            }
            MembershipEvent::Removed { .. } => (NotMember, None, Vec::new()),
            MembershipEvent::Updated { .. } => (current, None, Vec::new()),
        };

        TransitionOutcome { from: current, to, event: event.name().to_owned(), verdict, actions }
    }
}
