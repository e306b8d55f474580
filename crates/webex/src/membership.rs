//! Executes the actions the membership state machine emits.

use std::sync::Arc;

use relay_core::membership::MembershipContext;
use relay_core::{
    ApplicationError, Conversation, DomainError, Identity, MembershipAction, MembershipEvent,
    MembershipMachine, MembershipOutcome, MembershipState, ModerationMode, OrgId,
};
use tracing::{debug, info, warn};

use crate::events::{EventContext, MembershipChange, MembershipChangeEvent};
use crate::markup::space_deep_link;
use crate::platform::{AgentMembership, ChatPlatform, PlatformError};
use crate::settings::RelaySettings;

pub struct MembershipService {
    platform: Arc<dyn ChatPlatform>,
    settings: Arc<RelaySettings>,
    machine: MembershipMachine,
}

impl MembershipService {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: Arc<RelaySettings>) -> Self {
        Self { platform, settings, machine: MembershipMachine::new() }
    }

    pub async fn handle(
        &self,
        event: &MembershipChangeEvent,
        ctx: &EventContext,
    ) -> Result<MembershipOutcome, ApplicationError> {
        let agent = self.platform.agent_identity().await?;
        if event.person_id != agent.id {
            debug!(
                event_name = "relay.membership.not_agent",
                correlation_id = %ctx.correlation_id,
                conversation_id = %event.conversation_id,
                "membership change concerns another person"
            );
            return Ok(MembershipOutcome::Ignored {
                reason: "membership of another person".to_owned(),
            });
        }

        // Removal and update carry no moderation mode; the machine does not read it for them.
        let (current, domain_event) = match event.change {
            MembershipChange::Created => {
                let added_by = event.actor_id.clone().ok_or_else(|| {
                    DomainError::MalformedEvent("membership created without `actorId`".to_owned())
                })?;
                let Some(conversation) = self.joined_conversation(event, ctx).await? else {
                    info!(
                        event_name = "relay.membership.already_gone",
                        correlation_id = %ctx.correlation_id,
                        conversation_id = %event.conversation_id,
                        membership_id = %event.membership_id,
                        "agent is no longer in the conversation; nothing to do"
                    );
                    return Ok(MembershipOutcome::Ignored {
                        reason: "agent is no longer a member".to_owned(),
                    });
                };
                (MembershipState::NotMember, MembershipEvent::Added { conversation, added_by })
            }
            MembershipChange::Deleted => (
                MembershipState::Member(ModerationMode::Open),
                MembershipEvent::Removed { conversation: event.conversation_id.clone() },
            ),
            MembershipChange::Updated => (
                MembershipState::Member(ModerationMode::Open),
                MembershipEvent::Updated { conversation: event.conversation_id.clone() },
            ),
        };

        let context = MembershipContext {
            agent_org: &agent.org_id,
            policy: &self.settings.policy.membership,
        };
        let transition = self.machine.apply(current, &domain_event, &context);
        info!(
            event_name = "relay.membership.transition",
            correlation_id = %ctx.correlation_id,
            conversation_id = %event.conversation_id,
            membership_event = transition.event.as_str(),
            from = ?transition.from,
            to = ?transition.to,
            actions = transition.actions.len(),
            "membership transition computed"
        );

        let joined = match &domain_event {
            MembershipEvent::Added { conversation, .. } => Some(conversation),
            _ => None,
        };
        let membership = event.membership();
        let action_errors =
            self.execute(&transition.actions, &agent, joined, &membership, ctx).await;

        Ok(MembershipOutcome::Applied { transition, action_errors })
    }

    /// The conversation the agent was added to, or `None` when the membership is already
    /// gone, as on a redelivered add after the agent left.
    async fn joined_conversation(
        &self,
        event: &MembershipChangeEvent,
        ctx: &EventContext,
    ) -> Result<Option<Conversation>, ApplicationError> {
        if !self.platform.membership_active(&event.membership()).await? {
            return Ok(None);
        }
        let mut conversation = match self.platform.conversation(&event.conversation_id).await {
            Ok(conversation) => conversation,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        if conversation.owner_org.is_none() {
            match self.platform.resolve_conversation_org(&conversation.id).await {
                Ok(owner) => conversation.owner_org = owner,
                Err(error) => warn!(
                    event_name = "relay.membership.owner_unresolved",
                    correlation_id = %ctx.correlation_id,
                    conversation_id = %conversation.id,
                    error = %error,
                    "treating conversation owner as unknown"
                ),
            }
        }
        Ok(Some(conversation))
    }

    /// Runs actions in order. A failing action is recorded and does not stop the rest,
    /// so a failed notice still leaves the conversation.
    async fn execute(
        &self,
        actions: &[MembershipAction],
        agent: &Identity,
        joined: Option<&Conversation>,
        membership: &AgentMembership,
        ctx: &EventContext,
    ) -> Vec<String> {
        let locale = self.settings.locale;
        let mut errors = Vec::new();

        for action in actions {
            let result = match action {
                MembershipAction::PostOutsideOrgNotice { conversation } => {
                    let org_name = self.org_display_name(&agent.org_id).await;
                    self.platform.send_message(conversation, &locale.outside_org(&org_name)).await
                }
                MembershipAction::Leave { .. } => {
                    self.platform.leave_conversation(membership).await
                }
                MembershipAction::RequestPromotion { person, conversation } => {
                    let title = joined
                        .filter(|joined| !joined.title.is_empty())
                        .map_or(conversation.0.as_str(), |joined| joined.title.as_str());
                    let link = space_deep_link(conversation);
                    let text = locale.space_moderated(title, link.as_deref());
                    self.platform.send_direct(person, &text).await
                }
            };

            match result {
                Ok(()) => debug!(
                    event_name = "relay.membership.action_done",
                    correlation_id = %ctx.correlation_id,
                    action = action_label(action),
                    "membership action performed"
                ),
                Err(error) => {
                    warn!(
                        event_name = "relay.membership.action_failed",
                        correlation_id = %ctx.correlation_id,
                        action = action_label(action),
                        error = %error,
                        "membership action failed"
                    );
                    errors.push(format!("{}: {error}", action_label(action)));
                }
            }
        }

        errors
    }

    async fn org_display_name(&self, org: &OrgId) -> String {
        match self.platform.organization_name(org).await {
            Ok(name) if !name.trim().is_empty() => name,
            _ => org.0.clone(),
        }
    }
}

fn action_label(action: &MembershipAction) -> &'static str {
    match action {
        MembershipAction::PostOutsideOrgNotice { .. } => "post_outside_org_notice",
        MembershipAction::Leave { .. } => "leave",
        MembershipAction::RequestPromotion { .. } => "request_promotion",
    }
}
