//! Message pipeline: authorize, enumerate, select, transform, dispatch.

use std::sync::Arc;

use relay_core::{
    authorize, select_destinations, transform, ApplicationError, BroadcastReport, Conversation,
    ConversationKind, Identity, InboundMessage, MessageOutcome, TransformOutcome, Verdict,
};
use tracing::{debug, info, warn};

use crate::dispatch::BroadcastDispatcher;
use crate::enumerate::list_memberships;
use crate::events::{EventContext, MessageCreatedEvent};
use crate::platform::{ChatPlatform, PlatformError};
use crate::settings::RelaySettings;

pub struct BroadcastService {
    platform: Arc<dyn ChatPlatform>,
    settings: Arc<RelaySettings>,
    dispatcher: BroadcastDispatcher,
}

impl BroadcastService {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: Arc<RelaySettings>) -> Self {
        let dispatcher = BroadcastDispatcher::new(Arc::clone(&platform), settings.delivery_timeout);
        Self { platform, settings, dispatcher }
    }

    pub async fn handle(
        &self,
        event: &MessageCreatedEvent,
        ctx: &EventContext,
    ) -> Result<MessageOutcome, ApplicationError> {
        let agent = self.platform.agent_identity().await?;
        if is_self_authored(event, &agent) {
            debug!(
                event_name = "relay.broadcast.self_authored",
                correlation_id = %ctx.correlation_id,
                message_id = %event.message_id.0,
                "ignoring message posted by the agent"
            );
            return Ok(MessageOutcome::Ignored { reason: "message posted by the agent".to_owned() });
        }

        let message = self.platform.message(&event.message_id).await?;
        let author = self.platform.person(&message.author_id).await?;

        if let Verdict::Deny(reason) =
            authorize(&author, &agent.org_id, &self.settings.policy.source)
        {
            info!(
                event_name = "relay.policy.source_denied",
                correlation_id = %ctx.correlation_id,
                author_id = %author.id,
                reason = reason.as_str(),
                "sender is not allowed to broadcast"
            );
            return Ok(MessageOutcome::Unauthorized { author: author.id, reason });
        }

        let policy = &self.settings.policy.destination;
        let listing = list_memberships(self.platform.as_ref(), policy.filters_by_owner()).await?;
        let destinations = select_destinations(
            &listing.conversations,
            &message.conversation_id,
            &author.org_id,
            &agent.org_id,
            policy,
        );
        if destinations.is_empty() {
            info!(
                event_name = "relay.broadcast.no_destinations",
                correlation_id = %ctx.correlation_id,
                memberships = listing.conversations.len(),
                "no conversation passed the destination filters"
            );
            return Ok(MessageOutcome::NoDestinations { warnings: listing.warnings });
        }

        let mut attachments = Vec::new();
        if let Some(url) = message.files.first() {
            if message.files.len() > 1 {
                debug!(
                    event_name = "relay.broadcast.extra_files_dropped",
                    correlation_id = %ctx.correlation_id,
                    dropped = message.files.len() - 1,
                    "only the first file is replicated"
                );
            }
            match self.platform.fetch(url).await {
                Ok(attachment) => attachments.push(attachment),
                Err(error) => {
                    return Ok(self.abort_on_fetch_failure(&author, url, error, ctx).await);
                }
            }
        }

        let origin = listing
            .conversations
            .iter()
            .find(|conversation| conversation.id == message.conversation_id)
            .cloned()
            .unwrap_or_else(|| {
                Conversation::new(
                    message.conversation_id.0.clone(),
                    message.conversation_kind.unwrap_or(ConversationKind::Group),
                    None,
                )
            });
        let inbound = InboundMessage {
            id: message.id.clone(),
            author,
            origin,
            text: message.body(),
            attachments,
        };

        let TransformOutcome { payload, card_error } = transform(&inbound, self.settings.locale);
        if let Some(card_error) = card_error {
            warn!(
                event_name = "relay.transform.card_invalid",
                correlation_id = %ctx.correlation_id,
                error = %card_error,
                "card attachment failed validation; sending it as a file"
            );
        }

        let deliveries = self.dispatcher.dispatch(&payload, &destinations, ctx).await;
        let report = BroadcastReport {
            payload_kind: payload.kind().to_owned(),
            deliveries,
            warnings: listing.warnings,
        };

        info!(
            event_name = "relay.broadcast.completed",
            correlation_id = %ctx.correlation_id,
            payload_kind = %report.payload_kind,
            destinations = report.deliveries.len(),
            delivered = report.delivered_count(),
            failed = report.failures().len(),
            "broadcast finished"
        );
        Ok(MessageOutcome::Broadcast(report))
    }

    async fn abort_on_fetch_failure(
        &self,
        author: &Identity,
        url: &str,
        error: PlatformError,
        ctx: &EventContext,
    ) -> MessageOutcome {
        warn!(
            event_name = "relay.broadcast.attachment_fetch_failed",
            correlation_id = %ctx.correlation_id,
            error = %error,
            "attachment could not be downloaded; broadcast aborted"
        );

        let notice = self.settings.locale.attachment_failed(file_label(url));
        let author_notified = match self.platform.send_direct(&author.id, &notice).await {
            Ok(()) => true,
            Err(notify_error) => {
                warn!(
                    event_name = "relay.broadcast.author_notice_failed",
                    correlation_id = %ctx.correlation_id,
                    author_id = %author.id,
                    error = %notify_error,
                    "could not tell the author about the failed attachment"
                );
                false
            }
        };

        MessageOutcome::AttachmentFetchFailed { error: error.to_string(), author_notified }
    }
}

fn is_self_authored(event: &MessageCreatedEvent, agent: &Identity) -> bool {
    let same_email =
        |email: &str| !agent.email.is_empty() && email.eq_ignore_ascii_case(&agent.email);
    event.author_id == agent.id || event.author_email.as_deref().is_some_and(same_email)
}

fn file_label(url: &str) -> &str {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(url)
}
