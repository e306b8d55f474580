use std::sync::Arc;

use relay_core::{MembershipOutcome, MessageOutcome};
use serde_json::Value;
use tracing::{info, warn};

use crate::broadcast::BroadcastService;
use crate::events::{
    DispatchError, EventContext, EventDispatcher, EventHandlerError, HandlerResult,
    MembershipEventHandler, MessageEventHandler, PlatformEventType, WebhookEnvelope,
};
use crate::membership::MembershipService;
use crate::platform::ChatPlatform;
use crate::settings::RelaySettings;

/// Builds the dispatcher with the message and membership handlers wired to `platform`.
pub fn default_dispatcher(
    platform: Arc<dyn ChatPlatform>,
    settings: Arc<RelaySettings>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageEventHandler::new(BroadcastService::new(
        Arc::clone(&platform),
        Arc::clone(&settings),
    )));
    dispatcher.register(MembershipEventHandler::new(MembershipService::new(platform, settings)));
    dispatcher
}

/// Entry points the HTTP transport calls with raw webhook notifications.
pub struct RelayEngine {
    dispatcher: EventDispatcher,
}

impl RelayEngine {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: Arc<RelaySettings>) -> Self {
        Self { dispatcher: default_dispatcher(platform, settings) }
    }

    pub async fn handle_event(
        &self,
        raw: &Value,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let envelope = parse(raw, ctx)?;
        self.dispatch(&envelope, ctx).await
    }

    pub async fn handle_message_event(
        &self,
        raw: &Value,
        ctx: &EventContext,
    ) -> Result<MessageOutcome, DispatchError> {
        let envelope = expect_type(parse(raw, ctx)?, PlatformEventType::Message)?;
        match self.dispatch(&envelope, ctx).await? {
            HandlerResult::Message(outcome) => Ok(outcome),
            _ => Err(unexpected(PlatformEventType::Message, PlatformEventType::Unsupported)),
        }
    }

    pub async fn handle_membership_event(
        &self,
        raw: &Value,
        ctx: &EventContext,
    ) -> Result<MembershipOutcome, DispatchError> {
        let envelope = expect_type(parse(raw, ctx)?, PlatformEventType::Membership)?;
        match self.dispatch(&envelope, ctx).await? {
            HandlerResult::Membership(outcome) => Ok(outcome),
            _ => Err(unexpected(PlatformEventType::Membership, PlatformEventType::Unsupported)),
        }
    }

    async fn dispatch(
        &self,
        envelope: &WebhookEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        info!(
            event_name = "ingress.webhook.received",
            correlation_id = %ctx.correlation_id,
            webhook_id = %envelope.webhook_id,
            event_type = envelope.event.event_type().as_str(),
            "received webhook notification"
        );

        let result = self.dispatcher.dispatch(envelope, ctx).await;
        match &result {
            Ok(HandlerResult::Ignored) => info!(
                event_name = "ingress.webhook.ignored",
                correlation_id = %ctx.correlation_id,
                "no handler for webhook notification"
            ),
            Ok(_) => info!(
                event_name = "ingress.webhook.handled",
                correlation_id = %ctx.correlation_id,
                "webhook notification handled"
            ),
            Err(error) => warn!(
                event_name = "ingress.webhook.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "webhook notification failed"
            ),
        }
        result
    }
}

fn parse(raw: &Value, ctx: &EventContext) -> Result<WebhookEnvelope, DispatchError> {
    WebhookEnvelope::parse(raw).map_err(|error| {
        warn!(
            event_name = "ingress.webhook.malformed",
            correlation_id = %ctx.correlation_id,
            error = %error,
            "rejecting malformed webhook notification"
        );
        DispatchError::from(error)
    })
}

fn expect_type(
    envelope: WebhookEnvelope,
    expected: PlatformEventType,
) -> Result<WebhookEnvelope, DispatchError> {
    let actual = envelope.event.event_type();
    if actual == expected {
        Ok(envelope)
    } else {
        Err(unexpected(expected, actual))
    }
}

fn unexpected(expected: PlatformEventType, actual: PlatformEventType) -> DispatchError {
    DispatchError::from(EventHandlerError::UnexpectedEvent {
        expected: expected.as_str(),
        actual: actual.as_str(),
    })
}
