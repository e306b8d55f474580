use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use relay_core::{
    ApplicationError, ConversationId, DomainError, InterfaceError, MembershipOutcome, MessageId,
    MessageOutcome, PersonId,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::platform::AgentMembership;
use crate::{broadcast::BroadcastService, membership::MembershipService};

/// One webhook delivery, parsed from the platform's JSON notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookEnvelope {
    pub webhook_id: String,
    pub event: PlatformEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformEvent {
    MessageCreated(MessageCreatedEvent),
    MembershipChanged(MembershipChangeEvent),
    Unsupported { resource: String, event: String },
}

impl PlatformEvent {
    pub fn event_type(&self) -> PlatformEventType {
        match self {
            Self::MessageCreated(_) => PlatformEventType::Message,
            Self::MembershipChanged(_) => PlatformEventType::Membership,
            Self::Unsupported { .. } => PlatformEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlatformEventType {
    Message,
    Membership,
    Unsupported,
}

impl PlatformEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "messages",
            Self::Membership => "memberships",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub author_id: PersonId,
    pub author_email: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipChange {
    Created,
    Deleted,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipChangeEvent {
    pub membership_id: String,
    pub conversation_id: ConversationId,
    /// Whose membership changed.
    pub person_id: PersonId,
    /// Who performed the change.
    pub actor_id: Option<PersonId>,
    pub change: MembershipChange,
}

impl MembershipChangeEvent {
    pub fn membership(&self) -> AgentMembership {
        AgentMembership {
            id: self.membership_id.clone(),
            conversation: self.conversation_id.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWebhook {
    #[serde(default)]
    id: String,
    resource: String,
    event: String,
    actor_id: Option<String>,
    data: RawWebhookData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWebhookData {
    id: String,
    room_id: Option<String>,
    person_id: Option<String>,
    person_email: Option<String>,
}

impl WebhookEnvelope {
    pub fn parse(raw: &Value) -> Result<Self, DomainError> {
        let webhook: RawWebhook = RawWebhook::deserialize(raw)
            .map_err(|error| DomainError::MalformedEvent(error.to_string()))?;
        let RawWebhookData { id, room_id, person_id, person_email } = webhook.data;

        let event = match (webhook.resource.as_str(), webhook.event.as_str()) {
            ("messages", "created") => PlatformEvent::MessageCreated(MessageCreatedEvent {
                message_id: MessageId(id),
                conversation_id: ConversationId(required(room_id, "data.roomId")?),
                author_id: PersonId(required(person_id, "data.personId")?),
                author_email: person_email,
            }),
            ("memberships", change) => {
                let change = match change {
                    "created" => MembershipChange::Created,
                    "deleted" => MembershipChange::Deleted,
                    "updated" => MembershipChange::Updated,
                    other => {
                        return Ok(Self::unsupported(webhook.id, "memberships", other));
                    }
                };
                PlatformEvent::MembershipChanged(MembershipChangeEvent {
                    membership_id: id,
                    conversation_id: ConversationId(required(room_id, "data.roomId")?),
                    person_id: PersonId(required(person_id, "data.personId")?),
                    actor_id: webhook.actor_id.map(PersonId),
                    change,
                })
            }
            (resource, event) => return Ok(Self::unsupported(webhook.id, resource, event)),
        };

        Ok(Self { webhook_id: webhook.id, event })
    }

    fn unsupported(webhook_id: String, resource: &str, event: &str) -> Self {
        Self {
            webhook_id,
            event: PlatformEvent::Unsupported {
                resource: resource.to_owned(),
                event: event.to_owned(),
            },
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, DomainError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DomainError::MalformedEvent(format!("missing `{field}`")))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

impl EventContext {
    /// Correlates on the id of the resource the notification is about, so
    /// redeliveries of the same event share one id.
    pub fn for_webhook(raw: &Value) -> Self {
        let correlation_id = raw
            .pointer("/data/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self { correlation_id }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Message(MessageOutcome),
    Membership(MembershipOutcome),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error("expected a {expected} event, got {actual}")]
    UnexpectedEvent { expected: &'static str, actual: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Malformed(#[from] DomainError),
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

impl DispatchError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let application = match self {
            Self::Malformed(error) => ApplicationError::Domain(error),
            Self::Handler(EventHandlerError::Application(error)) => error,
            Self::Handler(error @ EventHandlerError::UnexpectedEvent { .. }) => {
                ApplicationError::Domain(DomainError::MalformedEvent(error.to_string()))
            }
        };
        application.into_interface(correlation_id)
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> PlatformEventType;
    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<PlatformEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &WebhookEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub struct MessageEventHandler {
    service: BroadcastService,
}

impl MessageEventHandler {
    pub fn new(service: BroadcastService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for MessageEventHandler {
    fn event_type(&self) -> PlatformEventType {
        PlatformEventType::Message
    }

    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let PlatformEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.service.handle(event, ctx).await?;
        Ok(HandlerResult::Message(outcome))
    }
}

pub struct MembershipEventHandler {
    service: MembershipService,
}

impl MembershipEventHandler {
    pub fn new(service: MembershipService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for MembershipEventHandler {
    fn event_type(&self) -> PlatformEventType {
        PlatformEventType::Membership
    }

    async fn handle(
        &self,
        envelope: &WebhookEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let PlatformEvent::MembershipChanged(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = self.service.handle(event, ctx).await?;
        Ok(HandlerResult::Membership(outcome))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use relay_core::{ApplicationError, DomainError, InterfaceError, MessageOutcome};
    use serde_json::json;

    use super::{
        DispatchError, EventContext, EventDispatcher, EventHandler, EventHandlerError,
        HandlerResult, MembershipChange, PlatformEvent, PlatformEventType, WebhookEnvelope,
    };

    fn message_webhook() -> serde_json::Value {
        json!({
            "id": "WH-1",
            "name": "relay messages/created",
            "resource": "messages",
            "event": "created",
            "actorId": "P-ANN",
            "data": {
                "id": "M-1",
                "roomId": "R-ORIGIN",
                "roomType": "group",
                "personId": "P-ANN",
                "personEmail": "ann@a.example"
            }
        })
    }

    #[test]
    fn parses_message_created_notification() {
        let envelope = WebhookEnvelope::parse(&message_webhook()).expect("valid webhook");

        let PlatformEvent::MessageCreated(event) = envelope.event else {
            panic!("expected a message event");
        };
        assert_eq!(envelope.webhook_id, "WH-1");
        assert_eq!(event.message_id.0, "M-1");
        assert_eq!(event.conversation_id.0, "R-ORIGIN");
        assert_eq!(event.author_email.as_deref(), Some("ann@a.example"));
    }

    #[test]
    fn parses_membership_change_with_actor() {
        let raw = json!({
            "id": "WH-2",
            "resource": "memberships",
            "event": "created",
            "actorId": "P-ADDER",
            "data": {"id": "MS-1", "roomId": "R-NEW", "personId": "BOT"}
        });

        let envelope = WebhookEnvelope::parse(&raw).expect("valid webhook");

        let PlatformEvent::MembershipChanged(event) = envelope.event else {
            panic!("expected a membership event");
        };
        assert_eq!(event.change, MembershipChange::Created);
        assert_eq!(event.actor_id.map(|id| id.0), Some("P-ADDER".to_owned()));
    }

    #[test]
    fn unknown_resources_are_unsupported_not_errors() {
        let raw = json!({
            "resource": "attachmentActions",
            "event": "created",
            "data": {"id": "AA-1"}
        });

        let envelope = WebhookEnvelope::parse(&raw).expect("parses");

        assert_eq!(envelope.event.event_type(), PlatformEventType::Unsupported);
    }

    #[test]
    fn message_without_room_is_malformed() {
        let mut raw = message_webhook();
        if let Some(data) = raw["data"].as_object_mut() {
            data.remove("roomId");
        }

        let error = WebhookEnvelope::parse(&raw).expect_err("missing room");

        assert_eq!(error, DomainError::MalformedEvent("missing `data.roomId`".to_owned()));
    }

    #[test]
    fn correlation_id_comes_from_event_resource() {
        assert_eq!(EventContext::for_webhook(&message_webhook()).correlation_id, "M-1");
        assert!(!EventContext::for_webhook(&json!({})).correlation_id.is_empty());
    }

    #[test]
    fn dispatch_errors_map_to_interface_errors() {
        let malformed = DispatchError::from(DomainError::MalformedEvent("no data".to_owned()))
            .into_interface("M-9");
        let transport = DispatchError::from(EventHandlerError::from(ApplicationError::Transport(
            "503".to_owned(),
        )))
        .into_interface("M-9");

        assert!(matches!(malformed, InterfaceError::BadRequest { .. }));
        assert!(matches!(transport, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(transport.correlation_id(), "M-9");
    }

    struct StaticMessageHandler;

    #[async_trait]
    impl EventHandler for StaticMessageHandler {
        fn event_type(&self) -> PlatformEventType {
            PlatformEventType::Message
        }

        async fn handle(
            &self,
            _envelope: &WebhookEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Ok(HandlerResult::Message(MessageOutcome::Ignored { reason: "static".to_owned() }))
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_by_event_type_and_ignores_unregistered() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(StaticMessageHandler);
        let ctx = EventContext::default();

        let message = WebhookEnvelope::parse(&message_webhook()).expect("valid webhook");
        let membership = WebhookEnvelope::parse(&json!({
            "resource": "memberships",
            "event": "deleted",
            "data": {"id": "MS-2", "roomId": "R-1", "personId": "BOT"}
        }))
        .expect("valid webhook");

        assert_eq!(dispatcher.handler_count(), 1);
        assert!(matches!(
            dispatcher.dispatch(&message, &ctx).await,
            Ok(HandlerResult::Message(MessageOutcome::Ignored { .. }))
        ));
        assert_eq!(dispatcher.dispatch(&membership, &ctx).await, Ok(HandlerResult::Ignored));
    }
}
