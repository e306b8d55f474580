//! Recording in-memory platform.
//!
//! Implements every collaborator trait from a fixed fixture set and records each
//! outbound call, so pipelines can be exercised without the network.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::{
    Attachment, Conversation, ConversationId, ConversationKind, Identity, MessageId, OrgId,
    PersonId,
};
use serde_json::Value;

use crate::platform::{
    AgentMembership, AttachmentSource, Directory, MembershipApi, MessagingApi, PlatformError,
    PlatformMessage, Webhook, WebhookRegistry,
};

#[derive(Clone, Debug, PartialEq)]
pub enum PlatformCall {
    Message { conversation: ConversationId, text: String },
    Card { conversation: ConversationId, text: String, card: Value },
    Attachment { conversation: ConversationId, text: String, file_name: String, content: Vec<u8> },
    Direct { person: PersonId, text: String },
    Leave { conversation: ConversationId },
}

impl PlatformCall {
    /// Conversation the call posted into, if it targeted one.
    pub fn conversation(&self) -> Option<&ConversationId> {
        match self {
            Self::Message { conversation, .. }
            | Self::Card { conversation, .. }
            | Self::Attachment { conversation, .. }
            | Self::Leave { conversation } => Some(conversation),
            Self::Direct { .. } => None,
        }
    }
}

#[derive(Default)]
struct RecordedState {
    calls: Vec<PlatformCall>,
    left: BTreeSet<ConversationId>,
    webhooks: Vec<Webhook>,
    next_webhook: u32,
}

pub struct InMemoryPlatform {
    agent: Identity,
    people: HashMap<PersonId, Identity>,
    conversations: Vec<Conversation>,
    conversation_orgs: HashMap<ConversationId, OrgId>,
    org_names: HashMap<OrgId, String>,
    messages: HashMap<MessageId, PlatformMessage>,
    files: HashMap<String, Attachment>,
    card_rejecting: HashSet<ConversationId>,
    failing_sends: HashMap<ConversationId, PlatformError>,
    slow_sends: HashMap<ConversationId, Duration>,
    group_listing_error: Option<PlatformError>,
    direct_listing_error: Option<PlatformError>,
    state: Mutex<RecordedState>,
}

impl InMemoryPlatform {
    pub fn new(agent: Identity) -> Self {
        Self {
            agent,
            people: HashMap::new(),
            conversations: Vec::new(),
            conversation_orgs: HashMap::new(),
            org_names: HashMap::new(),
            messages: HashMap::new(),
            files: HashMap::new(),
            card_rejecting: HashSet::new(),
            failing_sends: HashMap::new(),
            slow_sends: HashMap::new(),
            group_listing_error: None,
            direct_listing_error: None,
            state: Mutex::new(RecordedState::default()),
        }
    }

    pub fn with_person(mut self, person: Identity) -> Self {
        self.people.insert(person.id.clone(), person);
        self
    }

    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.conversations.push(conversation);
        self
    }

    /// Owner reported by the org lookup for a conversation listed without one.
    pub fn with_conversation_org(mut self, conversation: &str, org: &str) -> Self {
        self.conversation_orgs
            .insert(ConversationId(conversation.to_owned()), OrgId(org.to_owned()));
        self
    }

    pub fn with_org_name(mut self, org: &str, name: &str) -> Self {
        self.org_names.insert(OrgId(org.to_owned()), name.to_owned());
        self
    }

    pub fn with_message(mut self, message: PlatformMessage) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    pub fn with_file(mut self, url: &str, attachment: Attachment) -> Self {
        self.files.insert(url.to_owned(), attachment);
        self
    }

    pub fn rejecting_cards_in(mut self, conversation: &str) -> Self {
        self.card_rejecting.insert(ConversationId(conversation.to_owned()));
        self
    }

    pub fn failing_sends_to(mut self, conversation: &str, error: PlatformError) -> Self {
        self.failing_sends.insert(ConversationId(conversation.to_owned()), error);
        self
    }

    pub fn slow_sends_to(mut self, conversation: &str, delay: Duration) -> Self {
        self.slow_sends.insert(ConversationId(conversation.to_owned()), delay);
        self
    }

    pub fn failing_group_listing(mut self, error: PlatformError) -> Self {
        self.group_listing_error = Some(error);
        self
    }

    pub fn failing_direct_listing(mut self, error: PlatformError) -> Self {
        self.direct_listing_error = Some(error);
        self
    }

    pub fn with_webhook(self, webhook: Webhook) -> Self {
        self.state().webhooks.push(webhook);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// Calls that posted into `conversation`, in the order they happened.
    pub fn calls_to(&self, conversation: &str) -> Vec<PlatformCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.conversation().is_some_and(|id| id.0 == conversation))
            .cloned()
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<(PersonId, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::Direct { person, text } => Some((person.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn left_conversations(&self) -> Vec<ConversationId> {
        self.state().left.iter().cloned().collect()
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.state().webhooks.clone()
    }

    fn state(&self) -> MutexGuard<'_, RecordedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: PlatformCall) {
        self.state().calls.push(call);
    }

    fn has_left(&self, conversation: &ConversationId) -> bool {
        self.state().left.contains(conversation)
    }

    async fn before_send(&self, conversation: &ConversationId) -> Result<(), PlatformError> {
        if let Some(delay) = self.slow_sends.get(conversation) {
            tokio::time::sleep(*delay).await;
        }
        match self.failing_sends.get(conversation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Directory for InMemoryPlatform {
    async fn agent_identity(&self) -> Result<Identity, PlatformError> {
        Ok(self.agent.clone())
    }

    async fn person(&self, id: &PersonId) -> Result<Identity, PlatformError> {
        if *id == self.agent.id {
            return Ok(self.agent.clone());
        }
        self.people
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("people/{id}")))
    }

    async fn resolve_conversation_org(
        &self,
        id: &ConversationId,
    ) -> Result<Option<OrgId>, PlatformError> {
        if let Some(org) = self.conversation_orgs.get(id) {
            return Ok(Some(org.clone()));
        }
        self.conversations
            .iter()
            .find(|conversation| conversation.id == *id)
            .map(|conversation| conversation.owner_org.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("rooms/{id}")))
    }

    async fn organization_name(&self, org: &OrgId) -> Result<String, PlatformError> {
        self.org_names
            .get(org)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("organizations/{org}")))
    }
}

#[async_trait]
impl MembershipApi for InMemoryPlatform {
    async fn list_my_conversations(
        &self,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>, PlatformError> {
        let failure = match kind {
            ConversationKind::Group => &self.group_listing_error,
            ConversationKind::Direct => &self.direct_listing_error,
        };
        if let Some(error) = failure {
            return Err(error.clone());
        }

        Ok(self
            .conversations
            .iter()
            .filter(|conversation| conversation.kind == kind && !self.has_left(&conversation.id))
            .cloned()
            .collect())
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, PlatformError> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == *id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("rooms/{id}")))
    }

    async fn membership_active(&self, membership: &AgentMembership) -> Result<bool, PlatformError> {
        let listed = self.conversations.iter().any(|c| c.id == membership.conversation);
        Ok(listed && !self.has_left(&membership.conversation))
    }

    async fn leave_conversation(&self, membership: &AgentMembership) -> Result<(), PlatformError> {
        let conversation = &membership.conversation;
        let mut state = self.state();
        if state.left.insert(conversation.clone()) {
            state.calls.push(PlatformCall::Leave { conversation: conversation.clone() });
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingApi for InMemoryPlatform {
    async fn message(&self, id: &MessageId) -> Result<PlatformMessage, PlatformError> {
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("messages/{}", id.0)))
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.before_send(conversation).await?;
        self.record(PlatformCall::Message {
            conversation: conversation.clone(),
            text: text.to_owned(),
        });
        Ok(())
    }

    async fn send_card(
        &self,
        conversation: &ConversationId,
        text: &str,
        card: &Value,
    ) -> Result<(), PlatformError> {
        self.before_send(conversation).await?;
        if self.card_rejecting.contains(conversation) {
            return Err(PlatformError::CardRejected(format!(
                "card not supported in {conversation}"
            )));
        }
        self.record(PlatformCall::Card {
            conversation: conversation.clone(),
            text: text.to_owned(),
            card: card.clone(),
        });
        Ok(())
    }

    async fn send_attachment(
        &self,
        conversation: &ConversationId,
        text: &str,
        attachment: &Attachment,
    ) -> Result<(), PlatformError> {
        self.before_send(conversation).await?;
        self.record(PlatformCall::Attachment {
            conversation: conversation.clone(),
            text: text.to_owned(),
            file_name: attachment.file_name.clone(),
            content: attachment.content.clone(),
        });
        Ok(())
    }

    async fn send_direct(&self, person: &PersonId, text: &str) -> Result<(), PlatformError> {
        self.record(PlatformCall::Direct { person: person.clone(), text: text.to_owned() });
        Ok(())
    }
}

#[async_trait]
impl AttachmentSource for InMemoryPlatform {
    async fn fetch(&self, url: &str) -> Result<Attachment, PlatformError> {
        self.files.get(url).cloned().ok_or_else(|| PlatformError::NotFound(url.to_owned()))
    }
}

#[async_trait]
impl WebhookRegistry for InMemoryPlatform {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, PlatformError> {
        Ok(self.webhooks())
    }

    async fn delete_webhook(&self, id: &str) -> Result<(), PlatformError> {
        let mut state = self.state();
        let before = state.webhooks.len();
        state.webhooks.retain(|webhook| webhook.id != id);
        if state.webhooks.len() == before {
            return Err(PlatformError::NotFound(format!("webhooks/{id}")));
        }
        Ok(())
    }

    async fn create_webhook(
        &self,
        name: &str,
        target_url: &str,
        resource: &str,
        event: &str,
    ) -> Result<Webhook, PlatformError> {
        let mut state = self.state();
        state.next_webhook += 1;
        let webhook = Webhook {
            id: format!("WH-{}", state.next_webhook),
            name: name.to_owned(),
            target_url: target_url.to_owned(),
            resource: resource.to_owned(),
            event: event.to_owned(),
        };
        state.webhooks.push(webhook.clone());
        Ok(webhook)
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{Conversation, ConversationId, ConversationKind, Identity};

    use super::{InMemoryPlatform, PlatformCall};
    use crate::platform::{AgentMembership, MembershipApi, MessagingApi};

    fn agent() -> Identity {
        Identity::new("BOT", "Relay", "relay@webex.bot", "ORG-A")
    }

    #[tokio::test]
    async fn leaving_twice_records_a_single_leave() {
        let platform = InMemoryPlatform::new(agent())
            .with_conversation(Conversation::new("R-1", ConversationKind::Group, Some("ORG-A")));
        let room = ConversationId("R-1".to_owned());
        let membership = AgentMembership { id: "MS-1".to_owned(), conversation: room.clone() };
        assert!(platform.membership_active(&membership).await.expect("lookup succeeds"));

        platform.leave_conversation(&membership).await.expect("first leave");
        platform.leave_conversation(&membership).await.expect("second leave is a no-op");

        assert_eq!(platform.calls(), vec![PlatformCall::Leave { conversation: room.clone() }]);
        assert!(!platform.membership_active(&membership).await.expect("lookup succeeds"));
        let listed = platform
            .list_my_conversations(ConversationKind::Group)
            .await
            .expect("listing succeeds");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn records_sends_per_conversation() {
        let platform = InMemoryPlatform::new(agent());
        let room = ConversationId("R-2".to_owned());

        platform.send_message(&room, "hello").await.expect("send succeeds");

        assert_eq!(
            platform.calls_to("R-2"),
            vec![PlatformCall::Message { conversation: room, text: "hello".to_owned() }]
        );
        assert!(platform.calls_to("R-3").is_empty());
    }
}
