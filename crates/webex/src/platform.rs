//! Collaborator contracts the relay engine consumes from the chat platform.

use async_trait::async_trait;
use relay_core::{
    ApplicationError, Attachment, Conversation, ConversationId, ConversationKind, Identity,
    MessageId, OrgId, PersonId,
};
use serde_json::Value;
use thiserror::Error;

use crate::markup::strip_mentions;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform resource not found: {0}")]
    NotFound(String),
    #[error("card rejected by platform: {0}")]
    CardRejected(String),
    #[error("platform refused credentials: {0}")]
    Unauthorized(String),
    #[error("platform rate limited the request (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },
    #[error("platform transport failure: {0}")]
    Transport(String),
    #[error("could not decode platform response: {0}")]
    Decode(String),
}

impl From<PlatformError> for ApplicationError {
    fn from(error: PlatformError) -> Self {
        ApplicationError::Transport(error.to_string())
    }
}

/// A message as stored by the platform, before attribution and fan-out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub conversation_kind: Option<ConversationKind>,
    pub author_id: PersonId,
    pub text: Option<String>,
    pub markdown: Option<String>,
    pub html: Option<String>,
    /// Download URLs, in the order the author attached them.
    pub files: Vec<String>,
}

impl PlatformMessage {
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(id.into()),
            conversation_id: ConversationId(conversation_id.into()),
            conversation_kind: None,
            author_id: PersonId(author_id.into()),
            text: None,
            markdown: None,
            html: None,
            files: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_markdown(mut self, markdown: impl Into<String>) -> Self {
        self.markdown = Some(markdown.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_file(mut self, url: impl Into<String>) -> Self {
        self.files.push(url.into());
        self
    }

    /// Body to replicate: mention-free HTML when present, else markdown, else plain text.
    pub fn body(&self) -> String {
        if let Some(html) = self.html.as_deref() {
            return strip_mentions(html);
        }
        self.markdown.as_deref().or(self.text.as_deref()).unwrap_or_default().to_owned()
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn agent_identity(&self) -> Result<Identity, PlatformError>;
    async fn person(&self, id: &PersonId) -> Result<Identity, PlatformError>;

    async fn resolve_person_org(&self, id: &PersonId) -> Result<OrgId, PlatformError> {
        Ok(self.person(id).await?.org_id)
    }

    /// `Ok(None)` when the platform knows the conversation but reports no owner.
    async fn resolve_conversation_org(
        &self,
        id: &ConversationId,
    ) -> Result<Option<OrgId>, PlatformError>;

    async fn organization_name(&self, org: &OrgId) -> Result<String, PlatformError>;
}

/// The agent's own membership record in one conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentMembership {
    pub id: String,
    pub conversation: ConversationId,
}

#[async_trait]
pub trait MembershipApi: Send + Sync {
    async fn list_my_conversations(
        &self,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>, PlatformError>;
    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, PlatformError>;
    /// `Ok(false)` once the membership no longer exists.
    async fn membership_active(&self, membership: &AgentMembership) -> Result<bool, PlatformError>;
    /// Leaving a conversation the agent is not in succeeds.
    async fn leave_conversation(&self, membership: &AgentMembership) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn message(&self, id: &MessageId) -> Result<PlatformMessage, PlatformError>;
    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<(), PlatformError>;
    /// Fails with [`PlatformError::CardRejected`] when the platform refuses the card.
    async fn send_card(
        &self,
        conversation: &ConversationId,
        text: &str,
        card: &Value,
    ) -> Result<(), PlatformError>;
    async fn send_attachment(
        &self,
        conversation: &ConversationId,
        text: &str,
        attachment: &Attachment,
    ) -> Result<(), PlatformError>;
    async fn send_direct(&self, person: &PersonId, text: &str) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait AttachmentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Attachment, PlatformError>;
}

/// Everything the relay needs from the platform, as one object-safe bundle.
pub trait ChatPlatform: Directory + MembershipApi + MessagingApi + AttachmentSource {}

impl<T> ChatPlatform for T where T: Directory + MembershipApi + MessagingApi + AttachmentSource {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Webhook {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
}

#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, PlatformError>;
    async fn delete_webhook(&self, id: &str) -> Result<(), PlatformError>;
    async fn create_webhook(
        &self,
        name: &str,
        target_url: &str,
        resource: &str,
        event: &str,
    ) -> Result<Webhook, PlatformError>;
}
