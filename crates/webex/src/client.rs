//! Webex REST adapter for the platform traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::PlatformConfig;
use relay_core::{
    Attachment, Conversation, ConversationId, ConversationKind, Identity, MessageId,
    ModerationMode, OrgId, PersonId,
};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE, LINK, RETRY_AFTER};
use reqwest::{multipart, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::markup::card_attachment;
use crate::platform::{
    AgentMembership, AttachmentSource, Directory, MembershipApi, MessagingApi, PlatformError,
    PlatformMessage, Webhook, WebhookRegistry,
};

const PAGE_SIZE: &str = "1000";
const MAX_RETRY_WAIT_SECS: u64 = 60;
const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Clone)]
pub struct WebexClient {
    http: reqwest::Client,
    base_url: String,
    token: SecretString,
    agent_id: Option<PersonId>,
    /// Shared by clones; filled on the first successful identity lookup.
    agent: Arc<OnceCell<Identity>>,
    max_attachment_retries: u32,
}

impl std::fmt::Debug for WebexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebexClient")
            .field("base_url", &self.base_url)
            .field("token", &"[redacted]")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

impl WebexClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.access_token.clone(),
            agent_id: config.agent_id.clone().map(PersonId),
            agent: Arc::new(OnceCell::new()),
            max_attachment_retries: config.max_attachment_retries,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.http.request(method, url).bearer_auth(self.token.expose_secret())
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|error| PlatformError::Transport(format!("{operation}: {error}")))?;
        check_status(response, operation).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, PlatformError> {
        let response = self.send(self.request(Method::GET, path).query(query), path).await?;
        decode(response, path).await
    }

    /// Follows `Link: <...>; rel="next"` pagination until the listing is exhausted.
    async fn get_items<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        let mut next = Some(self.request(Method::GET, path).query(query));

        while let Some(request) = next.take() {
            let response = self.send(request, path).await?;
            let next_url = next_page(response.headers());
            let page: ItemsPage<T> = decode(response, path).await?;
            items.extend(page.items);
            next = next_url
                .map(|url| self.http.get(url).bearer_auth(self.token.expose_secret()));
        }

        Ok(items)
    }

    async fn post_message(&self, body: Value, operation: &str) -> Result<(), PlatformError> {
        self.send(self.request(Method::POST, "messages").json(&body), operation).await?;
        Ok(())
    }

    async fn agent_id(&self) -> Result<PersonId, PlatformError> {
        match &self.agent_id {
            Some(id) => Ok(id.clone()),
            None => Ok(self.agent_identity().await?.id),
        }
    }
}

#[derive(Deserialize)]
struct ItemsPage<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonResource {
    id: String,
    #[serde(default)]
    emails: Vec<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    org_id: String,
}

impl From<PersonResource> for Identity {
    fn from(person: PersonResource) -> Self {
        let email = person.emails.into_iter().next().unwrap_or_default();
        Identity::new(person.id, person.display_name, email, person.org_id)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomResource {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    is_announcement_only: bool,
    owner_id: Option<String>,
}

impl TryFrom<RoomResource> for Conversation {
    type Error = PlatformError;

    fn try_from(room: RoomResource) -> Result<Self, Self::Error> {
        let kind = parse_kind(&room.kind)?;
        let moderation = if room.is_announcement_only {
            ModerationMode::Announcement
        } else {
            ModerationMode::Open
        };
        let owner = room.owner_id.filter(|owner| !owner.is_empty() && owner != "NOT_OWNED");
        Ok(Conversation::new(room.id, kind, owner.as_deref())
            .titled(room.title)
            .moderated(moderation))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageResource {
    id: String,
    room_id: String,
    room_type: Option<String>,
    person_id: String,
    text: Option<String>,
    markdown: Option<String>,
    html: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipResource {
    person_id: String,
    person_org_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationResource {
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResource {
    id: String,
    #[serde(default)]
    name: String,
    target_url: String,
    resource: String,
    event: String,
}

impl From<WebhookResource> for Webhook {
    fn from(webhook: WebhookResource) -> Self {
        Self {
            id: webhook.id,
            name: webhook.name,
            target_url: webhook.target_url,
            resource: webhook.resource,
            event: webhook.event,
        }
    }
}

fn parse_kind(value: &str) -> Result<ConversationKind, PlatformError> {
    match value {
        "group" => Ok(ConversationKind::Group),
        "direct" => Ok(ConversationKind::Direct),
        other => Err(PlatformError::Decode(format!("unknown room type `{other}`"))),
    }
}

#[async_trait]
impl Directory for WebexClient {
    async fn agent_identity(&self) -> Result<Identity, PlatformError> {
        let agent = self
            .agent
            .get_or_try_init(|| async {
                let path = match &self.agent_id {
                    Some(id) => format!("people/{id}"),
                    None => "people/me".to_owned(),
                };
                let person: PersonResource = self.get_json(&path, &[]).await?;
                Ok::<_, PlatformError>(Identity::from(person))
            })
            .await?;
        Ok(agent.clone())
    }

    async fn person(&self, id: &PersonId) -> Result<Identity, PlatformError> {
        let person: PersonResource = self.get_json(&format!("people/{id}"), &[]).await?;
        Ok(person.into())
    }

    async fn resolve_conversation_org(
        &self,
        id: &ConversationId,
    ) -> Result<Option<OrgId>, PlatformError> {
        let room: RoomResource = self.get_json(&format!("rooms/{id}"), &[]).await?;
        let conversation = Conversation::try_from(room)?;
        if conversation.owner_org.is_some() || conversation.kind == ConversationKind::Group {
            return Ok(conversation.owner_org);
        }

        // A direct conversation belongs to the organization of the other participant.
        let agent_id = self.agent_id().await?;
        let members: Vec<MembershipResource> =
            self.get_items("memberships", &[("roomId", id.0.as_str())]).await?;
        Ok(members
            .into_iter()
            .find(|member| member.person_id != agent_id.0)
            .and_then(|member| member.person_org_id)
            .map(OrgId))
    }

    async fn organization_name(&self, org: &OrgId) -> Result<String, PlatformError> {
        let organization: OrganizationResource =
            self.get_json(&format!("organizations/{org}"), &[]).await?;
        Ok(organization.display_name)
    }
}

#[async_trait]
impl MembershipApi for WebexClient {
    async fn list_my_conversations(
        &self,
        kind: ConversationKind,
    ) -> Result<Vec<Conversation>, PlatformError> {
        let rooms: Vec<RoomResource> =
            self.get_items("rooms", &[("type", kind.as_str()), ("max", PAGE_SIZE)]).await?;
        rooms.into_iter().map(Conversation::try_from).collect()
    }

    async fn conversation(&self, id: &ConversationId) -> Result<Conversation, PlatformError> {
        let room: RoomResource = self.get_json(&format!("rooms/{id}"), &[]).await?;
        Conversation::try_from(room)
    }

    async fn membership_active(&self, membership: &AgentMembership) -> Result<bool, PlatformError> {
        let path = format!("memberships/{}", membership.id);
        match self.send(self.request(Method::GET, &path), &path).await {
            Ok(_) => Ok(true),
            Err(PlatformError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    async fn leave_conversation(&self, membership: &AgentMembership) -> Result<(), PlatformError> {
        let path = format!("memberships/{}", membership.id);
        match self.send(self.request(Method::DELETE, &path), &path).await {
            Ok(_) | Err(PlatformError::NotFound(_)) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl MessagingApi for WebexClient {
    async fn message(&self, id: &MessageId) -> Result<PlatformMessage, PlatformError> {
        let message: MessageResource = self.get_json(&format!("messages/{}", id.0), &[]).await?;
        Ok(PlatformMessage {
            id: MessageId(message.id),
            conversation_id: ConversationId(message.room_id),
            conversation_kind: message.room_type.as_deref().and_then(|kind| parse_kind(kind).ok()),
            author_id: PersonId(message.person_id),
            text: message.text,
            markdown: message.markdown,
            html: message.html,
            files: message.files,
        })
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<(), PlatformError> {
        self.post_message(json!({"roomId": conversation.0, "markdown": text}), "send_message")
            .await
    }

    async fn send_card(
        &self,
        conversation: &ConversationId,
        text: &str,
        card: &Value,
    ) -> Result<(), PlatformError> {
        let body = json!({
            "roomId": conversation.0,
            "markdown": text,
            "attachments": [card_attachment(card)],
        });
        let response = self
            .request(Method::POST, "messages")
            .json(&body)
            .send()
            .await
            .map_err(|error| PlatformError::Transport(format!("send_card: {error}")))?;

        if response.status() == StatusCode::BAD_REQUEST {
            let detail = response.text().await.unwrap_or_default();
            return Err(PlatformError::CardRejected(truncate(&detail)));
        }
        check_status(response, "send_card").await?;
        Ok(())
    }

    async fn send_attachment(
        &self,
        conversation: &ConversationId,
        text: &str,
        attachment: &Attachment,
    ) -> Result<(), PlatformError> {
        let file = multipart::Part::bytes(attachment.content.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)
            .map_err(|error| PlatformError::Decode(format!("attachment mime type: {error}")))?;
        let form = multipart::Form::new()
            .text("roomId", conversation.0.clone())
            .text("markdown", text.to_owned())
            .part("files", file);

        self.send(self.request(Method::POST, "messages").multipart(form), "send_attachment")
            .await?;
        Ok(())
    }

    async fn send_direct(&self, person: &PersonId, text: &str) -> Result<(), PlatformError> {
        self.post_message(json!({"toPersonId": person.0, "markdown": text}), "send_direct").await
    }
}

#[async_trait]
impl AttachmentSource for WebexClient {
    /// Downloads a message file. While the platform is still scanning it
    /// answers with `Retry-After`; that wait is honoured a bounded number of times.
    async fn fetch(&self, url: &str) -> Result<Attachment, PlatformError> {
        for attempt in 0..=self.max_attachment_retries {
            let response = self
                .http
                .get(url)
                .bearer_auth(self.token.expose_secret())
                .send()
                .await
                .map_err(|error| PlatformError::Transport(format!("fetch attachment: {error}")))?;

            let retry_after = retry_after_secs(response.headers());
            if !response.status().is_success() {
                if let Some(wait) = retry_after {
                    debug!(
                        event_name = "relay.attachment.retry_after",
                        attempt,
                        wait_secs = wait,
                        status = response.status().as_u16(),
                        "attachment not ready; waiting"
                    );
                    tokio::time::sleep(Duration::from_secs(wait.min(MAX_RETRY_WAIT_SECS))).await;
                    continue;
                }
            }

            let response = check_status(response, "fetch attachment").await?;
            let headers = response.headers();
            let file_name = headers
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok())
                .and_then(content_disposition_file_name)
                .unwrap_or_else(|| fallback_file_name(url));
            let mime_type = headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or(FALLBACK_MIME)
                .to_owned();
            let content = response
                .bytes()
                .await
                .map_err(|error| PlatformError::Transport(format!("read attachment: {error}")))?;

            return Ok(Attachment::new(file_name, mime_type, content.to_vec()));
        }

        warn!(
            event_name = "relay.attachment.retries_exhausted",
            max_retries = self.max_attachment_retries,
            "attachment never became available"
        );
        Err(PlatformError::RateLimited { retry_after_secs: MAX_RETRY_WAIT_SECS })
    }
}

#[async_trait]
impl WebhookRegistry for WebexClient {
    async fn list_webhooks(&self) -> Result<Vec<Webhook>, PlatformError> {
        let webhooks: Vec<WebhookResource> =
            self.get_items("webhooks", &[("max", PAGE_SIZE)]).await?;
        Ok(webhooks.into_iter().map(Webhook::from).collect())
    }

    async fn delete_webhook(&self, id: &str) -> Result<(), PlatformError> {
        let path = format!("webhooks/{id}");
        self.send(self.request(Method::DELETE, &path), &path).await?;
        Ok(())
    }

    async fn create_webhook(
        &self,
        name: &str,
        target_url: &str,
        resource: &str,
        event: &str,
    ) -> Result<Webhook, PlatformError> {
        let body = json!({
            "name": name,
            "targetUrl": target_url,
            "resource": resource,
            "event": event,
        });
        let response =
            self.send(self.request(Method::POST, "webhooks").json(&body), "create_webhook").await?;
        let webhook: WebhookResource = decode(response, "create_webhook").await?;
        Ok(webhook.into())
    }
}

async fn check_status(response: Response, operation: &str) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = retry_after_secs(response.headers());
    let detail = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Unauthorized(format!("{operation} returned {status}"))
        }
        StatusCode::NOT_FOUND => PlatformError::NotFound(operation.to_owned()),
        StatusCode::TOO_MANY_REQUESTS => {
            PlatformError::RateLimited { retry_after_secs: retry_after.unwrap_or(0) }
        }
        _ => PlatformError::Transport(format!(
            "{operation} returned {status}: {}",
            truncate(&detail)
        )),
    })
}

async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &str,
) -> Result<T, PlatformError> {
    response
        .json::<T>()
        .await
        .map_err(|error| PlatformError::Decode(format!("{operation}: {error}")))
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find(|part| part.contains("rel=\"next\"")).and_then(|part| {
        let start = part.find('<')? + 1;
        let end = part.find('>')?;
        (start < end).then(|| part[start..end].to_owned())
    })
}

/// File name from a `Content-Disposition` header value (`attachment; filename="report.pdf"`).
fn content_disposition_file_name(value: &str) -> Option<String> {
    value.split(';').map(str::trim).find_map(|parameter| {
        let (key, raw) = parameter.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let name = raw.trim().trim_matches('"');
        (!name.is_empty()).then(|| name.to_owned())
    })
}

fn fallback_file_name(url: &str) -> String {
    url.split('?')
        .next()
        .and_then(|path| path.trim_end_matches('/').rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("attachment")
        .to_owned()
}

fn truncate(detail: &str) -> String {
    const LIMIT: usize = 300;
    match detail.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &detail[..index]),
        None => detail.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{Conversation, ConversationKind, ModerationMode, OrgId};
    use reqwest::header::{HeaderMap, HeaderValue, LINK, RETRY_AFTER};

    use super::{
        content_disposition_file_name, fallback_file_name, next_page, retry_after_secs,
        truncate, RoomResource,
    };

    #[test]
    fn reads_file_name_from_content_disposition() {
        assert_eq!(
            content_disposition_file_name("attachment; filename=\"Q3 report.pdf\"").as_deref(),
            Some("Q3 report.pdf")
        );
        assert_eq!(
            content_disposition_file_name("inline; FILENAME=card.json").as_deref(),
            Some("card.json")
        );
        assert_eq!(content_disposition_file_name("attachment"), None);
        assert_eq!(fallback_file_name("https://webexapis.com/v1/contents/Y2lz?x=1"), "Y2lz");
    }

    #[test]
    fn follows_next_link_only() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://webexapis.com/v1/rooms?cursor=abc>; rel=\"next\", \
                 <https://webexapis.com/v1/rooms>; rel=\"first\"",
            ),
        );

        assert_eq!(
            next_page(&headers).as_deref(),
            Some("https://webexapis.com/v1/rooms?cursor=abc")
        );
        assert_eq!(next_page(&HeaderMap::new()), None);
    }

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("5"));

        assert_eq!(retry_after_secs(&headers), Some(5));
        assert_eq!(retry_after_secs(&HeaderMap::new()), None);
    }

    #[test]
    fn maps_room_resource_to_conversation() {
        let room: RoomResource = serde_json::from_value(serde_json::json!({
            "id": "R-1",
            "title": "Announcements",
            "type": "group",
            "isAnnouncementOnly": true,
            "ownerId": "ORG-A"
        }))
        .expect("valid room");

        let conversation = Conversation::try_from(room).expect("known kind");

        assert_eq!(conversation.kind, ConversationKind::Group);
        assert_eq!(conversation.moderation, ModerationMode::Announcement);
        assert_eq!(conversation.owner_org, Some(OrgId("ORG-A".to_owned())));
        assert_eq!(conversation.title, "Announcements");
    }

    #[test]
    fn truncates_long_error_bodies() {
        let long = "x".repeat(400);

        assert_eq!(truncate(&long).len(), 303);
        assert_eq!(truncate("short"), "short");
    }
}
