//! Webhook subscription management.

use tracing::info;

use crate::platform::{PlatformError, Webhook, WebhookRegistry};

pub const WEBHOOK_PATH: &str = "/webhook";

/// Resource/event pairs the relay listens to.
pub const SUBSCRIPTIONS: [(&str, &str); 4] = [
    ("messages", "created"),
    ("memberships", "created"),
    ("memberships", "deleted"),
    ("memberships", "updated"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub removed: Vec<String>,
    pub created: Vec<Webhook>,
}

/// Ingress URL for a public base URL. The platform only delivers over https.
pub fn webhook_target(public_url: &str) -> Result<String, PlatformError> {
    let trimmed = public_url.trim().trim_end_matches('/');
    let host_and_path = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    if host_and_path.is_empty() {
        return Err(PlatformError::Transport("public url must not be empty".to_owned()));
    }

    let base = format!("https://{host_and_path}");
    if base.ends_with(WEBHOOK_PATH) {
        Ok(base)
    } else {
        Ok(format!("{base}{WEBHOOK_PATH}"))
    }
}

/// Replaces every existing webhook of the agent with the relay's subscriptions.
pub async fn register_webhooks(
    registry: &dyn WebhookRegistry,
    public_url: &str,
    name: &str,
) -> Result<WebhookRegistration, PlatformError> {
    let target = webhook_target(public_url)?;

    let mut removed = Vec::new();
    for existing in registry.list_webhooks().await? {
        registry.delete_webhook(&existing.id).await?;
        removed.push(existing.id);
    }

    let mut created = Vec::with_capacity(SUBSCRIPTIONS.len());
    for (resource, event) in SUBSCRIPTIONS {
        let webhook = registry
            .create_webhook(&format!("{name} {resource}/{event}"), &target, resource, event)
            .await?;
        created.push(webhook);
    }

    info!(
        event_name = "relay.webhooks.registered",
        target_url = %target,
        removed = removed.len(),
        created = created.len(),
        "webhooks registered"
    );
    Ok(WebhookRegistration { removed, created })
}
