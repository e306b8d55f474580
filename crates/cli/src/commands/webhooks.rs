use std::path::Path;

use relay_core::config::{AppConfig, LoadOptions};
use relay_webex::platform::WebhookRegistry;
use relay_webex::webhooks::register_webhooks;
use relay_webex::WebexClient;

use super::{runtime, CommandResult};

const COMMAND: &str = "webhooks";

pub fn run(
    config_path: Option<&Path>,
    target_url: Option<&str>,
    name: &str,
    list_only: bool,
) -> CommandResult {
    let options =
        LoadOptions { config_path: config_path.map(Path::to_path_buf), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
        }
    };

    let public_url = target_url.map(str::to_owned).or_else(|| config.server.public_url.clone());
    if !list_only && public_url.is_none() {
        return CommandResult::failure(
            COMMAND,
            "missing_target",
            "pass --target-url or set server.public_url (RELAY_SERVER_PUBLIC_URL)",
            2,
        );
    }

    let client = match WebexClient::new(&config.platform) {
        Ok(client) => client,
        Err(error) => return CommandResult::failure(COMMAND, "platform", error.to_string(), 3),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure(COMMAND, "runtime", error, 3),
    };

    runtime.block_on(async {
        match public_url {
            Some(public_url) if !list_only => register(&client, &public_url, name).await,
            _ => list(&client).await,
        }
    })
}

/// Replaces the agent's webhooks and reports what changed.
pub async fn register(
    registry: &dyn WebhookRegistry,
    public_url: &str,
    name: &str,
) -> CommandResult {
    match register_webhooks(registry, public_url, name).await {
        Ok(registration) => {
            let mut lines = vec![format!(
                "registered {} webhooks (removed {})",
                registration.created.len(),
                registration.removed.len()
            )];
            lines.extend(registration.created.iter().map(|webhook| {
                format!("  - {}/{} -> {}", webhook.resource, webhook.event, webhook.target_url)
            }));
            CommandResult::success(COMMAND, lines.join("\n"))
        }
        Err(error) => CommandResult::failure(COMMAND, "platform", error.to_string(), 4),
    }
}

pub async fn list(registry: &dyn WebhookRegistry) -> CommandResult {
    match registry.list_webhooks().await {
        Ok(webhooks) if webhooks.is_empty() => {
            CommandResult::success(COMMAND, "no webhooks registered")
        }
        Ok(webhooks) => {
            let lines: Vec<String> = webhooks
                .iter()
                .map(|webhook| {
                    format!(
                        "  - {} {}/{} -> {}",
                        webhook.id, webhook.resource, webhook.event, webhook.target_url
                    )
                })
                .collect();
            CommandResult::success(
                COMMAND,
                format!("{} webhooks registered\n{}", webhooks.len(), lines.join("\n")),
            )
        }
        Err(error) => CommandResult::failure(COMMAND, "platform", error.to_string(), 4),
    }
}
