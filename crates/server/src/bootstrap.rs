use std::sync::Arc;

use relay_core::config::AppConfig;
use relay_webex::platform::PlatformError;
use relay_webex::webhooks::{register_webhooks, WebhookRegistration};
use relay_webex::{RelayEngine, RelaySettings, WebexClient};
use thiserror::Error;
use tracing::{info, warn};

pub const WEBHOOK_NAME: &str = "relay";

pub struct Application {
    pub config: Arc<AppConfig>,
    pub client: Arc<WebexClient>,
    pub engine: Arc<RelayEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("platform client could not be created: {0}")]
    Platform(#[source] PlatformError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        locale = config.locale.code(),
        "starting application bootstrap"
    );

    let client = Arc::new(WebexClient::new(&config.platform).map_err(BootstrapError::Platform)?);
    let settings = Arc::new(RelaySettings::from_config(&config));
    let engine = Arc::new(RelayEngine::new(client.clone(), settings));

    info!(
        event_name = "system.bootstrap.platform_ready",
        correlation_id = "bootstrap",
        api_base_url = %config.platform.api_base_url,
        "platform client initialized"
    );

    Ok(Application { config: Arc::new(config), client, engine })
}

/// Outcome of the startup webhook registration, reported by `/health`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookStatus {
    /// No public URL configured; webhooks are registered with `relay webhooks`.
    Manual,
    Registered { target: String, created: usize, removed: usize },
    Failed { public_url: String, error: String },
}

/// Points the platform's webhooks at this instance when a public URL is configured.
/// A failed registration is logged; the server keeps serving.
pub async fn register_public_webhooks(app: &Application) -> WebhookStatus {
    let Some(public_url) = app.config.server.public_url.as_deref() else {
        return WebhookStatus::Manual;
    };

    match register_webhooks(app.client.as_ref(), public_url, WEBHOOK_NAME).await {
        Ok(registration) => registered(registration),
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.webhooks_failed",
                correlation_id = "bootstrap",
                public_url,
                error = %error,
                "webhook registration failed; events will not arrive until it succeeds"
            );
            WebhookStatus::Failed { public_url: public_url.to_owned(), error: error.to_string() }
        }
    }
}

fn registered(registration: WebhookRegistration) -> WebhookStatus {
    let target = registration
        .created
        .first()
        .map(|webhook| webhook.target_url.clone())
        .unwrap_or_default();
    WebhookStatus::Registered {
        target,
        created: registration.created.len(),
        removed: registration.removed.len(),
    }
}
