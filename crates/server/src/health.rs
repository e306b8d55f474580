use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use relay_core::config::AppConfig;
use serde::Serialize;

use crate::bootstrap::WebhookStatus;

#[derive(Clone)]
pub struct HealthState {
    config: Arc<AppConfig>,
    webhooks: Arc<WebhookStatus>,
    started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn new(config: Arc<AppConfig>, webhooks: WebhookStatus) -> Self {
        Self { config, webhooks: Arc::new(webhooks), started_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub webhooks: HealthCheck,
    pub started_at: String,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let webhooks = match state.webhooks.as_ref() {
        WebhookStatus::Manual => HealthCheck {
            status: "manual",
            detail: "server.public_url unset; register webhooks with `relay webhooks`".to_string(),
        },
        WebhookStatus::Registered { target, created, .. } => HealthCheck {
            status: "ready",
            detail: format!("{created} webhooks registered against {target}"),
        },
        WebhookStatus::Failed { public_url, error } => HealthCheck {
            status: "degraded",
            detail: format!("registration against {public_url} failed: {error}"),
        },
    };

    let ready = webhooks.status != "degraded";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "relay-server accepting webhooks (locale {})",
                state.config.locale.code()
            ),
        },
        webhooks,
        started_at: state.started_at.to_rfc3339(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
