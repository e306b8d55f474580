//! Webhook ingress: turns platform notifications into engine calls.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use relay_core::InterfaceError;
use relay_webex::events::{EventContext, HandlerResult};
use relay_webex::RelayEngine;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

pub const WEBHOOK_ROUTE: &str = "/webhook";

#[derive(Clone)]
pub struct IngressState {
    engine: Arc<RelayEngine>,
}

impl IngressState {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self { engine }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebhookAccepted {
    pub correlation_id: String,
    pub outcome: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookRejected {
    pub error: &'static str,
    pub correlation_id: String,
}

pub fn router(state: IngressState) -> Router {
    Router::new().route(WEBHOOK_ROUTE, post(receive_webhook)).with_state(state)
}

pub async fn receive_webhook(
    State(state): State<IngressState>,
    Json(raw): Json<Value>,
) -> Result<Json<WebhookAccepted>, (StatusCode, Json<WebhookRejected>)> {
    let ctx = EventContext::for_webhook(&raw);

    match state.engine.handle_event(&raw, &ctx).await {
        Ok(result) => Ok(Json(WebhookAccepted {
            correlation_id: ctx.correlation_id,
            outcome: outcome_json(&result),
        })),
        Err(dispatch_error) => Err(reject(dispatch_error.into_interface(ctx.correlation_id))),
    }
}

fn outcome_json(result: &HandlerResult) -> Value {
    let serialized = match result {
        HandlerResult::Message(outcome) => serde_json::to_value(outcome),
        HandlerResult::Membership(outcome) => serde_json::to_value(outcome),
        HandlerResult::Ignored => return json!({"outcome": "ignored"}),
    };
    serialized.unwrap_or_default()
}

fn reject(error: InterfaceError) -> (StatusCode, Json<WebhookRejected>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(
            event_name = "ingress.webhook.rejected",
            correlation_id = %error.correlation_id(),
            status = status.as_u16(),
            error = %error,
            "webhook processing failed"
        );
    } else {
        warn!(
            event_name = "ingress.webhook.rejected",
            correlation_id = %error.correlation_id(),
            status = status.as_u16(),
            error = %error,
            "webhook rejected"
        );
    }

    let body = WebhookRejected {
        error: error.user_message(),
        correlation_id: error.correlation_id().to_owned(),
    };
    (status, Json(body))
}
