//! Concurrent fan-out of one payload to many conversations.

use std::sync::Arc;
use std::time::Duration;

use relay_core::{Conversation, ConversationId, DeliveryRecord, DeliveryStatus, OutboundPayload};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::events::EventContext;
use crate::platform::{ChatPlatform, PlatformError};

pub struct BroadcastDispatcher {
    platform: Arc<dyn ChatPlatform>,
    delivery_timeout: Duration,
}

impl BroadcastDispatcher {
    pub fn new(platform: Arc<dyn ChatPlatform>, delivery_timeout: Duration) -> Self {
        Self { platform, delivery_timeout }
    }

    /// Delivers `payload` to every destination concurrently and waits for all of them.
    ///
    /// Each delivery has its own timeout and is attempted once. The returned
    /// records are sorted by conversation id.
    pub async fn dispatch(
        &self,
        payload: &OutboundPayload,
        destinations: &[Conversation],
        ctx: &EventContext,
    ) -> Vec<DeliveryRecord> {
        let payload = Arc::new(payload.clone());
        let mut tasks = JoinSet::new();

        for destination in destinations {
            let platform = Arc::clone(&self.platform);
            let payload = Arc::clone(&payload);
            let conversation = destination.id.clone();
            let kind = destination.kind;
            let limit = self.delivery_timeout;

            tasks.spawn(async move {
                let delivery = deliver(platform.as_ref(), &payload, &conversation);
                let status = match tokio::time::timeout(limit, delivery).await {
                    Ok(status) => status,
                    Err(_) => DeliveryStatus::Failed {
                        error: format!("delivery timed out after {limit:?}"),
                    },
                };
                DeliveryRecord { conversation, kind, status }
            });
        }

        let mut records = Vec::with_capacity(destinations.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => {
                    log_delivery(&record, ctx);
                    records.push(record);
                }
                Err(error) => warn!(
                    event_name = "relay.dispatch.task_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "delivery task ended without a record"
                ),
            }
        }

        for destination in destinations {
            if !records.iter().any(|record| record.conversation == destination.id) {
                records.push(DeliveryRecord {
                    conversation: destination.id.clone(),
                    kind: destination.kind,
                    status: DeliveryStatus::Failed { error: "delivery task aborted".to_owned() },
                });
            }
        }

        records.sort_by(|left, right| left.conversation.cmp(&right.conversation));
        records
    }
}

async fn deliver(
    platform: &dyn ChatPlatform,
    payload: &OutboundPayload,
    conversation: &ConversationId,
) -> DeliveryStatus {
    let result = match payload {
        OutboundPayload::PlainText { text } => platform.send_message(conversation, text).await,
        OutboundPayload::Attachment { text, attachment } => {
            platform.send_attachment(conversation, text, attachment).await
        }
        OutboundPayload::Card { text, card, source } => {
            match platform.send_card(conversation, text, card).await {
                Err(PlatformError::CardRejected(reason)) => {
                    return match platform.send_attachment(conversation, text, source).await {
                        Ok(()) => DeliveryStatus::DeliveredAsAttachment { card_error: reason },
                        Err(error) => DeliveryStatus::Failed { error: error.to_string() },
                    };
                }
                other => other,
            }
        }
    };

    match result {
        Ok(()) => DeliveryStatus::Delivered,
        Err(error) => DeliveryStatus::Failed { error: error.to_string() },
    }
}

fn log_delivery(record: &DeliveryRecord, ctx: &EventContext) {
    match &record.status {
        DeliveryStatus::Delivered => info!(
            event_name = "relay.dispatch.delivered",
            correlation_id = %ctx.correlation_id,
            conversation_id = %record.conversation,
            conversation_kind = record.kind.as_str(),
            "delivered broadcast"
        ),
        DeliveryStatus::DeliveredAsAttachment { card_error } => warn!(
            event_name = "relay.dispatch.card_fallback",
            correlation_id = %ctx.correlation_id,
            conversation_id = %record.conversation,
            card_error = %card_error,
            "card rejected; delivered source file instead"
        ),
        DeliveryStatus::Failed { error } => warn!(
            event_name = "relay.dispatch.failed",
            correlation_id = %ctx.correlation_id,
            conversation_id = %record.conversation,
            error = %error,
            "broadcast delivery failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use relay_core::{
        Attachment, Conversation, ConversationKind, DeliveryStatus, Identity, OutboundPayload,
    };
    use serde_json::json;

    use super::BroadcastDispatcher;
    use crate::events::EventContext;
    use crate::memory::{InMemoryPlatform, PlatformCall};

    fn agent() -> Identity {
        Identity::new("BOT", "Relay", "relay@webex.bot", "ORG-A")
    }

    fn group(id: &str) -> Conversation {
        Conversation::new(id, ConversationKind::Group, Some("ORG-A"))
    }

    #[tokio::test]
    async fn slow_destination_times_out_without_blocking_the_rest() {
        let platform = Arc::new(
            InMemoryPlatform::new(agent()).slow_sends_to("R-2", Duration::from_secs(5)),
        );
        let dispatcher = BroadcastDispatcher::new(platform.clone(), Duration::from_millis(50));
        let payload = OutboundPayload::PlainText { text: "hello".to_owned() };

        let records = dispatcher
            .dispatch(&payload, &[group("R-2"), group("R-1")], &EventContext::default())
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].conversation.0, "R-1");
        assert_eq!(records[0].status, DeliveryStatus::Delivered);
        assert!(matches!(
            records[1].status,
            DeliveryStatus::Failed { ref error } if error.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn rejected_card_falls_back_to_source_file() {
        let platform = Arc::new(InMemoryPlatform::new(agent()).rejecting_cards_in("R-1"));
        let dispatcher = BroadcastDispatcher::new(platform.clone(), Duration::from_secs(1));
        let source = Attachment::new("card.json", "application/json", b"{}".to_vec());
        let payload = OutboundPayload::Card {
            text: "Message from Ann (ann@a.example):  \n\n".to_owned(),
            card: json!({"type": "AdaptiveCard", "version": "1.3"}),
            source,
        };

        let records = dispatcher
            .dispatch(&payload, &[group("R-1"), group("R-2")], &EventContext::default())
            .await;

        assert!(matches!(records[0].status, DeliveryStatus::DeliveredAsAttachment { .. }));
        assert_eq!(records[1].status, DeliveryStatus::Delivered);
        assert!(matches!(
            platform.calls_to("R-1").as_slice(),
            [PlatformCall::Attachment { file_name, .. }] if file_name == "card.json"
        ));
        assert!(matches!(platform.calls_to("R-2").as_slice(), [PlatformCall::Card { .. }]));
    }
}
