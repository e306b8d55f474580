//! Outcome summaries returned to the webhook transport.

use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, ConversationKind, PersonId};
use crate::membership::TransitionOutcome;
use crate::policy::DenyReason;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    /// The destination rejected the card; the source file was sent instead.
    DeliveredAsAttachment { card_error: String },
    Failed { error: String },
}

impl DeliveryStatus {
    pub fn is_delivered(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub conversation: ConversationId,
    pub kind: ConversationKind,
    pub status: DeliveryStatus,
}

/// Result of one fan-out. Individual failures never fail the broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub payload_kind: String,
    pub deliveries: Vec<DeliveryRecord>,
    pub warnings: Vec<String>,
}

impl BroadcastReport {
    pub fn delivered_count(&self) -> usize {
        self.deliveries.iter().filter(|record| record.status.is_delivered()).count()
    }

    pub fn failures(&self) -> Vec<&DeliveryRecord> {
        self.deliveries.iter().filter(|record| !record.status.is_delivered()).collect()
    }

    pub fn is_partial(&self) -> bool {
        !self.failures().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MessageOutcome {
    /// Not a broadcast candidate (the agent's own post, for example).
    Ignored { reason: String },
    Unauthorized { author: PersonId, reason: DenyReason },
    NoDestinations { warnings: Vec<String> },
    AttachmentFetchFailed { error: String, author_notified: bool },
    Broadcast(BroadcastReport),
}

impl MessageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Unauthorized { .. } => "unauthorized",
            Self::NoDestinations { .. } => "no_destinations",
            Self::AttachmentFetchFailed { .. } => "attachment_fetch_failed",
            Self::Broadcast(report) if report.is_partial() => "partial_delivery_failure",
            Self::Broadcast(_) => "broadcast",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MembershipOutcome {
    /// Event about somebody else's membership.
    Ignored { reason: String },
    Applied { transition: TransitionOutcome, action_errors: Vec<String> },
}
