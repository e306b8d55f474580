pub mod config;
pub mod domain;
pub mod errors;
pub mod locale;
pub mod membership;
pub mod outcome;
pub mod policy;
pub mod transform;

pub use domain::{
    Attachment, Conversation, ConversationId, ConversationKind, Identity, InboundMessage,
    MessageId, ModerationMode, OrgId, PersonId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use locale::Locale;
pub use membership::{MembershipAction, MembershipEvent, MembershipMachine, MembershipState};
pub use outcome::{
    BroadcastReport, DeliveryRecord, DeliveryStatus, MembershipOutcome, MessageOutcome,
};
pub use policy::{
    accept_membership, authorize, select_destinations, BroadcastPolicy, DenyReason,
    DestinationPolicy, MembershipPolicy, SourcePolicy, Verdict,
};
pub use transform::{transform, CardError, OutboundPayload, TransformOutcome};
