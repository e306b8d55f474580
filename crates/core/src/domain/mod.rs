pub mod conversation;
pub mod identity;
pub mod message;

pub use conversation::{Conversation, ConversationId, ConversationKind, ModerationMode};
pub use identity::{Identity, OrgId, PersonId};
pub use message::{Attachment, InboundMessage, MessageId};
