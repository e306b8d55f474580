use serde::{Deserialize, Serialize};

use crate::domain::conversation::Conversation;
use crate::domain::identity::Identity;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// A file fetched from the origin conversation. The bytes are carried as-is
/// and never rewritten on the way to a destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self { file_name: file_name.into(), mime_type: mime_type.into(), content: content.into() }
    }

    /// Media type without parameters, lowercased.
    /// `Application/JSON; charset=utf-8` becomes `application/json`.
    pub fn essence(&self) -> String {
        self.mime_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: MessageId,
    pub author: Identity,
    pub origin: Conversation,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::Attachment;

    #[test]
    fn essence_drops_parameters_and_case() {
        let attachment =
            Attachment::new("form.json", "Application/JSON; charset=utf-8", b"{}".to_vec());
        assert_eq!(attachment.essence(), "application/json");
    }
}
