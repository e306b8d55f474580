//! Turns an inbound message into the payload replicated to every destination.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Attachment, InboundMessage};
use crate::locale::Locale;

/// Declared type that marks an attachment as a card document.
pub const CARD_SOURCE_MIME: &str = "application/json";
const CARD_TYPE: &str = "AdaptiveCard";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundPayload {
    PlainText {
        text: String,
    },
    /// `source` is kept so a destination that rejects the card can still get the file.
    Card {
        text: String,
        card: Value,
        source: Attachment,
    },
    Attachment {
        text: String,
        attachment: Attachment,
    },
}

impl OutboundPayload {
    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Card { text, .. } | Self::Attachment { text, .. } => {
                text
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlainText { .. } => "plain_text",
            Self::Card { .. } => "card",
            Self::Attachment { .. } => "attachment",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("card attachment is not valid JSON: {0}")]
    Parse(String),
    #[error("card document is invalid: {0}")]
    Invalid(String),
}

/// Payload plus the card problem that forced an attachment fallback, if any.
/// The problem is for logs only; destinations never see it.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformOutcome {
    pub payload: OutboundPayload,
    pub card_error: Option<CardError>,
}

pub fn attribute(message: &InboundMessage, locale: Locale) -> String {
    let mut text = locale.message_from(&message.author.display_name, &message.author.email);
    text.push_str(&message.text);
    text
}

pub fn transform(message: &InboundMessage, locale: Locale) -> TransformOutcome {
    let text = attribute(message, locale);

    // The platform accepts one file per message; anything past the first is dropped.
    let Some(attachment) = message.attachments.first() else {
        return TransformOutcome { payload: OutboundPayload::PlainText { text }, card_error: None };
    };

    if attachment.essence() != CARD_SOURCE_MIME {
        return TransformOutcome {
            payload: OutboundPayload::Attachment { text, attachment: attachment.clone() },
            card_error: None,
        };
    }

    match parse_card(&attachment.content) {
        Ok(card) => TransformOutcome {
            payload: OutboundPayload::Card { text, card, source: attachment.clone() },
            card_error: None,
        },
        Err(error) => TransformOutcome {
            payload: OutboundPayload::Attachment { text, attachment: attachment.clone() },
            card_error: Some(error),
        },
    }
}

/// Parses and validates an adaptive card document.
pub fn parse_card(content: &[u8]) -> Result<Value, CardError> {
    let card: Value =
        serde_json::from_slice(content).map_err(|error| CardError::Parse(error.to_string()))?;
    validate_card(&card)?;
    Ok(card)
}

pub fn validate_card(card: &Value) -> Result<(), CardError> {
    let Some(document) = card.as_object() else {
        return Err(CardError::Invalid("top level must be an object".to_owned()));
    };

    match document.get("type").and_then(Value::as_str) {
        Some(CARD_TYPE) => {}
        Some(other) => {
            return Err(CardError::Invalid(format!("`type` must be `{CARD_TYPE}`, got `{other}`")))
        }
        None => return Err(CardError::Invalid("missing `type`".to_owned())),
    }

    if !document.get("version").is_some_and(Value::is_string) {
        return Err(CardError::Invalid("`version` must be a string".to_owned()));
    }

    for key in ["body", "actions"] {
        if document.get(key).is_some_and(|value| !value.is_array()) {
            return Err(CardError::Invalid(format!("`{key}` must be an array")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{transform, CardError, OutboundPayload};
    use crate::domain::{
        Attachment, Conversation, ConversationKind, Identity, InboundMessage, MessageId,
    };
    use crate::locale::Locale;

    const CARD: &str =
        r#"{"type":"AdaptiveCard","version":"1.2","body":[{"type":"TextBlock","text":"Hi"}]}"#;

    fn message(text: &str, attachments: Vec<Attachment>) -> InboundMessage {
        InboundMessage {
            id: MessageId("M-1".to_owned()),
            author: Identity::new("P-1", "Ada Lovelace", "ada@example.com", "ORG-X"),
            origin: Conversation::new("R-ORIGIN", ConversationKind::Direct, Some("ORG-X")),
            text: text.to_owned(),
            attachments,
        }
    }

    fn prefix_count(text: &str) -> usize {
        text.matches("Message from Ada Lovelace (ada@example.com):").count()
    }

    #[test]
    fn plain_message_gets_single_attribution_prefix() {
        let outcome = transform(&message("hello all", vec![]), Locale::EnUs);

        assert_eq!(
            outcome.payload,
            OutboundPayload::PlainText {
                text: "Message from Ada Lovelace (ada@example.com):  \n\nhello all".to_owned()
            }
        );
        assert!(outcome.card_error.is_none());
    }

    #[test]
    fn empty_body_still_gets_exactly_one_prefix() {
        let outcome = transform(&message("", vec![]), Locale::EnUs);
        assert_eq!(prefix_count(outcome.payload.text()), 1);
        assert!(outcome.payload.text().starts_with("Message from Ada Lovelace"));
    }

    #[test]
    fn valid_card_attachment_becomes_card_payload() {
        let attachment = Attachment::new("form.json", "application/json", CARD.as_bytes().to_vec());
        let outcome = transform(&message("see form", vec![attachment.clone()]), Locale::EnUs);

        match outcome.payload {
            OutboundPayload::Card { text, card, source } => {
                assert_eq!(prefix_count(&text), 1);
                assert_eq!(card["type"], "AdaptiveCard");
                assert_eq!(source, attachment);
            }
            other => panic!("expected card payload, got {other:?}"),
        }
    }

    #[test]
    fn malformed_card_falls_back_to_untouched_attachment() {
        let raw = b"{\"type\": \"AdaptiveCard\", \"version\": ".to_vec();
        let attachment =
            Attachment::new("broken.json", "application/json; charset=utf-8", raw.clone());
        let outcome = transform(&message("", vec![attachment]), Locale::EnUs);

        match &outcome.payload {
            OutboundPayload::Attachment { attachment, .. } => {
                assert_eq!(attachment.content, raw);
                assert_eq!(attachment.mime_type, "application/json; charset=utf-8");
            }
            other => panic!("expected attachment payload, got {other:?}"),
        }
        assert!(matches!(outcome.card_error, Some(CardError::Parse(_))));
    }

    #[test]
    fn json_that_is_not_a_card_falls_back() {
        let raw = br#"{"type":"Invoice","version":"1"}"#.to_vec();
        let attachment = Attachment::new("data.json", "application/json", raw.clone());
        let outcome = transform(&message("numbers", vec![attachment]), Locale::EnUs);

        assert!(matches!(
            outcome.payload,
            OutboundPayload::Attachment { ref attachment, .. } if attachment.content == raw
        ));
        assert!(matches!(outcome.card_error, Some(CardError::Invalid(_))));
    }

    #[test]
    fn non_card_attachment_passes_through() {
        let attachment = Attachment::new("photo.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
        let outcome = transform(&message("pic", vec![attachment.clone()]), Locale::EnUs);

        assert_eq!(
            outcome.payload,
            OutboundPayload::Attachment {
                text: "Message from Ada Lovelace (ada@example.com):  \n\npic".to_owned(),
                attachment,
            }
        );
    }

    #[test]
    fn only_first_attachment_is_used() {
        let first = Attachment::new("a.txt", "text/plain", b"first".to_vec());
        let second = Attachment::new("b.json", "application/json", CARD.as_bytes().to_vec());
        let outcome = transform(&message("two files", vec![first.clone(), second]), Locale::EnUs);

        assert!(matches!(
            outcome.payload,
            OutboundPayload::Attachment { ref attachment, .. } if *attachment == first
        ));
    }

    #[test]
    fn card_validation_rejects_non_array_body() {
        let card = serde_json::json!({"type": "AdaptiveCard", "version": "1.2", "body": "nope"});
        assert!(matches!(super::validate_card(&card), Err(CardError::Invalid(_))));
    }
}
