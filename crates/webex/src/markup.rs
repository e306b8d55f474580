//! Webex-specific message markup: card wrapping, mention stripping, space links.

use std::sync::OnceLock;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use regex::Regex;
use relay_core::ConversationId;
use serde_json::{json, Value};

pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// Wraps a card document in the attachment envelope the messages API expects.
pub fn card_attachment(card: &Value) -> Value {
    json!({
        "contentType": ADAPTIVE_CARD_CONTENT_TYPE,
        "content": card,
    })
}

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)<spark-mention[^>]*>.*?</spark-mention>\s*").ok())
        .as_ref()
}

/// Removes `<spark-mention>` elements (and the whitespace after them) from an HTML body.
pub fn strip_mentions(html: &str) -> String {
    match mention_pattern() {
        Some(pattern) => pattern.replace_all(html, "").trim().to_owned(),
        None => html.trim().to_owned(),
    }
}

/// Client deep link for a group space, decoded from its `ciscospark://` room id.
pub fn space_deep_link(conversation: &ConversationId) -> Option<String> {
    let encoded = conversation.0.trim().trim_end_matches('=');
    let decoded =
        STANDARD_NO_PAD.decode(encoded).or_else(|_| URL_SAFE_NO_PAD.decode(encoded)).ok()?;
    let uri = String::from_utf8(decoded).ok()?;
    if !uri.starts_with("ciscospark://") {
        return None;
    }

    let space = uri.rsplit('/').next().filter(|segment| !segment.is_empty())?;
    Some(format!("webexteams://im?space={space}"))
}
