//! Deduplication keys for host chat messages.
//!
//! A signature is `"<timestamp-or-id>|<first 80 chars of trimmed text>"`. The
//! host can report one reply through several lifecycle events; they all map to
//! the same signature.

use crate::config::FieldsConfig;
use crate::types::{ChatMessage, FieldPath};

/// Characters of trimmed text kept in a signature.
pub const SIGNATURE_TEXT_CHARS: usize = 80;

/// Signature of a message with neither text nor id.
pub const DEGENERATE_SIGNATURE: &str = "|";

/// Builds signatures from ordered candidate field lists.
#[derive(Debug, Clone)]
pub struct SignatureBuilder {
    text_fields: Vec<FieldPath>,
    id_fields: Vec<FieldPath>,
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::from_config(&FieldsConfig::default())
    }
}

impl SignatureBuilder {
    pub fn new(text_fields: Vec<FieldPath>, id_fields: Vec<FieldPath>) -> Self {
        Self {
            text_fields,
            id_fields,
        }
    }

    pub fn from_config(config: &FieldsConfig) -> Self {
        Self::new(
            FieldPath::parse_all(&config.text),
            FieldPath::parse_all(&config.id),
        )
    }

    /// Message text from the first populated text candidate, or "".
    pub fn text<'a>(&self, message: &'a ChatMessage) -> &'a str {
        message.first_text(&self.text_fields).unwrap_or("")
    }

    pub fn signature(&self, message: &ChatMessage) -> String {
        let id = message.first_id(&self.id_fields).unwrap_or_default();
        let text: String = self
            .text(message)
            .trim()
            .chars()
            .take(SIGNATURE_TEXT_CHARS)
            .collect();
        format!("{}|{}", id, text)
    }
}

/// Degenerate signatures must never be counted.
pub fn is_degenerate(signature: &str) -> bool {
    signature == DEGENERATE_SIGNATURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signature_with_timestamp() {
        let builder = SignatureBuilder::default();
        let msg = ChatMessage::new(json!({"send_date": 1700000000000u64, "mes": "  Hello there  "}));
        assert_eq!(builder.signature(&msg), "1700000000000|Hello there");
    }

    #[test]
    fn test_signature_without_id() {
        let builder = SignatureBuilder::default();
        let msg = ChatMessage::new(json!({"content": "reply"}));
        assert_eq!(builder.signature(&msg), "|reply");
    }

    #[test]
    fn test_signature_truncates_to_80_chars() {
        let builder = SignatureBuilder::default();
        let long = "é".repeat(200);
        let msg = ChatMessage::new(json!({"id": "m1", "mes": long}));
        let sig = builder.signature(&msg);
        assert_eq!(sig.chars().count(), "m1|".len() + SIGNATURE_TEXT_CHARS);
    }

    #[test]
    fn test_degenerate_signature() {
        let builder = SignatureBuilder::default();
        let msg = ChatMessage::new(json!({"mes": "   "}));
        let sig = builder.signature(&msg);
        assert_eq!(sig, DEGENERATE_SIGNATURE);
        assert!(is_degenerate(&sig));
        assert!(!is_degenerate("|text"));
    }

    #[test]
    fn test_candidate_order_is_configurable() {
        let builder = SignatureBuilder::new(
            FieldPath::parse_all(&["text", "mes"]),
            FieldPath::parse_all(&["id", "send_date"]),
        );
        let msg = ChatMessage::new(json!({
            "mes": "from mes",
            "text": "from text",
            "send_date": 1,
            "id": "x"
        }));
        assert_eq!(builder.signature(&msg), "x|from text");
    }
}
