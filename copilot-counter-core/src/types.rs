//! Core domain types for copilot-counter
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Target backend** | The locally proxied completion endpoint on the loopback port (Copilot) |
//! | **Excluded backend** | A cloud provider whose traffic must never be attributed to the target |
//! | **Attribution token** | Evidence that a target-backend request was recently dispatched |
//! | **Signature** | Dedup key built from a message's timestamp/id and text |
//! | **Lifecycle event** | A host notification that a message or generation reached a stage |
//!
//! Host chat messages have no stable schema. [`ChatMessage`] keeps the raw JSON
//! and every read goes through an ordered list of candidate [`FieldPath`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================
// Attribution
// ============================================

/// Operator override of the backend classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMode {
    /// Count only replies that consume an attribution token
    #[default]
    Auto,
    /// Count every qualifying reply regardless of backend
    ForceOn,
    /// Count nothing
    ForceOff,
}

impl AttributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionMode::Auto => "auto",
            AttributionMode::ForceOn => "force_on",
            AttributionMode::ForceOff => "force_off",
        }
    }

    /// Next mode in the dashboard's toggle cycle.
    pub fn cycle(self) -> Self {
        match self {
            AttributionMode::Auto => AttributionMode::ForceOn,
            AttributionMode::ForceOn => AttributionMode::ForceOff,
            AttributionMode::ForceOff => AttributionMode::Auto,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AttributionMode::Auto => "Auto",
            AttributionMode::ForceOn => "Force on",
            AttributionMode::ForceOff => "Force off",
        }
    }
}

impl std::str::FromStr for AttributionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(AttributionMode::Auto),
            "force_on" | "on" => Ok(AttributionMode::ForceOn),
            "force_off" | "off" => Ok(AttributionMode::ForceOff),
            _ => Err(format!("unknown attribution mode: {}", s)),
        }
    }
}

impl std::fmt::Display for AttributionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of fingerprinting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// The target backend (Copilot on the loopback port)
    Target,
    /// A known competing backend
    Excluded,
    /// Anything else
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Target => "target",
            Classification::Excluded => "excluded",
            Classification::Other => "other",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient evidence that a target-backend request was dispatched.
///
/// Lives in the [`crate::queue::TokenQueue`] until consumed or expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionToken {
    pub observed_at: DateTime<Utc>,
    pub classification: Classification,
    /// Diagnostic only
    pub source_url: String,
}

impl AttributionToken {
    pub fn target(source_url: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            classification: Classification::Target,
            source_url: source_url.into(),
        }
    }
}

// ============================================
// Host lifecycle events
// ============================================

/// Chat lifecycle events emitted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleEvent {
    GenerationStarted,
    GenerationEnded,
    CharacterMessageRendered,
    MessageReceived,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 4] = [
        LifecycleEvent::GenerationStarted,
        LifecycleEvent::GenerationEnded,
        LifecycleEvent::CharacterMessageRendered,
        LifecycleEvent::MessageReceived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::GenerationStarted => "GENERATION_STARTED",
            LifecycleEvent::GenerationEnded => "GENERATION_ENDED",
            LifecycleEvent::CharacterMessageRendered => "CHARACTER_MESSAGE_RENDERED",
            LifecycleEvent::MessageReceived => "MESSAGE_RECEIVED",
        }
    }

    /// Whether this event may count an assistant reply.
    pub fn is_counting(&self) -> bool {
        !matches!(self, LifecycleEvent::GenerationStarted)
    }
}

impl std::str::FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GENERATION_STARTED" => Ok(LifecycleEvent::GenerationStarted),
            "GENERATION_ENDED" => Ok(LifecycleEvent::GenerationEnded),
            "CHARACTER_MESSAGE_RENDERED" => Ok(LifecycleEvent::CharacterMessageRendered),
            // Older hosts spell it without the trailing D
            "MESSAGE_RECEIVED" | "MESSAGE_RECEIVE" => Ok(LifecycleEvent::MessageReceived),
            _ => Err(format!("unknown lifecycle event: {}", s)),
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Host chat messages
// ============================================

/// A dotted path into a JSON object, e.g. `data.mes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Parse a list of dotted paths, keeping their order.
    pub fn parse_all<S: AsRef<str>>(paths: &[S]) -> Vec<Self> {
        paths.iter().map(|p| Self::parse(p.as_ref())).collect()
    }

    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        if self.0.is_empty() {
            return None;
        }
        self.0
            .iter()
            .try_fold(value, |current, segment| current.as_object()?.get(segment))
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A chat message owned by the host. Read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(Value);

impl ChatMessage {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    /// Top-level field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// First candidate holding a non-empty string.
    pub fn first_text(&self, candidates: &[FieldPath]) -> Option<&str> {
        candidates.iter().find_map(|path| {
            path.resolve(&self.0)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
    }

    /// First candidate holding a non-empty string or a number.
    pub fn first_id(&self, candidates: &[FieldPath]) -> Option<String> {
        candidates
            .iter()
            .find_map(|path| match path.resolve(&self.0)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    /// Authored by the assistant: `is_user == false` or a role field equal to
    /// `"assistant"`.
    pub fn is_assistant(&self, role_fields: &[FieldPath]) -> bool {
        if self.get("is_user").and_then(Value::as_bool) == Some(false) {
            return true;
        }
        role_fields.iter().any(|path| {
            path.resolve(&self.0)
                .and_then(Value::as_str)
                .is_some_and(|role| role == "assistant")
        })
    }

    /// Error-flagged by any of the host's error conventions.
    pub fn is_error(&self) -> bool {
        if self.get("is_error").and_then(Value::as_bool) == Some(true) {
            return true;
        }
        match self.get("error") {
            Some(Value::Bool(true)) => return true,
            Some(Value::String(s)) if !s.trim().is_empty() => return true,
            _ => {}
        }
        ["type", "status"]
            .iter()
            .any(|key| self.get(key).and_then(Value::as_str) == Some("error"))
    }
}

impl From<Value> for ChatMessage {
    fn from(raw: Value) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mode_parse_and_cycle() {
        assert_eq!("force-on".parse::<AttributionMode>(), Ok(AttributionMode::ForceOn));
        assert_eq!("FORCE_OFF".parse::<AttributionMode>(), Ok(AttributionMode::ForceOff));
        assert!("sometimes".parse::<AttributionMode>().is_err());
        assert_eq!(AttributionMode::ForceOff.cycle(), AttributionMode::Auto);
    }

    #[test]
    fn test_lifecycle_event_aliases() {
        assert_eq!(
            "message_receive".parse::<LifecycleEvent>(),
            Ok(LifecycleEvent::MessageReceived)
        );
        assert_eq!(
            "character_message_rendered".parse::<LifecycleEvent>(),
            Ok(LifecycleEvent::CharacterMessageRendered)
        );
        assert!(!LifecycleEvent::GenerationStarted.is_counting());
        assert!(LifecycleEvent::GenerationEnded.is_counting());
    }

    #[test]
    fn test_field_path_resolve() {
        let value = json!({"data": {"mes": "nested"}, "mes": ""});
        assert_eq!(
            FieldPath::parse("data.mes").resolve(&value),
            Some(&json!("nested"))
        );
        assert_eq!(FieldPath::parse("data.missing").resolve(&value), None);
        assert_eq!(FieldPath::parse("").resolve(&value), None);
    }

    #[test]
    fn test_first_text_skips_empty_candidates() {
        let msg = ChatMessage::new(json!({"mes": "", "content": "hello"}));
        let candidates = FieldPath::parse_all(&["mes", "content"]);
        assert_eq!(msg.first_text(&candidates), Some("hello"));
    }

    #[test]
    fn test_first_id_accepts_numbers() {
        let msg = ChatMessage::new(json!({"send_date": 1700000000000u64, "id": "abc"}));
        let candidates = FieldPath::parse_all(&["send_date", "id"]);
        assert_eq!(msg.first_id(&candidates).as_deref(), Some("1700000000000"));
    }

    #[test]
    fn test_is_assistant_variants() {
        let roles = FieldPath::parse_all(&["role", "sender"]);
        assert!(ChatMessage::new(json!({"is_user": false})).is_assistant(&roles));
        assert!(ChatMessage::new(json!({"role": "assistant"})).is_assistant(&roles));
        assert!(ChatMessage::new(json!({"sender": "assistant"})).is_assistant(&roles));
        assert!(!ChatMessage::new(json!({"is_user": true, "role": "user"})).is_assistant(&roles));
    }

    #[test]
    fn test_is_error_variants() {
        assert!(ChatMessage::new(json!({"is_error": true})).is_error());
        assert!(ChatMessage::new(json!({"error": true})).is_error());
        assert!(ChatMessage::new(json!({"error": "rate limited"})).is_error());
        assert!(ChatMessage::new(json!({"type": "error"})).is_error());
        assert!(ChatMessage::new(json!({"status": "error"})).is_error());
        assert!(!ChatMessage::new(json!({"error": "  ", "status": "ok"})).is_error());
    }
}
