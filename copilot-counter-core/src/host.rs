//! Host application model: event subscription, chat history and transcript
//! replay.
//!
//! A host transcript is JSON Lines, one record per line:
//!
//! ```text
//! {"type":"request","url":"http://localhost:4141/v1/chat/completions","body":{"messages":[]}}
//! {"type":"message","message":{"is_user":false,"mes":"Hi!","send_date":1700000000000}}
//! {"type":"event","name":"MESSAGE_RECEIVED"}
//! ```
//!
//! `request` and `event` records take an optional RFC 3339 `at`. Blank lines and
//! `#` comments are ignored.

use std::collections::HashMap;
use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::CounterEngine;
use crate::error::{Error, Result};
use crate::observer::{OutboundRequest, RequestBody, RequestObserver};
use crate::types::{ChatMessage, Classification, LifecycleEvent};

// ============================================
// Event subscription
// ============================================

/// A lifecycle event as delivered to subscribers.
#[derive(Debug, Clone, Copy)]
pub struct HostEvent<'a> {
    pub kind: LifecycleEvent,
    pub history: &'a [ChatMessage],
    pub at: DateTime<Utc>,
}

pub type EventHandler = Box<dyn FnMut(&HostEvent<'_>) + Send>;

/// The host's `on(eventName, handler)` registry.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<LifecycleEvent, Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, event: LifecycleEvent, handler: F)
    where
        F: FnMut(&HostEvent<'_>) + Send + 'static,
    {
        self.handlers
            .entry(event)
            .or_default()
            .push(Box::new(handler));
    }

    /// Call every handler for `kind`, in registration order. Returns how many ran.
    pub fn emit(&mut self, kind: LifecycleEvent, history: &[ChatMessage], at: DateTime<Utc>) -> usize {
        let event = HostEvent { kind, history, at };
        match self.handlers.get_mut(&kind) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(&event);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn handler_count(&self, kind: LifecycleEvent) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }
}

// ============================================
// Transcript records
// ============================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRecord {
    Request {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        body: Value,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
    Message {
        message: Value,
    },
    Event {
        name: String,
        #[serde(default)]
        at: Option<DateTime<Utc>>,
    },
}

/// Parse one transcript line. `Ok(None)` for blank lines and comments.
pub fn parse_record(line_number: usize, line: &str) -> Result<Option<HostRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::Replay {
            line: line_number,
            message: e.to_string(),
        })
}

fn request_body(body: Value) -> RequestBody {
    match body {
        Value::Null => RequestBody::Empty,
        Value::String(text) => RequestBody::Text(text),
        other => RequestBody::Json(other),
    }
}

// ============================================
// Host session
// ============================================

/// Totals for a replayed transcript.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub records: usize,
    pub requests: usize,
    pub target_requests: usize,
    pub messages: usize,
    pub events: usize,
    pub malformed: usize,
    pub counted: u64,
}

/// A simulated host: chat history, event bus and observed request dispatch.
pub struct HostSession {
    engine: CounterEngine,
    observer: RequestObserver,
    bus: EventBus,
    history: Vec<ChatMessage>,
}

impl HostSession {
    pub fn new(engine: CounterEngine) -> Self {
        let mut bus = EventBus::new();
        engine.subscribe(&mut bus);
        let observer = engine.observer();
        Self {
            engine,
            observer,
            bus,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn engine(&self) -> &CounterEngine {
        &self.engine
    }

    /// Apply one record, updating `summary`.
    pub fn apply(&mut self, record: HostRecord, summary: &mut ReplaySummary) {
        summary.records += 1;
        match record {
            HostRecord::Request {
                url,
                method,
                body,
                at,
            } => {
                summary.requests += 1;
                let request = OutboundRequest::new(
                    method.unwrap_or_else(|| "POST".to_string()),
                    url,
                    request_body(body),
                );
                let classification = self
                    .observer
                    .observe_at(&request, at.unwrap_or_else(Utc::now));
                if classification == Some(Classification::Target) {
                    summary.target_requests += 1;
                }
            }
            HostRecord::Message { message } => {
                summary.messages += 1;
                self.history.push(ChatMessage::new(message));
            }
            HostRecord::Event { name, at } => match name.parse::<LifecycleEvent>() {
                Ok(kind) => {
                    summary.events += 1;
                    self.bus
                        .emit(kind, &self.history, at.unwrap_or_else(Utc::now));
                }
                Err(e) => {
                    summary.malformed += 1;
                    tracing::warn!(error = %e, "Ignoring unknown host event");
                }
            },
        }
    }

    /// Apply one transcript line. Malformed lines are logged and counted.
    pub fn apply_line(&mut self, line_number: usize, line: &str, summary: &mut ReplaySummary) {
        match parse_record(line_number, line) {
            Ok(Some(record)) => self.apply(record, summary),
            Ok(None) => {}
            Err(e) => {
                summary.malformed += 1;
                tracing::warn!(error = %e, "Skipping malformed transcript line");
            }
        }
    }

    /// Replay a whole transcript.
    pub fn replay<R: BufRead>(&mut self, reader: R) -> Result<ReplaySummary> {
        let before = self.engine.state()?.total;
        let mut summary = ReplaySummary::default();
        for (index, line) in reader.lines().enumerate() {
            self.apply_line(index + 1, &line?, &mut summary);
        }
        summary.counted = self.engine.state()?.total.saturating_sub(before);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::settings::MemorySettings;
    use std::sync::{Arc, Mutex};

    fn session() -> HostSession {
        HostSession::new(CounterEngine::new(
            &Config::default(),
            Box::new(MemorySettings::new()),
        ))
    }

    #[test]
    fn test_bus_calls_handlers_in_order() {
        let mut bus = EventBus::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        for id in 0..2 {
            let calls = Arc::clone(&calls);
            bus.on(LifecycleEvent::MessageReceived, move |event| {
                calls.lock().unwrap().push((id, event.kind));
            });
        }

        assert_eq!(bus.emit(LifecycleEvent::MessageReceived, &[], Utc::now()), 2);
        assert_eq!(bus.emit(LifecycleEvent::GenerationEnded, &[], Utc::now()), 0);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                (0, LifecycleEvent::MessageReceived),
                (1, LifecycleEvent::MessageReceived)
            ]
        );
    }

    #[test]
    fn test_parse_record_variants() {
        assert_eq!(parse_record(1, "   ").unwrap(), None);
        assert_eq!(parse_record(2, "# comment").unwrap(), None);
        assert!(matches!(
            parse_record(3, r#"{"type":"event","name":"GENERATION_ENDED"}"#).unwrap(),
            Some(HostRecord::Event { .. })
        ));
        assert!(matches!(
            parse_record(4, "{not json"),
            Err(Error::Replay { line: 4, .. })
        ));
    }

    #[test]
    fn test_replay_counts_copilot_reply() {
        let transcript = r#"
{"type":"request","url":"http://localhost:4141/v1/chat/completions","body":{"messages":[],"model":"gpt-4"}}
{"type":"message","message":{"is_user":false,"mes":"Hello!","send_date":1700000000000}}
{"type":"event","name":"CHARACTER_MESSAGE_RENDERED"}
{"type":"event","name":"MESSAGE_RECEIVED"}
"#;
        let mut session = session();
        let summary = session.replay(transcript.as_bytes()).unwrap();

        assert_eq!(summary.requests, 1);
        assert_eq!(summary.target_requests, 1);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.counted, 1);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_replay_tolerates_garbage() {
        let transcript = "garbage\n{\"type\":\"event\",\"name\":\"NOPE\"}\n";
        let mut session = session();
        let summary = session.replay(transcript.as_bytes()).unwrap();
        assert_eq!(summary.malformed, 2);
        assert_eq!(summary.counted, 0);
    }

    #[test]
    fn test_string_body_is_text() {
        assert_eq!(
            request_body(Value::String("{\"prompt\":\"x\"}".to_string())),
            RequestBody::Text("{\"prompt\":\"x\"}".to_string())
        );
        assert_eq!(request_body(Value::Null), RequestBody::Empty);
    }
}
