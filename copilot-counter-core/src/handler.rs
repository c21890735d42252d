//! Message lifecycle event handling.
//!
//! For each counting event:
//! 1. decide eligibility from the attribution mode (AUTO consumes one token)
//! 2. resolve the latest assistant message in chat history
//! 3. reject error-flagged, empty, degenerate or duplicate messages
//! 4. remember the signature and increment the counter
//!
//! The host may emit any subset of events for one reply, in any order. The
//! signature check makes repeats harmless. Nothing here is surfaced as an
//! error; every negative outcome is a [`SkipReason`].

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::FieldsConfig;
use crate::counter::Counter;
use crate::diagnostics::DiagnosticLog;
use crate::queue::TokenQueue;
use crate::signature::{is_degenerate, SignatureBuilder};
use crate::types::{AttributionMode, ChatMessage, FieldPath, LifecycleEvent};

/// Why an event did not count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// GENERATION_STARTED never counts
    NotCountingEvent,
    ForcedOff,
    NoToken,
    NoAssistantMessage,
    ErrorMessage,
    EmptyText,
    DegenerateSignature,
    Duplicate,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotCountingEvent => "not a counting event",
            SkipReason::ForcedOff => "forced off",
            SkipReason::NoToken => "no token",
            SkipReason::NoAssistantMessage => "no assistant message",
            SkipReason::ErrorMessage => "error message",
            SkipReason::EmptyText => "empty text",
            SkipReason::DegenerateSignature => "degenerate signature",
            SkipReason::Duplicate => "duplicate",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Counted {
        signature: String,
        total: u64,
        today: u64,
    },
    Skipped(SkipReason),
}

impl EventOutcome {
    pub fn is_counted(&self) -> bool {
        matches!(self, EventOutcome::Counted { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            EventOutcome::Skipped(reason) => Some(*reason),
            EventOutcome::Counted { .. } => None,
        }
    }
}

/// Mutable state an event may touch.
pub struct HandlerContext<'a> {
    pub queue: &'a mut TokenQueue,
    pub counter: &'a mut Counter,
    pub diagnostics: &'a mut DiagnosticLog,
    pub now: DateTime<Utc>,
    /// Local calendar day of `now`; keys the `byDay` entry.
    pub today: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct MessageEventHandler {
    signatures: SignatureBuilder,
    role_fields: Vec<FieldPath>,
}

impl Default for MessageEventHandler {
    fn default() -> Self {
        Self::from_config(&FieldsConfig::default())
    }
}

impl MessageEventHandler {
    pub fn from_config(config: &FieldsConfig) -> Self {
        Self {
            signatures: SignatureBuilder::from_config(config),
            role_fields: FieldPath::parse_all(&config.role),
        }
    }

    pub fn signatures(&self) -> &SignatureBuilder {
        &self.signatures
    }

    /// Most recent assistant-authored message.
    pub fn latest_assistant<'a>(&self, history: &'a [ChatMessage]) -> Option<&'a ChatMessage> {
        history
            .iter()
            .rev()
            .find(|message| message.is_assistant(&self.role_fields))
    }

    /// Validity and dedup filters. Returns the signature to record.
    pub fn check_message(
        &self,
        message: &ChatMessage,
        last_signature: &str,
    ) -> Result<String, SkipReason> {
        if message.is_error() {
            return Err(SkipReason::ErrorMessage);
        }
        if self.signatures.text(message).trim().is_empty() {
            return Err(SkipReason::EmptyText);
        }
        let signature = self.signatures.signature(message);
        if is_degenerate(&signature) {
            return Err(SkipReason::DegenerateSignature);
        }
        if signature == last_signature {
            return Err(SkipReason::Duplicate);
        }
        Ok(signature)
    }

    pub fn handle(
        &self,
        event: LifecycleEvent,
        history: &[ChatMessage],
        ctx: HandlerContext<'_>,
    ) -> EventOutcome {
        let HandlerContext {
            queue,
            counter,
            diagnostics,
            now,
            today,
        } = ctx;

        if !event.is_counting() {
            let expired = queue.prune(now);
            diagnostics.debug(format!(
                "{}: {} pending token(s), {} expired",
                event,
                queue.len(),
                expired
            ));
            return EventOutcome::Skipped(SkipReason::NotCountingEvent);
        }

        let state = counter.state();
        let eligibility = match state.attribution_mode {
            AttributionMode::ForceOn => Ok(()),
            AttributionMode::ForceOff => Err(SkipReason::ForcedOff),
            AttributionMode::Auto => match queue.consume_at(now) {
                Some(token) => {
                    diagnostics.debug(format!("{}: consumed token from {}", event, token.source_url));
                    Ok(())
                }
                None => Err(SkipReason::NoToken),
            },
        };

        let outcome = eligibility
            .and_then(|()| {
                self.latest_assistant(history)
                    .ok_or(SkipReason::NoAssistantMessage)
            })
            .and_then(|message| self.check_message(message, &state.last_signature));

        match outcome {
            Ok(signature) => {
                let state = counter.record(signature.clone(), today);
                let today_count = state.count_on(today);
                diagnostics.info(format!(
                    "{}: counted (today {}, total {})",
                    event, today_count, state.total
                ));
                EventOutcome::Counted {
                    signature,
                    total: state.total,
                    today: today_count,
                }
            }
            Err(reason) => {
                diagnostics.info(format!("{}: skipped ({})", event, reason));
                EventOutcome::Skipped(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::local_date;
    use crate::settings::MemorySettings;
    use crate::types::AttributionToken;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    struct Fixture {
        handler: MessageEventHandler,
        queue: TokenQueue,
        counter: Counter,
        diagnostics: DiagnosticLog,
        now: DateTime<Utc>,
        offset: FixedOffset,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                handler: MessageEventHandler::default(),
                queue: TokenQueue::with_window_secs(120),
                counter: Counter::new(Box::new(MemorySettings::new())),
                diagnostics: DiagnosticLog::new(50),
                now: Utc::now(),
                offset: FixedOffset::east_opt(0).unwrap(),
            }
        }

        fn handle(&mut self, event: LifecycleEvent, history: &[ChatMessage]) -> EventOutcome {
            self.handler.handle(
                event,
                history,
                HandlerContext {
                    queue: &mut self.queue,
                    counter: &mut self.counter,
                    diagnostics: &mut self.diagnostics,
                    now: self.now,
                    today: local_date(self.now, &self.offset),
                },
            )
        }

        fn push_token(&mut self) {
            self.queue
                .push(AttributionToken::target("http://localhost:4141/v1", self.now));
        }
    }

    fn reply(text: &str, send_date: u64) -> ChatMessage {
        ChatMessage::new(json!({"is_user": false, "mes": text, "send_date": send_date}))
    }

    fn user(text: &str) -> ChatMessage {
        ChatMessage::new(json!({"is_user": true, "mes": text}))
    }

    #[test]
    fn test_auto_without_token_does_not_count() {
        let mut fx = Fixture::new();
        let history = vec![user("hi"), reply("hello", 1)];
        let outcome = fx.handle(LifecycleEvent::MessageReceived, &history);

        assert_eq!(outcome, EventOutcome::Skipped(SkipReason::NoToken));
        assert_eq!(fx.counter.state().total, 0);
        assert!(fx
            .diagnostics
            .recent(1)[0]
            .message
            .contains("no token"));
    }

    #[test]
    fn test_auto_with_token_counts_once() {
        let mut fx = Fixture::new();
        fx.push_token();
        let history = vec![user("hi"), reply("hello", 1)];

        let outcome = fx.handle(LifecycleEvent::MessageReceived, &history);
        assert!(outcome.is_counted());
        assert!(fx.queue.is_empty());
        assert_eq!(fx.counter.state().last_signature, "1|hello");
    }

    #[test]
    fn test_duplicate_events_count_once() {
        let mut fx = Fixture::new();
        fx.counter.set_mode(AttributionMode::ForceOn);
        let history = vec![reply("same", 42)];

        assert!(fx.handle(LifecycleEvent::CharacterMessageRendered, &history).is_counted());
        assert_eq!(
            fx.handle(LifecycleEvent::MessageReceived, &history),
            EventOutcome::Skipped(SkipReason::Duplicate)
        );
        assert_eq!(fx.counter.state().total, 1);
    }

    #[test]
    fn test_force_on_rejects_empty_text() {
        let mut fx = Fixture::new();
        fx.counter.set_mode(AttributionMode::ForceOn);
        let history = vec![reply("   ", 7)];

        assert_eq!(
            fx.handle(LifecycleEvent::GenerationEnded, &history),
            EventOutcome::Skipped(SkipReason::EmptyText)
        );
        assert_eq!(fx.counter.state().total, 0);
    }

    #[test]
    fn test_force_off_ignores_tokens() {
        let mut fx = Fixture::new();
        fx.counter.set_mode(AttributionMode::ForceOff);
        fx.push_token();
        let history = vec![reply("hello", 1)];

        assert_eq!(
            fx.handle(LifecycleEvent::MessageReceived, &history),
            EventOutcome::Skipped(SkipReason::ForcedOff)
        );
        assert_eq!(fx.queue.len(), 1);
    }

    #[test]
    fn test_error_message_is_rejected() {
        let mut fx = Fixture::new();
        fx.counter.set_mode(AttributionMode::ForceOn);
        let history = vec![ChatMessage::new(
            json!({"is_user": false, "mes": "Request failed", "is_error": true}),
        )];

        assert_eq!(
            fx.handle(LifecycleEvent::MessageReceived, &history),
            EventOutcome::Skipped(SkipReason::ErrorMessage)
        );
    }

    #[test]
    fn test_no_assistant_message() {
        let mut fx = Fixture::new();
        fx.push_token();
        let history = vec![user("only me")];

        assert_eq!(
            fx.handle(LifecycleEvent::MessageReceived, &history),
            EventOutcome::Skipped(SkipReason::NoAssistantMessage)
        );
        // AUTO consumes before looking at the message
        assert!(fx.queue.is_empty());
    }

    #[test]
    fn test_latest_assistant_is_most_recent() {
        let handler = MessageEventHandler::default();
        let history = vec![
            reply("first", 1),
            user("again"),
            ChatMessage::new(json!({"role": "assistant", "content": "second"})),
            user("trailing user message"),
        ];
        let latest = handler.latest_assistant(&history).unwrap();
        assert_eq!(handler.signatures().text(latest), "second");
    }

    #[test]
    fn test_generation_started_never_consumes() {
        let mut fx = Fixture::new();
        fx.push_token();
        let history = vec![reply("hello", 1)];

        assert_eq!(
            fx.handle(LifecycleEvent::GenerationStarted, &history),
            EventOutcome::Skipped(SkipReason::NotCountingEvent)
        );
        assert_eq!(fx.queue.len(), 1);
        assert_eq!(fx.counter.state().total, 0);
    }

    #[test]
    fn test_day_key_follows_local_midnight() {
        let mut fx = Fixture::new();
        fx.offset = FixedOffset::east_opt(9 * 3600).unwrap();

        // 23:59:59 and 00:00:01 in UTC+9, still the same UTC day
        fx.now = Utc.with_ymd_and_hms(2025, 6, 30, 14, 59, 59).unwrap();
        fx.push_token();
        assert!(fx
            .handle(LifecycleEvent::MessageReceived, &[reply("late", 1)])
            .is_counted());

        fx.now = Utc.with_ymd_and_hms(2025, 6, 30, 15, 0, 1).unwrap();
        fx.push_token();
        let outcome = fx.handle(LifecycleEvent::MessageReceived, &[reply("early", 2)]);
        assert_eq!(
            outcome,
            EventOutcome::Counted {
                signature: "2|early".to_string(),
                total: 2,
                today: 1,
            }
        );

        let state = fx.counter.state();
        assert_eq!(state.by_day.get("2025-06-30"), Some(&1));
        assert_eq!(state.by_day.get("2025-07-01"), Some(&1));
    }
}
