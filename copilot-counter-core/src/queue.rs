//! Time-bounded FIFO of attribution tokens.
//!
//! Tokens are consumed oldest-first. When generations overlap the consumed
//! token is not necessarily the one produced by the request behind the reply
//! being counted; oldest-first is the accepted approximation.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::types::AttributionToken;

/// Largest window chrono can represent, in whole seconds.
const MAX_WINDOW_SECS: u64 = (i64::MAX / 1000) as u64;

#[derive(Debug, Clone)]
pub struct TokenQueue {
    tokens: VecDeque<AttributionToken>,
    window: Duration,
}

impl TokenQueue {
    pub fn new(window: Duration) -> Self {
        Self {
            tokens: VecDeque::new(),
            window,
        }
    }

    pub fn with_window_secs(secs: u64) -> Self {
        let secs = secs.min(MAX_WINDOW_SECS) as i64;
        Self::new(Duration::seconds(secs))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn push(&mut self, token: AttributionToken) {
        self.tokens.push_back(token);
    }

    /// Remove and return the oldest unexpired token.
    pub fn consume(&mut self) -> Option<AttributionToken> {
        self.consume_at(Utc::now())
    }

    pub fn consume_at(&mut self, now: DateTime<Utc>) -> Option<AttributionToken> {
        self.prune(now);
        self.tokens.pop_front()
    }

    /// Drop tokens older than the window. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.tokens.len();
        let window = self.window;
        self.tokens
            .retain(|token| now.signed_duration_since(token.observed_at) <= window);
        before - self.tokens.len()
    }

    /// Unexpired tokens at `now`, without mutating the queue.
    pub fn pending_at(&self, now: DateTime<Utc>) -> usize {
        self.tokens
            .iter()
            .filter(|token| now.signed_duration_since(token.observed_at) <= self.window)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fifo_consumption() {
        let mut queue = TokenQueue::with_window_secs(120);
        queue.push(AttributionToken::target("a", t0()));
        queue.push(AttributionToken::target("b", t0() + Duration::seconds(1)));

        let now = t0() + Duration::seconds(2);
        assert_eq!(queue.consume_at(now).unwrap().source_url, "a");
        assert_eq!(queue.consume_at(now).unwrap().source_url, "b");
        assert!(queue.consume_at(now).is_none());
    }

    #[test]
    fn test_expired_token_is_not_consumable() {
        let mut queue = TokenQueue::with_window_secs(120);
        queue.push(AttributionToken::target("a", t0()));

        let later = t0() + Duration::seconds(120) + Duration::milliseconds(1);
        assert!(queue.consume_at(later).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_token_at_window_edge_is_consumable() {
        let mut queue = TokenQueue::with_window_secs(120);
        queue.push(AttributionToken::target("a", t0()));
        assert!(queue.consume_at(t0() + Duration::seconds(120)).is_some());
    }

    #[test]
    fn test_prune_skips_to_oldest_unexpired() {
        let mut queue = TokenQueue::with_window_secs(60);
        queue.push(AttributionToken::target("old", t0()));
        queue.push(AttributionToken::target("fresh", t0() + Duration::seconds(90)));

        let now = t0() + Duration::seconds(100);
        assert_eq!(queue.pending_at(now), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.consume_at(now).unwrap().source_url, "fresh");
    }

    #[test]
    fn test_clear() {
        let mut queue = TokenQueue::with_window_secs(60);
        queue.push(AttributionToken::target("a", t0()));
        queue.clear();
        assert!(queue.is_empty());
    }
}
