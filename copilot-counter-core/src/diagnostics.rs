//! Live diagnostic log shown on the dashboard.
//!
//! A bounded ring buffer; every entry is also forwarded to `tracing`.

use std::collections::VecDeque;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
}

impl DiagnosticLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLevel::Debug => "debug",
            DiagnosticLevel::Info => "info",
            DiagnosticLevel::Warn => "warn",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub at: DateTime<Local>,
    pub level: DiagnosticLevel,
    pub message: String,
}

impl DiagnosticEntry {
    /// `HH:MM:SS message`
    pub fn format_line(&self) -> String {
        format!("{} {}", self.at.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: VecDeque<DiagnosticEntry>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            DiagnosticLevel::Debug => tracing::debug!(target: "copilot_counter::diag", "{}", message),
            DiagnosticLevel::Info => tracing::info!(target: "copilot_counter::diag", "{}", message),
            DiagnosticLevel::Warn => tracing::warn!(target: "copilot_counter::diag", "{}", message),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(DiagnosticEntry {
            at: Local::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Warn, message);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(DiagnosticLevel::Debug, message);
    }

    /// Up to `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<DiagnosticEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut log = DiagnosticLog::new(3);
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent[0].message, "entry 2");
        assert_eq!(recent[2].message, "entry 4");
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut log = DiagnosticLog::new(10);
        log.info("a");
        log.warn("b");
        log.debug("c");
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].level, DiagnosticLevel::Warn);
        assert!(recent[1].format_line().ends_with(" c"));
    }
}
