//! Dashboard data for the counter overlay.
//!
//! Today / total cards, a 7-day histogram and the live diagnostic log.

use chrono::NaiveDate;

use crate::counter::{day_key, CounterState, DayCount};
use crate::diagnostics::DiagnosticEntry;
use crate::types::{AttributionMode, Classification};

/// Days shown in the histogram.
pub const DASHBOARD_DAYS: usize = 7;

/// Diagnostic lines carried in a snapshot.
pub const DASHBOARD_LOG_LINES: usize = 100;

#[derive(Debug, Clone)]
pub struct DashboardStats {
    /// Local calendar date the snapshot was taken on
    pub date: NaiveDate,
    pub today: u64,
    pub total: u64,
    /// Last [`DASHBOARD_DAYS`] days, oldest first, today last
    pub daily: Vec<DayCount>,
    pub mode: AttributionMode,
    /// Unexpired attribution tokens
    pub pending_tokens: usize,
    pub last_classification: Option<Classification>,
    pub diagnostics: Vec<DiagnosticEntry>,
}

impl DashboardStats {
    pub fn from_state(
        state: &CounterState,
        date: NaiveDate,
        pending_tokens: usize,
        last_classification: Option<Classification>,
        diagnostics: Vec<DiagnosticEntry>,
    ) -> Self {
        Self {
            date,
            today: state.count_on(date),
            total: state.total,
            daily: state.last_n_days(date, DASHBOARD_DAYS),
            mode: state.attribution_mode,
            pending_tokens,
            last_classification,
            diagnostics,
        }
    }

    pub fn date_key(&self) -> String {
        day_key(self.date)
    }

    /// Histogram scale; never below 1 so empty weeks render.
    pub fn max_daily(&self) -> u64 {
        self.daily.iter().map(|d| d.count).max().unwrap_or(0).max(1)
    }

    /// Bar width as a rounded percentage of [`Self::max_daily`].
    pub fn bar_percent(&self, count: u64) -> u16 {
        ((count as f64 / self.max_daily() as f64) * 100.0).round() as u16
    }

    /// Histogram hint, e.g. "max 12".
    pub fn format_max_hint(&self) -> String {
        format!("max {}", self.max_daily())
    }

    pub fn format_last_classification(&self) -> &'static str {
        self.last_classification
            .map(|c| c.as_str())
            .unwrap_or("none yet")
    }
}
