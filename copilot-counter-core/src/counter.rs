//! Persistent reply counter.
//!
//! [`CounterState`] lives in the host settings map under
//! [`SETTINGS_NAMESPACE`] as `{total, byDay, lastSignature, attributionMode}`.
//! Reads are lenient: missing or mistyped fields fall back to defaults, and
//! a stored `total` that disagrees with `byDay` is replaced by the sum.
//! Counts saturate at `u64::MAX`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::settings::{SettingsHost, SETTINGS_NAMESPACE};
use crate::types::AttributionMode;

/// Day key format (local calendar date).
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// `YYYY-MM-DD` key for a calendar date.
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Today in the user's local timezone.
pub fn today_local() -> NaiveDate {
    local_date(Utc::now(), &Local)
}

/// Calendar date of `now` as seen in `tz`.
pub fn local_date<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

fn saturating_sum<'a>(counts: impl IntoIterator<Item = &'a u64>) -> u64 {
    counts.into_iter().fold(0, |sum, count| sum.saturating_add(*count))
}

/// Count for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: u64,
}

impl DayCount {
    /// Short `MM-DD` label for chart axes.
    pub fn label(&self) -> String {
        self.date.format("%m-%d").to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub total: u64,
    pub by_day: BTreeMap<String, u64>,
    pub last_signature: String,
    pub attribution_mode: AttributionMode,
}

impl CounterState {
    /// Read from a settings value, defaulting anything missing or malformed.
    pub fn from_value(value: &Value) -> Self {
        let by_day: BTreeMap<String, u64> = value
            .get("byDay")
            .and_then(Value::as_object)
            .map(|days| {
                days.iter()
                    .filter_map(|(day, count)| Some((day.clone(), count.as_u64()?)))
                    .collect()
            })
            .unwrap_or_default();

        let stored_total = value.get("total").and_then(Value::as_u64);
        let total = saturating_sum(by_day.values());
        if stored_total.is_some_and(|stored| stored != total) {
            tracing::warn!(
                stored = ?stored_total,
                by_day = total,
                "Stored total disagrees with byDay; using the sum"
            );
        }

        let last_signature = value
            .get("lastSignature")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let attribution_mode = value
            .get("attributionMode")
            .and_then(Value::as_str)
            .and_then(|mode| mode.parse().ok())
            .unwrap_or_default();

        Self {
            total,
            by_day,
            last_signature,
            attribution_mode,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "total": self.total,
            "byDay": self.by_day,
            "lastSignature": self.last_signature,
            "attributionMode": self.attribution_mode.as_str(),
        })
    }

    pub fn increment_on(&mut self, date: NaiveDate) {
        self.total = self.total.saturating_add(1);
        let day = self.by_day.entry(day_key(date)).or_insert(0);
        *day = day.saturating_add(1);
    }

    /// Zero the counts and forget the last signature. The mode is kept.
    pub fn reset(&mut self) {
        self.total = 0;
        self.by_day.clear();
        self.last_signature.clear();
    }

    pub fn count_on(&self, date: NaiveDate) -> u64 {
        self.by_day.get(&day_key(date)).copied().unwrap_or(0)
    }

    pub fn by_day_sum(&self) -> u64 {
        saturating_sum(self.by_day.values())
    }

    /// The `n` days ending at `end`, oldest first, zero-filled.
    pub fn last_n_days(&self, end: NaiveDate, n: usize) -> Vec<DayCount> {
        (0..n)
            .rev()
            .map(|offset| {
                let date = end - Duration::days(offset as i64);
                DayCount {
                    date,
                    count: self.count_on(date),
                }
            })
            .collect()
    }
}

/// Mutates [`CounterState`] through the host settings and requests saves.
pub struct Counter {
    settings: Box<dyn SettingsHost>,
}

impl Counter {
    pub fn new(settings: Box<dyn SettingsHost>) -> Self {
        Self { settings }
    }

    /// Current state, creating the namespaced object on first access.
    pub fn state(&mut self) -> CounterState {
        let settings = self.settings.extension_settings();
        match settings.get(SETTINGS_NAMESPACE) {
            Some(value) => CounterState::from_value(value),
            None => {
                let state = CounterState::default();
                settings.insert(SETTINGS_NAMESPACE.to_string(), state.to_value());
                state
            }
        }
    }

    fn store(&mut self, state: &CounterState) {
        self.settings
            .extension_settings()
            .insert(SETTINGS_NAMESPACE.to_string(), state.to_value());
        self.settings.save_settings_debounced();
    }

    pub fn increment(&mut self) -> CounterState {
        self.increment_on(today_local())
    }

    pub fn increment_on(&mut self, date: NaiveDate) -> CounterState {
        let mut state = self.state();
        state.increment_on(date);
        self.store(&state);
        state
    }

    /// Remember `signature` and count it, in a single save.
    pub fn record(&mut self, signature: String, date: NaiveDate) -> CounterState {
        let mut state = self.state();
        state.last_signature = signature;
        state.increment_on(date);
        self.store(&state);
        state
    }

    pub fn reset(&mut self) -> CounterState {
        let mut state = self.state();
        state.reset();
        self.store(&state);
        state
    }

    pub fn set_mode(&mut self, mode: AttributionMode) -> CounterState {
        let mut state = self.state();
        state.attribution_mode = mode;
        self.store(&state);
        state
    }

    pub fn flush(&mut self) -> Result<()> {
        self.settings.flush()
    }

    pub fn tick(&mut self) -> Result<()> {
        self.settings.tick()
    }

    pub fn reload(&mut self) -> Result<bool> {
        self.settings.reload()
    }
}
