//! The counter engine: owns all mutable state and wires the components.
//!
//! Token pushes from observed requests and event-driven counting both go
//! through one mutex, so a classification can never interleave with a
//! consume-and-increment.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::config::{AttributionConfig, Config};
use crate::counter::{local_date, Counter, CounterState};
use crate::dashboard::{DashboardStats, DASHBOARD_LOG_LINES};
use crate::diagnostics::{DiagnosticEntry, DiagnosticLog};
use crate::error::{Error, Result};
use crate::handler::{EventOutcome, HandlerContext, MessageEventHandler};
use crate::host::EventBus;
use crate::observer::{Observation, ObservationSink, RequestObserver};
use crate::queue::TokenQueue;
use crate::settings::{JsonSettingsFile, SettingsHost};
use crate::types::{AttributionMode, AttributionToken, ChatMessage, Classification, LifecycleEvent};

struct EngineState {
    queue: TokenQueue,
    counter: Counter,
    diagnostics: DiagnosticLog,
    last_classification: Option<Classification>,
}

fn lock_state(state: &Mutex<EngineState>) -> Result<MutexGuard<'_, EngineState>> {
    state.lock().map_err(|_| Error::StatePoisoned)
}

/// Shared handle to the counter. Clones share state.
#[derive(Clone)]
pub struct CounterEngine {
    state: Arc<Mutex<EngineState>>,
    handler: Arc<MessageEventHandler>,
    attribution: Arc<AttributionConfig>,
}

impl CounterEngine {
    pub fn new(config: &Config, settings: Box<dyn SettingsHost>) -> Self {
        let state = EngineState {
            queue: TokenQueue::with_window_secs(config.attribution.window_secs),
            counter: Counter::new(settings),
            diagnostics: DiagnosticLog::new(config.diagnostics.capacity),
            last_classification: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            handler: Arc::new(MessageEventHandler::from_config(&config.fields)),
            attribution: Arc::new(config.attribution.clone()),
        }
    }

    /// Engine backed by the JSON settings file from `config.storage`.
    pub fn open(config: &Config) -> Result<Self> {
        let path = config.storage.resolved_settings_path();
        let settings = JsonSettingsFile::open(
            &path,
            Duration::from_millis(config.storage.debounce_ms),
        )?;
        tracing::info!(path = %settings.path().display(), "Opened settings");
        Ok(Self::new(config, Box::new(settings)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        lock_state(&self.state)
    }

    /// Request observer feeding this engine's token queue.
    pub fn observer(&self) -> RequestObserver {
        RequestObserver::new(
            &self.attribution,
            Arc::new(EngineSink {
                state: Arc::clone(&self.state),
            }),
        )
    }

    /// Register the message handler for every lifecycle event.
    pub fn subscribe(&self, bus: &mut EventBus) {
        for event in LifecycleEvent::ALL {
            let engine = self.clone();
            bus.on(event, move |host_event| {
                if let Err(e) =
                    engine.handle_event_at(host_event.kind, host_event.history, host_event.at)
                {
                    tracing::warn!(event = %host_event.kind, error = %e, "Event handling failed");
                }
            });
        }
    }

    pub fn handle_event(
        &self,
        event: LifecycleEvent,
        history: &[ChatMessage],
    ) -> Result<EventOutcome> {
        self.handle_event_at(event, history, Utc::now())
    }

    pub fn handle_event_at(
        &self,
        event: LifecycleEvent,
        history: &[ChatMessage],
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        self.handle_event_in(event, history, now, &Local)
    }

    /// Like [`handle_event_at`](Self::handle_event_at), with day keys taken in `tz`.
    pub fn handle_event_in<Tz: TimeZone>(
        &self,
        event: LifecycleEvent,
        history: &[ChatMessage],
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<EventOutcome> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        Ok(self.handler.handle(
            event,
            history,
            HandlerContext {
                queue: &mut state.queue,
                counter: &mut state.counter,
                diagnostics: &mut state.diagnostics,
                now,
                today: local_date(now, tz),
            },
        ))
    }

    /// Zero the counts, forget the last signature and drop pending tokens.
    pub fn reset(&self) -> Result<CounterState> {
        let mut state = self.lock()?;
        state.queue.clear();
        let counter_state = state.counter.reset();
        state.diagnostics.warn("counter reset");
        Ok(counter_state)
    }

    pub fn set_mode(&self, mode: AttributionMode) -> Result<CounterState> {
        let mut state = self.lock()?;
        let counter_state = state.counter.set_mode(mode);
        state
            .diagnostics
            .info(format!("attribution mode set to {}", mode));
        Ok(counter_state)
    }

    pub fn mode(&self) -> Result<AttributionMode> {
        Ok(self.lock()?.counter.state().attribution_mode)
    }

    pub fn state(&self) -> Result<CounterState> {
        Ok(self.lock()?.counter.state())
    }

    pub fn pending_tokens(&self) -> Result<usize> {
        Ok(self.lock()?.queue.pending_at(Utc::now()))
    }

    pub fn diagnostics(&self, n: usize) -> Result<Vec<DiagnosticEntry>> {
        Ok(self.lock()?.diagnostics.recent(n))
    }

    /// Add an operator note to the diagnostic log.
    pub fn note(&self, message: impl Into<String>) -> Result<()> {
        self.lock()?.diagnostics.info(message);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<DashboardStats> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let mut state = self.lock()?;
        let counter_state = state.counter.state();
        Ok(DashboardStats::from_state(
            &counter_state,
            local_date(now, &Local),
            state.queue.pending_at(now),
            state.last_classification,
            state.diagnostics.recent(DASHBOARD_LOG_LINES),
        ))
    }

    /// Persist pending settings now.
    pub fn flush(&self) -> Result<()> {
        self.lock()?.counter.flush()
    }

    /// Let debounced saves complete.
    pub fn tick(&self) -> Result<()> {
        self.lock()?.counter.tick()
    }

    /// Pick up settings written by another process.
    pub fn reload(&self) -> Result<bool> {
        let mut state = self.lock()?;
        let changed = state.counter.reload()?;
        if changed {
            state.diagnostics.debug("settings reloaded from disk");
        }
        Ok(changed)
    }
}

struct EngineSink {
    state: Arc<Mutex<EngineState>>,
}

impl ObservationSink for EngineSink {
    fn record(&self, observation: Observation) -> Result<()> {
        let mut state = lock_state(&self.state)?;
        state.last_classification = Some(observation.classification);
        state.diagnostics.debug(format!(
            "request {} classified {}",
            observation.url, observation.classification
        ));

        if observation.classification == Classification::Target {
            state.queue.prune(observation.observed_at);
            state.queue.push(AttributionToken::target(
                observation.url.clone(),
                observation.observed_at,
            ));
            let pending = state.queue.len();
            state.diagnostics.info(format!(
                "token queued from {} ({} pending)",
                observation.url, pending
            ));
        }
        Ok(())
    }
}
