//! Application state for the dashboard.

use anyhow::Result;
use copilot_counter_core::{CounterEngine, DashboardStats};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

/// Current view mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// Counter cards, histogram and live log
    #[default]
    Dashboard,
    /// Reset requested, waiting for y/n
    ConfirmReset,
}

/// Dashboard application state.
pub struct App {
    engine: CounterEngine,
    /// Current view mode
    pub view_mode: ViewMode,
    /// Latest engine snapshot
    pub stats: Option<DashboardStats>,
    /// Flag to quit the application
    pub should_quit: bool,
    /// One-line status shown in the footer
    pub status: Option<String>,
}

impl App {
    pub fn new(engine: CounterEngine) -> Self {
        Self {
            engine,
            view_mode: ViewMode::default(),
            stats: None,
            should_quit: false,
            status: None,
        }
    }

    /// Re-read counts, tokens and diagnostics from the engine.
    pub fn refresh(&mut self) -> Result<()> {
        self.stats = Some(self.engine.snapshot()?);
        Ok(())
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn is_confirming_reset(&self) -> bool {
        self.view_mode == ViewMode::ConfirmReset
    }

    /// Handle keyboard input.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        let result = match self.view_mode {
            ViewMode::Dashboard => self.handle_dashboard_key(key),
            ViewMode::ConfirmReset => self.handle_confirm_key(key),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Dashboard action failed");
            self.set_status(format!("error: {e}"));
        }

        if let Err(e) = self.refresh() {
            tracing::warn!(error = %e, "Failed to refresh dashboard");
        }
    }

    fn handle_dashboard_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Char('r') => {
                self.view_mode = ViewMode::ConfirmReset;
            }
            KeyCode::Char('m') => {
                let next = self.engine.mode()?.cycle();
                self.engine.set_mode(next)?;
                self.set_status(format!("attribution mode: {}", next.display_name()));
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) -> Result<()> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.view_mode = ViewMode::Dashboard;
                self.engine.reset()?;
                self.set_status("counter reset");
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.view_mode = ViewMode::Dashboard;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilot_counter_core::settings::MemorySettings;
    use copilot_counter_core::{AttributionMode, Config, LifecycleEvent};
    use crossterm::event::KeyModifiers;
    use serde_json::json;

    fn press(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn app_with_one_count() -> (App, CounterEngine) {
        let engine = CounterEngine::new(&Config::default(), Box::new(MemorySettings::new()));
        engine.set_mode(AttributionMode::ForceOn).unwrap();
        let history = vec![copilot_counter_core::ChatMessage::new(
            json!({"is_user": false, "mes": "hello", "send_date": 1}),
        )];
        engine
            .handle_event(LifecycleEvent::MessageReceived, &history)
            .unwrap();
        let mut app = App::new(engine.clone());
        app.refresh().unwrap();
        (app, engine)
    }

    #[test]
    fn test_reset_requires_confirmation() {
        let (mut app, engine) = app_with_one_count();

        app.handle_key(press('r'));
        assert!(app.is_confirming_reset());
        app.handle_key(press('n'));
        assert_eq!(app.view_mode, ViewMode::Dashboard);
        assert_eq!(engine.state().unwrap().total, 1);

        app.handle_key(press('r'));
        app.handle_key(press('y'));
        assert_eq!(engine.state().unwrap().total, 0);
        assert_eq!(app.stats.as_ref().unwrap().total, 0);
        assert_eq!(app.status.as_deref(), Some("counter reset"));
    }

    #[test]
    fn test_m_cycles_mode() {
        let (mut app, engine) = app_with_one_count();
        app.handle_key(press('m'));
        assert_eq!(engine.mode().unwrap(), AttributionMode::ForceOff);
        app.handle_key(press('m'));
        assert_eq!(engine.mode().unwrap(), AttributionMode::Auto);
    }

    #[test]
    fn test_quit_keys() {
        let (mut app, _) = app_with_one_count();
        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(app.should_quit);

        let (mut app, _) = app_with_one_count();
        app.handle_key(press('r'));
        // Esc only cancels the confirmation
        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert!(!app.should_quit);
        app.handle_key(press('q'));
        assert!(app.should_quit);
    }
}
