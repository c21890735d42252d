//! copilot-counter - Copilot reply counter dashboard
//!
//! Terminal dashboard showing today / total replies, the last seven days and
//! the live attribution log. With `--replay`, a recorded host transcript is
//! fed through the engine while the dashboard is open.

mod app;
mod process_lock;
mod ui;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use copilot_counter_core::{Config, CounterEngine, HostSession, ReplaySummary};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::app::App;
use crate::process_lock::acquire_writer_lock;

#[derive(Parser)]
#[command(name = "copilot-counter")]
#[command(about = "Dashboard for Copilot replies counted through the local proxy")]
#[command(version)]
struct Args {
    /// Host transcript (JSON Lines) to feed through the engine
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed records in milliseconds
    #[arg(long, default_value = "250")]
    pace: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, not stdout since we have a TUI)
    let _log_guard = copilot_counter_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("copilot-counter dashboard starting up");

    let settings_path = config.storage.resolved_settings_path();
    let _writer_guard = acquire_writer_lock(&settings_path, "failed to start copilot-counter")?;

    let engine = CounterEngine::open(&config).context("failed to open counter settings")?;
    engine.note("dashboard opened")?;

    let stop = Arc::new(AtomicBool::new(false));
    let replay = match &args.replay {
        Some(path) => Some(spawn_replay(
            engine.clone(),
            path.clone(),
            Duration::from_millis(args.pace),
            Arc::clone(&stop),
        )?),
        None => None,
    };

    let mut app = App::new(engine.clone());
    if let Some(path) = &args.replay {
        app.set_status(format!("replaying {}", path.display()));
    }
    app.refresh().context("failed to read counter state")?;

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app, &engine);

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = replay {
        let _ = handle.join();
    }

    engine.flush().context("failed to save counter settings")?;
    tracing::info!("copilot-counter dashboard shutting down");

    result
}

/// Run the main application loop.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    engine: &CounterEngine,
) -> Result<()> {
    // Every 10 ticks (~1 second) settle debounced saves and pick up external edits
    let mut poll_counter = 0u32;

    loop {
        poll_counter += 1;
        if poll_counter >= 10 {
            poll_counter = 0;
            if let Err(e) = engine.tick() {
                tracing::warn!(error = %e, "Debounced save failed");
            }
            if let Err(e) = engine.reload() {
                tracing::warn!(error = %e, "Settings reload failed");
            }
        }

        if let Err(e) = app.refresh() {
            tracing::warn!(error = %e, "Failed to refresh dashboard");
        }

        terminal.draw(|frame| ui::render(frame, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Feed a transcript through a fresh host session, one record per `pace`.
fn spawn_replay(
    engine: CounterEngine,
    path: PathBuf,
    pace: Duration,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    let file =
        File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;

    let handle = thread::Builder::new()
        .name("replay".to_string())
        .spawn(move || {
            let mut session = HostSession::new(engine);
            let mut summary = ReplaySummary::default();

            for (index, line) in BufReader::new(file).lines().enumerate() {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match line {
                    Ok(line) => session.apply_line(index + 1, &line, &mut summary),
                    Err(e) => {
                        tracing::warn!(error = %e, "Replay read failed");
                        break;
                    }
                }
                thread::sleep(pace);
            }

            tracing::info!(
                records = summary.records,
                malformed = summary.malformed,
                "Replay finished"
            );
            let _ = session.engine().note(format!(
                "replay finished: {} records, {} malformed",
                summary.records, summary.malformed
            ));
        })
        .context("failed to spawn replay thread")?;

    Ok(handle)
}
