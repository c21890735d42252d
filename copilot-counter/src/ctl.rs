//! copilot-counter-ctl - control CLI for the Copilot reply counter
//!
//! Non-interactive access to the persisted counter:
//! - `stats` prints today / total and the last seven days
//! - `reset` and `mode` change the counter the same way the dashboard does
//! - `replay` feeds a recorded host transcript through the engine
//! - `probe` checks whether the local Copilot proxy is up
//!
//! Uses XDG Base Directory specification for file locations:
//! - Settings: $XDG_DATA_HOME/copilot-counter/settings.json
//! - Logs: $XDG_STATE_HOME/copilot-counter/copilot-counter.log
//! - Config: $XDG_CONFIG_HOME/copilot-counter/config.toml

mod process_lock;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copilot_counter_core::transport::SyncBackendProbe;
use copilot_counter_core::{
    AttributionMode, Config, CounterEngine, DashboardStats, HostSession, ReplaySummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use process_lock::acquire_writer_lock;

#[derive(Parser)]
#[command(name = "copilot-counter-ctl")]
#[command(about = "Inspect and control the Copilot reply counter")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show today / total and the last seven days
    Stats {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Zero the counter and forget the last reply
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Set the attribution mode (auto, force-on, force-off)
    Mode { mode: AttributionMode },
    /// Feed a host transcript (JSON Lines) through the engine
    Replay {
        file: PathBuf,

        /// Keep reading as the transcript grows
        #[arg(short, long)]
        follow: bool,

        /// Poll interval in milliseconds (only with --follow)
        #[arg(long, default_value = "500")]
        poll: u64,
    },
    /// Check whether the target backend answers
    Probe {
        /// Request timeout in milliseconds
        #[arg(long, default_value = "2000")]
        timeout: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = copilot_counter_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    tracing::info!("copilot-counter-ctl starting");

    match args.command {
        Command::Stats { json } => run_stats(&config, json),
        Command::Reset { yes } => run_reset(&config, yes),
        Command::Mode { mode } => run_mode(&config, mode),
        Command::Replay { file, follow, poll } => {
            run_replay(&config, &file, follow, Duration::from_millis(poll))
        }
        Command::Probe { timeout } => run_probe(&config, Duration::from_millis(timeout)),
    }
}

/// Open the engine for a command that writes settings.
fn open_writer(config: &Config, command: &str) -> Result<(process_lock::WriterGuard, CounterEngine)> {
    let settings_path = config.storage.resolved_settings_path();
    let guard = acquire_writer_lock(
        &settings_path,
        &format!("refusing to run `{command}`"),
    )?;
    let engine = CounterEngine::open(config).context("failed to open counter settings")?;
    Ok((guard, engine))
}

fn run_stats(config: &Config, json: bool) -> Result<()> {
    let engine = CounterEngine::open(config).context("failed to open counter settings")?;
    let stats = engine.snapshot().context("failed to read counter state")?;

    if json {
        let daily: Vec<_> = stats
            .daily
            .iter()
            .map(|d| serde_json::json!({ "date": d.date.to_string(), "count": d.count }))
            .collect();
        let value = serde_json::json!({
            "date": stats.date_key(),
            "today": stats.today,
            "total": stats.total,
            "mode": stats.mode.as_str(),
            "daily": daily,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "Settings: {}",
        shorten_path(&config.storage.resolved_settings_path())
    );
    println!(
        "Log:      {}",
        shorten_path(&copilot_counter_core::logging::log_file_path())
    );
    print_stats(&stats);
    Ok(())
}

fn print_stats(stats: &DashboardStats) {
    println!("  Mode:  {}", stats.mode.display_name());
    println!("  Today: {} ({})", stats.today, stats.date_key());
    println!("  Total: {}", stats.total);
    println!("\nLast 7 days ({}):", stats.format_max_hint());
    for day in &stats.daily {
        let width = stats.bar_percent(day.count) as usize * 30 / 100;
        println!("  {}  {:<30} {}", day.label(), "#".repeat(width), day.count);
    }
}

fn run_reset(config: &Config, yes: bool) -> Result<()> {
    let (_guard, engine) = open_writer(config, "reset")?;

    if !yes && !confirm("Reset today and total to zero?")? {
        println!("Reset cancelled.");
        return Ok(());
    }

    engine.reset().context("failed to reset counter")?;
    engine.flush().context("failed to save counter settings")?;
    tracing::info!("Counter reset from CLI");
    println!("Counter reset.");
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn run_mode(config: &Config, mode: AttributionMode) -> Result<()> {
    let (_guard, engine) = open_writer(config, "mode")?;
    engine.set_mode(mode).context("failed to set attribution mode")?;
    engine.flush().context("failed to save counter settings")?;
    println!("Attribution mode: {}", mode.display_name());
    Ok(())
}

fn run_replay(config: &Config, file: &Path, follow: bool, poll: Duration) -> Result<()> {
    let (_guard, engine) = open_writer(config, "replay")?;
    let mut session = HostSession::new(engine.clone());

    let result = if follow {
        run_follow(&mut session, file, poll)
    } else {
        run_single_replay(&mut session, file)
    };

    engine.flush().context("failed to save counter settings")?;
    result
}

/// Replay a whole transcript with a progress bar.
fn run_single_replay(session: &mut HostSession, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let before = session.engine().state()?.total;

    let lines: Vec<&str> = content.lines().collect();
    let pb = ProgressBar::new(lines.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );
    pb.set_message(
        file.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("...")
            .to_string(),
    );

    let mut summary = ReplaySummary::default();
    for (index, line) in lines.iter().enumerate() {
        session.apply_line(index + 1, line, &mut summary);
        pb.inc(1);
    }
    pb.finish_and_clear();

    summary.counted = session.engine().state()?.total.saturating_sub(before);
    print_replay_result(&summary);

    tracing::info!(
        records = summary.records,
        counted = summary.counted,
        malformed = summary.malformed,
        "Replay complete"
    );
    Ok(())
}

/// Tail a transcript until Ctrl+C.
fn run_follow(session: &mut HostSession, file: &Path, poll: Duration) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let handle = File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let mut reader = BufReader::new(handle);

    println!(
        "Following {} (poll every {}ms). Press Ctrl+C to stop.",
        file.display(),
        poll.as_millis()
    );

    let mut summary = ReplaySummary::default();
    let mut line_number = 0usize;
    let mut pending = String::new();

    while running.load(Ordering::SeqCst) {
        let read = reader
            .read_line(&mut pending)
            .with_context(|| format!("failed to read {}", file.display()))?;

        // Partial last line: wait for the writer to finish it
        if read == 0 || !pending.ends_with('\n') {
            session.engine().tick()?;
            thread::sleep(poll);
            continue;
        }

        line_number += 1;
        let before = session.engine().state()?.total;
        session.apply_line(line_number, &pending, &mut summary);
        pending.clear();

        let after = session.engine().state()?.total;
        if after > before {
            summary.counted += after - before;
            let timestamp = chrono::Local::now().format("%H:%M:%S");
            println!("[{}] Counted reply (total {})", timestamp, after);
        }
    }

    print_replay_result(&summary);
    println!("Follow mode stopped.");
    tracing::info!("copilot-counter-ctl follow mode stopped");
    Ok(())
}

fn print_replay_result(summary: &ReplaySummary) {
    println!("\nReplay complete:");
    println!("  Records:         {}", summary.records);
    println!(
        "  Requests:        {} ({} to target)",
        summary.requests, summary.target_requests
    );
    println!("  Messages:        {}", summary.messages);
    println!("  Events:          {}", summary.events);
    println!("  Replies counted: {}", summary.counted);
    if summary.malformed > 0 {
        println!("  Malformed lines: {}", summary.malformed);
    }
}

fn run_probe(config: &Config, timeout: Duration) -> Result<()> {
    let probe =
        SyncBackendProbe::new(&config.attribution, timeout).context("failed to create probe")?;
    tracing::info!(endpoint = %probe.endpoint(), "Probing backend");
    let status = probe.check();

    println!("Endpoint: {}", status.endpoint);
    match (status.http_status, &status.error) {
        (Some(code), _) => println!("  HTTP status: {}", code),
        (None, Some(error)) => println!("  Error: {}", error),
        (None, None) => {}
    }
    if let Some(models) = status.model_count {
        println!("  Models: {}", models);
    }

    if !status.is_healthy() {
        anyhow::bail!("backend is not healthy at {}", status.endpoint);
    }
    println!("Backend is up.");
    Ok(())
}

/// Shorten a path for display by abbreviating the home directory
fn shorten_path(path: &Path) -> String {
    if let Ok(home) = std::env::var("HOME") {
        if let Ok(suffix) = path.strip_prefix(&home) {
            return format!("~/{}", suffix.display());
        }
    }
    path.display().to_string()
}
