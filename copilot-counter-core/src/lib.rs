//! # copilot-counter-core
//!
//! Counts assistant replies produced through a locally proxied Copilot backend
//! (the loopback endpoint on port 4141) inside a plugin-extensible chat host.
//!
//! This library provides:
//! - Backend fingerprinting of outbound requests
//! - A request observer that decorates the host's dispatchers
//! - A time-bounded attribution token queue
//! - Lifecycle event handling with signature deduplication
//! - A per-day / total counter persisted through host settings
//! - Configuration and logging infrastructure
//!
//! ## Flow
//!
//! request dispatched -> observer classifies it -> target match queues a token
//! -> host emits a lifecycle event -> handler consumes a token -> valid, new
//! reply increments the counter -> dashboard re-renders.
//!
//! ## Example
//!
//! ```rust,no_run
//! use copilot_counter_core::{Config, CounterEngine, HostSession};
//!
//! let config = Config::load().expect("failed to load config");
//! let engine = CounterEngine::open(&config).expect("failed to open settings");
//!
//! let mut session = HostSession::new(engine.clone());
//! let transcript = std::io::BufReader::new(std::fs::File::open("host.jsonl").unwrap());
//! let summary = session.replay(transcript).expect("replay failed");
//! println!("counted {} replies", summary.counted);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use counter::{CounterState, DayCount};
pub use dashboard::DashboardStats;
pub use engine::CounterEngine;
pub use error::{Error, Result};
pub use handler::{EventOutcome, SkipReason};
pub use host::{EventBus, HostSession, ReplaySummary};
pub use observer::{OutboundRequest, RequestBody, RequestObserver};
pub use types::*;

// Public modules
pub mod classifier;
pub mod config;
pub mod counter;
pub mod dashboard;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod handler;
pub mod host;
pub mod logging;
pub mod observer;
pub mod queue;
pub mod settings;
pub mod signature;
pub mod transport;
pub mod types;
