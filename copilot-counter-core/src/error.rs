//! Error types for copilot-counter-core

use thiserror::Error;

/// Main error type for the copilot-counter-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Settings storage error
    #[error("settings error: {0}")]
    Settings(String),

    /// Shared engine state was poisoned by a panicking holder
    #[error("counter state is poisoned")]
    StatePoisoned,

    /// HTTP error from the backend probe
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed host transcript record
    #[error("replay error at line {line}: {message}")]
    Replay { line: usize, message: String },
}

/// Result type alias for copilot-counter-core
pub type Result<T> = std::result::Result<T, Error>;
