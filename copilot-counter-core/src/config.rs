//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/copilot-counter/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/copilot-counter/` (~/.config/copilot-counter/)
//! - Data: `$XDG_DATA_HOME/copilot-counter/` (~/.local/share/copilot-counter/)
//! - State/Logs: `$XDG_STATE_HOME/copilot-counter/` (~/.local/state/copilot-counter/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "copilot-counter";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Backend fingerprints and token window
    #[serde(default)]
    pub attribution: AttributionConfig,

    /// Candidate field lists for reading host chat messages
    #[serde(default)]
    pub fields: FieldsConfig,

    /// Settings file location and save debounce
    #[serde(default)]
    pub storage: StorageConfig,

    /// Live diagnostic log
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend attribution configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AttributionConfig {
    /// Seconds an attribution token stays consumable
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Loopback port the target backend listens on
    #[serde(default = "default_target_port")]
    pub target_port: u16,

    /// Loopback host literals combined with `target_port` into fingerprints
    #[serde(default = "default_target_hosts")]
    pub target_hosts: Vec<String>,

    /// Canonical API domains of excluded backends (strong evidence)
    #[serde(default = "default_excluded_domains")]
    pub excluded_domains: Vec<String>,

    /// Brand/product names of excluded backends (weak evidence)
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,

    /// Keywords that mark a request as a generation request
    #[serde(default = "default_generation_keywords")]
    pub generation_keywords: Vec<String>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            target_port: default_target_port(),
            target_hosts: default_target_hosts(),
            excluded_domains: default_excluded_domains(),
            excluded_keywords: default_excluded_keywords(),
            generation_keywords: default_generation_keywords(),
        }
    }
}

impl AttributionConfig {
    /// Base URL of the target backend on the IPv4 loopback interface.
    pub fn target_base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.target_port)
    }
}

fn default_window_secs() -> u64 {
    120
}

fn default_target_port() -> u16 {
    4141
}

fn default_target_hosts() -> Vec<String> {
    to_strings(&["localhost", "127.0.0.1", "0.0.0.0", "[::1]"])
}

fn default_excluded_domains() -> Vec<String> {
    to_strings(&[
        "generativelanguage.googleapis.com",
        "aiplatform.googleapis.com",
    ])
}

fn default_excluded_keywords() -> Vec<String> {
    to_strings(&["gemini", "makersuite", "google ai studio"])
}

fn default_generation_keywords() -> Vec<String> {
    to_strings(&[
        "chat/completions",
        "/completions",
        "/generate",
        "generatecontent",
        "streamgeneratecontent",
        "\"messages\"",
        "\"prompt\"",
    ])
}

/// Ordered candidate field paths (dotted) for host chat messages
#[derive(Debug, Deserialize, Clone)]
pub struct FieldsConfig {
    #[serde(default = "default_text_fields")]
    pub text: Vec<String>,

    #[serde(default = "default_id_fields")]
    pub id: Vec<String>,

    #[serde(default = "default_role_fields")]
    pub role: Vec<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            text: default_text_fields(),
            id: default_id_fields(),
            role: default_role_fields(),
        }
    }
}

fn default_text_fields() -> Vec<String> {
    to_strings(&[
        "mes",
        "message",
        "content",
        "text",
        "data.mes",
        "data.content",
        "data.message",
    ])
}

fn default_id_fields() -> Vec<String> {
    to_strings(&["send_date", "id", "data.send_date", "data.id"])
}

fn default_role_fields() -> Vec<String> {
    to_strings(&["role", "sender"])
}

/// Settings persistence configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Override for the settings file location
    pub settings_path: Option<PathBuf>,

    /// Debounce interval for settings saves in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            settings_path: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl StorageConfig {
    /// Settings file path, honoring the override.
    pub fn resolved_settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(Config::settings_path)
    }
}

fn default_debounce_ms() -> u64 {
    1000
}

/// Diagnostic log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DiagnosticsConfig {
    /// Entries kept in memory for the dashboard
    #[serde(default = "default_diagnostics_capacity")]
    pub capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: default_diagnostics_capacity(),
        }
    }
}

fn default_diagnostics_capacity() -> usize {
    200
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.attribution.window_secs == 0 {
            return Err(Error::Config(
                "attribution.window_secs must be greater than 0".to_string(),
            ));
        }
        if self.attribution.target_port == 0 {
            return Err(Error::Config(
                "attribution.target_port must be a valid port".to_string(),
            ));
        }
        if self.attribution.target_hosts.is_empty() {
            return Err(Error::Config(
                "attribution.target_hosts must not be empty".to_string(),
            ));
        }
        if self.fields.text.is_empty() {
            return Err(Error::Config("fields.text must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/copilot-counter/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for the settings file)
    ///
    /// `$XDG_DATA_HOME/copilot-counter/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/copilot-counter/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the default settings file path
    ///
    /// `$XDG_DATA_HOME/copilot-counter/settings.json`
    pub fn settings_path() -> PathBuf {
        Self::data_dir().join("settings.json")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/copilot-counter/copilot-counter.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("copilot-counter.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.attribution.window_secs, 120);
        assert_eq!(config.attribution.target_port, 4141);
        assert_eq!(config.fields.text[0], "mes");
        assert_eq!(config.storage.debounce_ms, 1000);
        assert_eq!(config.diagnostics.capacity, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[attribution]
window_secs = 30
target_port = 8080
excluded_keywords = ["claude"]

[fields]
text = ["body"]

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.attribution.window_secs, 30);
        assert_eq!(config.attribution.target_port, 8080);
        assert_eq!(config.attribution.excluded_keywords, vec!["claude"]);
        // Untouched lists keep their defaults
        assert!(config
            .attribution
            .target_hosts
            .contains(&"localhost".to_string()));
        assert_eq!(config.fields.text, vec!["body"]);
        assert_eq!(config.fields.id[0], "send_date");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_target_base_url() {
        let config = AttributionConfig::default();
        assert_eq!(config.target_base_url(), "http://127.0.0.1:4141");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.attribution.window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.attribution.target_hosts.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fields.text.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\ndebounce_ms = 0\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage.debounce_ms, 0);
        assert!(config.storage.settings_path.is_none());
    }

    #[test]
    fn test_settings_path_override() {
        let storage = StorageConfig {
            settings_path: Some(PathBuf::from("/tmp/custom.json")),
            ..Default::default()
        };
        assert_eq!(
            storage.resolved_settings_path(),
            PathBuf::from("/tmp/custom.json")
        );
    }
}
