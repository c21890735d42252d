//! Host settings storage.
//!
//! The host owns a map of per-extension settings objects and a debounced save
//! call with no durability acknowledgment. [`SettingsHost`] is that contract;
//! [`JsonSettingsFile`] implements it on a JSON file and [`MemorySettings`]
//! keeps everything in memory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Key of this extension's object inside the host settings map.
pub const SETTINGS_NAMESPACE: &str = "copilot_counter";

/// Settings storage provided by the host.
pub trait SettingsHost: Send {
    /// Mutable view of the host's extension settings map.
    fn extension_settings(&mut self) -> &mut Map<String, Value>;

    /// Request an asynchronous, debounced save.
    fn save_settings_debounced(&mut self);

    /// Persist pending changes immediately.
    fn flush(&mut self) -> Result<()>;

    /// Give debounced saves a chance to complete.
    fn tick(&mut self) -> Result<()> {
        Ok(())
    }

    /// Re-read from backing storage, discarding nothing that is still pending.
    fn reload(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// In-memory settings, counting save requests.
#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: Map<String, Value>,
    saves: usize,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Map<String, Value>) -> Self {
        Self { settings, saves: 0 }
    }

    /// Number of `save_settings_debounced` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl SettingsHost for MemorySettings {
    fn extension_settings(&mut self) -> &mut Map<String, Value> {
        &mut self.settings
    }

    fn save_settings_debounced(&mut self) {
        self.saves += 1;
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Settings persisted as a JSON object on disk.
///
/// Saves are trailing-debounced: every request pushes the write deadline out by
/// the debounce interval, and [`SettingsHost::tick`] writes once it passes.
/// Dropping the store flushes.
#[derive(Debug)]
pub struct JsonSettingsFile {
    path: PathBuf,
    settings: Map<String, Value>,
    debounce: Duration,
    due_at: Option<Instant>,
}

impl JsonSettingsFile {
    /// Open the settings file, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>, debounce: Duration) -> Result<Self> {
        let path = path.into();
        let settings = read_settings(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            settings,
            debounce,
            due_at: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_pending(&self) -> bool {
        self.due_at.is_some()
    }

    fn write(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        self.due_at = None;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Some(Map::new()));
    }
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(Error::Settings(format!(
            "expected a JSON object in {}, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl SettingsHost for JsonSettingsFile {
    fn extension_settings(&mut self) -> &mut Map<String, Value> {
        &mut self.settings
    }

    fn save_settings_debounced(&mut self) {
        if self.debounce.is_zero() {
            if let Err(e) = self.write() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to save settings");
            }
            return;
        }
        self.due_at = Some(Instant::now() + self.debounce);
    }

    fn flush(&mut self) -> Result<()> {
        if self.due_at.is_some() {
            self.write()?;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        match self.due_at {
            Some(due) if Instant::now() >= due => self.write(),
            _ => Ok(()),
        }
    }

    fn reload(&mut self) -> Result<bool> {
        if self.due_at.is_some() {
            return Ok(false);
        }
        match read_settings(&self.path)? {
            Some(settings) if settings != self.settings => {
                self.settings = settings;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Drop for JsonSettingsFile {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush settings on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_memory_settings_counts_saves() {
        let mut settings = MemorySettings::new();
        settings
            .extension_settings()
            .insert("x".to_string(), json!(1));
        settings.save_settings_debounced();
        settings.save_settings_debounced();
        assert_eq!(settings.save_count(), 2);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = JsonSettingsFile::open(dir.path().join("settings.json"), Duration::ZERO).unwrap();
        assert!(store.extension_settings().is_empty());
    }

    #[test]
    fn test_zero_debounce_writes_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.json");
        let mut store = JsonSettingsFile::open(&path, Duration::ZERO).unwrap();
        assert_eq!(store.path(), path);
        store
            .extension_settings()
            .insert(SETTINGS_NAMESPACE.to_string(), json!({"total": 3}));
        store.save_settings_debounced();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[SETTINGS_NAMESPACE]["total"], 3);
    }

    #[test]
    fn test_debounced_save_waits_for_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = JsonSettingsFile::open(&path, Duration::from_secs(3600)).unwrap();
        store
            .extension_settings()
            .insert("k".to_string(), json!("v"));
        store.save_settings_debounced();
        store.tick().unwrap();
        assert!(!path.exists());
        assert!(store.has_pending());

        store.flush().unwrap();
        assert!(path.exists());
        assert!(!store.has_pending());
    }

    #[test]
    fn test_drop_flushes_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        {
            let mut store = JsonSettingsFile::open(&path, Duration::from_secs(3600)).unwrap();
            store
                .extension_settings()
                .insert("k".to_string(), json!("v"));
            store.save_settings_debounced();
        }
        let reopened = JsonSettingsFile::open(&path, Duration::ZERO).unwrap();
        assert_eq!(reopened.settings.get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_reload_picks_up_external_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let mut store = JsonSettingsFile::open(&path, Duration::ZERO).unwrap();
        assert!(!store.reload().unwrap());

        std::fs::write(&path, r#"{"copilot_counter": {"total": 9}}"#).unwrap();
        assert!(store.reload().unwrap());
        assert_eq!(store.extension_settings()[SETTINGS_NAMESPACE]["total"], 9);
    }

    #[test]
    fn test_non_object_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            JsonSettingsFile::open(&path, Duration::ZERO),
            Err(Error::Settings(_))
        ));
    }
}
