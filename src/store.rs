//! Persistent settings store.
//!
//! The settings live as one record under the `"settings"` key of a small
//! JSON key-value file. Every save overwrites the whole record and publishes
//! the new value to subscribers through a `watch` channel, so a running
//! scheduler picks up mode changes without waiting for its next tick.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::sync::watch;

use crate::config::Settings;
use crate::error::{TabnapError, TabnapResult};

/// Storage key holding the settings record.
pub const SETTINGS_KEY: &str = "settings";

/// Settings store backed by a JSON file or kept purely in memory.
pub struct SettingsStore {
    /// Path to the storage file (`None` for in-memory stores).
    path: Option<PathBuf>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    /// Open the store at `path`, loading whatever record is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = read_settings(&path);
        let (tx, _) = watch::channel(settings);
        Self {
            path: Some(path),
            tx,
        }
    }

    /// Open the store at the default location.
    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// A store that never touches disk.
    pub fn in_memory(settings: Settings) -> Self {
        let (tx, _) = watch::channel(settings.validated());
        Self { path: None, tx }
    }

    /// Default storage file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .map(|h| h.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
            })
            .join("tabnap")
            .join("storage.json")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The last loaded or saved value.
    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Read the persisted record merged over defaults.
    ///
    /// Never fails: unreadable or malformed records are logged and replaced
    /// by the defaults.
    pub fn load(&self) -> Settings {
        match self.path {
            Some(ref path) => read_settings(path),
            None => self.current(),
        }
    }

    /// Overwrite the whole record and notify subscribers.
    pub fn save(&self, settings: Settings) -> TabnapResult<()> {
        let settings = settings.validated();

        if let Some(ref path) = self.path {
            write_settings(path, &settings)?;
        }

        self.tx.send_replace(settings);
        Ok(())
    }

    /// Write the defaults if nothing has been persisted yet.
    ///
    /// Returns `true` when a record was written.
    pub fn ensure_initialized(&self) -> TabnapResult<bool> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };

        if read_entries(path)?.contains_key(SETTINGS_KEY) {
            return Ok(false);
        }

        tracing::info!("Initializing settings at {}", path.display());
        write_settings(path, &Settings::default())?;
        self.tx.send_replace(Settings::default());
        Ok(true)
    }

    /// Receive every new merged value after each save.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Re-read the backing file and publish if it differs from the last
    /// known value. Lets another process's writes reach our subscribers.
    pub fn refresh(&self) -> bool {
        let Some(ref path) = self.path else {
            return false;
        };

        let latest = read_settings(path);
        self.tx.send_if_modified(|current| {
            if *current == latest {
                false
            } else {
                *current = latest;
                true
            }
        })
    }
}

fn read_entries(path: &Path) -> TabnapResult<BTreeMap<String, Value>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    serde_json::from_str(&contents).map_err(|e| {
        TabnapError::Storage(format!("Failed to parse {}: {}", path.display(), e))
    })
}

fn read_settings(path: &Path) -> Settings {
    let entries = match read_entries(path) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read settings: {}", e);
            return Settings::default();
        }
    };

    match entries.get(SETTINGS_KEY) {
        Some(record) => merge_record(record),
        None => Settings::default(),
    }
}

/// Merge a stored record over the defaults one field at a time. A field
/// with the wrong type is logged and dropped; the others still apply.
fn merge_record(record: &Value) -> Settings {
    let Value::Object(fields) = record else {
        tracing::warn!("Settings record is not an object, using defaults");
        return Settings::default();
    };

    let mut merged = match serde_json::to_value(Settings::default()) {
        Ok(Value::Object(defaults)) => defaults,
        _ => return Settings::default(),
    };

    for (key, value) in fields {
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        match serde_json::from_value::<Settings>(Value::Object(candidate.clone())) {
            Ok(_) => merged = candidate,
            Err(e) => tracing::warn!("Ignoring settings field '{}': {}", key, e),
        }
    }

    serde_json::from_value::<Settings>(Value::Object(merged))
        .map(Settings::validated)
        .unwrap_or_default()
}

fn write_settings(path: &Path, settings: &Settings) -> TabnapResult<()> {
    // Keep any other keys that share the storage file.
    let mut entries = read_entries(path).unwrap_or_default();
    entries.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);

    let contents = serde_json::to_string_pretty(&entries)?;
    replace_file(path, contents.as_bytes())
        .map_err(|e| TabnapError::Storage(format!("Failed to write settings: {}", e)))
}

/// Write `contents` to a staging file next to `path`, then rename it into
/// place. Readers see either the old file or the new one, never a prefix.
pub(crate) fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut staging = NamedTempFile::new_in(dir)?;
    staging.write_all(contents)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|e| e.error)?;
    Ok(())
}
