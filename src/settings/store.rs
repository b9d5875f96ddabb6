//! In-process settings tables with optional JSON persistence.
//!
//! File layout:
//!
//! ```json
//! { "global": { "window_animation_scale": "1.0" },
//!   "system": { "user_rotation": "0" },
//!   "secure": { "location_mode": "3" } }
//! ```
//!
//! Every successful write rewrites the file (temp file + rename), so a
//! second process reading it sees either the old or the new tables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Namespace, SettingsAccessor};
use crate::error::{ButlerError, Result};

/// All tables, keyed by namespace then setting key.
pub type SettingsTables = BTreeMap<Namespace, BTreeMap<String, String>>;

/// Settings kept in memory and mirrored to disk when opened from a file.
#[derive(Debug)]
pub struct SettingsStore {
    tables: Mutex<SettingsTables>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Empty store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(SettingsTables::new()),
            path: None,
        }
    }

    /// Store seeded with `tables`, in memory only.
    pub fn with_tables(tables: SettingsTables) -> Self {
        Self {
            tables: Mutex::new(tables),
            path: None,
        }
    }

    /// Store backed by `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tables = if path.exists() {
            Self::load_file(&path)?
        } else {
            SettingsTables::new()
        };
        log::debug!("[settings] opened {} ({} tables)", path.display(), tables.len());
        Ok(Self {
            tables: Mutex::new(tables),
            path: Some(path),
        })
    }

    /// Parse a settings file.
    pub fn load_file(path: &Path) -> Result<SettingsTables> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(SettingsTables::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Copy of every table.
    pub fn snapshot(&self) -> SettingsTables {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SettingsTables> {
        // A panic while holding the lock leaves whole strings behind, never
        // half-written ones, so the tables are still usable.
        self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, tables: &SettingsTables) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(tables)?)?;
        fs::rename(&tmp, path).map_err(ButlerError::from)
    }
}

impl SettingsAccessor for SettingsStore {
    fn get_string(&self, namespace: Namespace, key: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .get(&namespace)
            .and_then(|table| table.get(key))
            .cloned())
    }

    fn put_string(&self, namespace: Namespace, key: &str, value: &str) -> Result<bool> {
        let mut tables = self.lock();
        tables
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.persist(&tables)?;
        Ok(true)
    }
}
