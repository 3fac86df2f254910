//! Persisted preferences: a flat string key/value store.
//!
//! Only the last used mode lives here. Read once at startup, written once
//! per confirmed mode change. No merge semantics: the file is rewritten
//! whole on every `set`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key holding the logical id of the last applied mode.
pub const LAST_MODE_KEY: &str = "last_mode";

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("preferences I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preferences file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait PreferenceStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError>;

    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError>;
}

// =============================================================================
// JSON FILE
// =============================================================================

/// Preferences kept as a JSON object on disk. A missing file is an empty store.
pub struct JsonFilePrefs {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePrefs {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, PrefsError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(PrefsError::Io { path: self.path.clone(), source }),
        };
        serde_json::from_str(&raw).map_err(|source| PrefsError::Json { path: self.path.clone(), source })
    }
}

impl PreferenceStore for JsonFilePrefs {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all = self.read_all()?;
        all.insert(key.to_owned(), value.to_owned());
        let json = serde_json::to_string_pretty(&all)
            .map_err(|source| PrefsError::Json { path: self.path.clone(), source })?;
        std::fs::write(&self.path, json).map_err(|source| PrefsError::Io { path: self.path.clone(), source })
    }
}

// =============================================================================
// MEMORY
// =============================================================================

/// In-process store, for tests and `--no-persist` style callers.
#[derive(Default)]
pub struct MemoryPrefs {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPrefs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPrefs {
    fn get(&self, key: &str) -> Result<Option<String>, PrefsError> {
        Ok(self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PrefsError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
#[path = "prefs_test.rs"]
mod tests;
