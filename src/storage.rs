//! Small persistent key/value store.
//!
//! Holds the two API keys and per-video notes. The whole map is kept in memory and
//! rewritten to disk on every `set`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key/value store shared between the controller and the note autosaver
pub trait Storage: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// The two fixed credential slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKey {
    YouTube,
    Gemini,
}

impl CredentialKey {
    pub fn storage_key(self) -> &'static str {
        match self {
            CredentialKey::YouTube => "youtube_api_key",
            CredentialKey::Gemini => "gemini_api_key",
        }
    }
}

/// Read a credential, treating blank values as absent
pub fn credential<S: Storage>(storage: &S, key: CredentialKey) -> Option<String> {
    storage
        .get(key.storage_key())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

type Map = BTreeMap<String, String>;

/// JSON-file backed store
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
    entries: Arc<Mutex<Map>>,
}

impl FileStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) if data.trim().is_empty() => Map::new(),
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened storage {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Memory only changes once the file holds the new value
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&updated)?)?;
        *entries = updated;
        debug!("Stored key {key} in {}", self.path.display());
        Ok(())
    }
}

/// In-memory store, for tests and throwaway sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<Map>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
