use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{DelegatedSessionRecord, STORAGE_KEY};

#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    /// The stored record exists but cannot be parsed.
    Corrupt(serde_json::Error),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(err) => write!(f, "Session storage I/O error: {err}"),
            PersistenceError::Corrupt(err) => write!(f, "Corrupt session record: {err}"),
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

/// Durable storage for the delegated-session record.
pub trait SessionPersistence {
    fn load(&self) -> Result<Option<DelegatedSessionRecord>, PersistenceError>;
    fn save(&self, record: &DelegatedSessionRecord) -> Result<(), PersistenceError>;
    fn clear(&self) -> Result<(), PersistenceError>;
}

/// One JSON file on disk.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/subUserAuth.json`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{STORAGE_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStore {
    fn load(&self) -> Result<Option<DelegatedSessionRecord>, PersistenceError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(PersistenceError::Corrupt)
    }

    fn save(&self, record: &DelegatedSessionRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string(record).map_err(PersistenceError::Corrupt)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage holding the raw JSON text, like a browser's local
/// storage entry.
#[derive(Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the slot with arbitrary text.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(raw.into())),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load(&self) -> Result<Option<DelegatedSessionRecord>, PersistenceError> {
        match self.lock().as_deref() {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(PersistenceError::Corrupt),
            None => Ok(None),
        }
    }

    fn save(&self, record: &DelegatedSessionRecord) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(record).map_err(PersistenceError::Corrupt)?;
        *self.lock() = Some(raw);
        Ok(())
    }

    fn clear(&self) -> Result<(), PersistenceError> {
        *self.lock() = None;
        Ok(())
    }
}
