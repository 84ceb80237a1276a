use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Error;
use crate::session::PersistedSession;

/// Client-local persistence for the session record.
///
/// Implementations must make `save` all-or-nothing: a crash mid-write
/// leaves either the previous record or the new one.
pub trait SessionStorage: Send + Sync + 'static {
    /// Reads the record. `Ok(None)` if nothing is stored.
    fn load(&self) -> Result<Option<PersistedSession>, Error>;

    fn save(&self, session: &PersistedSession) -> Result<(), Error>;

    /// Removes the record. Removing a missing record is not an error.
    fn erase(&self) -> Result<(), Error>;
}

/// One JSON file per record, written via temp file + rename.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage for record `name` inside `dir` (`<dir>/<name>.json`).
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{name}.json")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{file_name}.tmp"))
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<PersistedSession>, Error> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(&self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| storage_error(&self.path, e))
    }

    fn save(&self, session: &PersistedSession) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }

        let json = serde_json::to_vec(session).map_err(|e| storage_error(&self.path, e))?;

        let tmp_path = self.temp_path();
        let mut tmp = File::create(&tmp_path).map_err(|e| storage_error(&tmp_path, e))?;
        tmp.write_all(&json).map_err(|e| storage_error(&tmp_path, e))?;
        tmp.sync_all().map_err(|e| storage_error(&tmp_path, e))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path).map_err(|e| storage_error(&self.path, e))
    }

    fn erase(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }
}

/// In-process storage holding the serialized record.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    record: Mutex<Option<String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with raw record text.
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(raw.into())),
        }
    }

    /// The raw stored record, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.record.lock().clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<PersistedSession>, Error> {
        match self.record.lock().as_deref() {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| Error::Storage(e.to_string())),
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<(), Error> {
        let raw = serde_json::to_string(session).map_err(|e| Error::Storage(e.to_string()))?;
        *self.record.lock() = Some(raw);
        Ok(())
    }

    fn erase(&self) -> Result<(), Error> {
        *self.record.lock() = None;
        Ok(())
    }
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {e}", path.display()))
}
