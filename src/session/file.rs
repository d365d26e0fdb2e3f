use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::SessionStore;
use crate::error::StoreError;

/// Session store backed by a single JSON object on disk.
///
/// Every operation re-reads the file, so separate processes see each other's
/// writes. A write holds an exclusive lock on `.<name>.lock` next to the file
/// from load to commit, so writers on disjoint keys never drop each other's
/// entries. The new contents go to a uniquely named owner-only temp file that
/// is renamed over the existing one; readers never observe a half-written file
/// and a batch lands all at once.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<user cache dir>/mbank-e2e/session.json`.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let cache = dirs::cache_dir().ok_or(StoreError::NoDefaultLocation)?;
        Ok(cache.join("mbank-e2e").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn parent(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session.json".to_string());
        self.parent().join(format!(".{file_name}.lock"))
    }

    fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, apply `change` and commit, all under the exclusive file lock.
    /// `change` returns whether anything changed; nothing is written if not.
    fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Map<String, Value>) -> bool,
    {
        let parent = self.parent();
        std::fs::create_dir_all(&parent).map_err(|e| self.io_error(e))?;

        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())
            .map_err(|e| self.io_error(e))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write().map_err(|e| self.io_error(e))?;

        let mut entries = self.load()?;
        if change(&mut entries) {
            self.commit(&parent, &entries)?;
        }
        Ok(())
    }

    /// Write the whole map atomically. The temp file is created 0600 and
    /// synced before the rename, since the session holds the client private
    /// key. A failed write leaves no temp file behind.
    fn commit(&self, parent: &Path, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| self.io_error(e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn set_value(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
    }

    fn set_many(&self, batch: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.extend(batch);
            true
        })
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load()?.remove(key))
    }

    fn delete(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.update(|entries| {
            let before = entries.len();
            for key in keys {
                entries.remove(*key);
            }
            entries.len() != before
        })
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.keys().cloned().collect())
    }
}
