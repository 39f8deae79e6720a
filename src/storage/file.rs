//! File-backed key-value store: one file per key under a data directory.

use std::io;
use std::path::PathBuf;

use tracing::debug;

use super::{KeyValueStore, StoreError};

/// Application name used for the default data directory path.
const APP_NAME: &str = "rutacache";

/// Persistent store laying each key out as `<dir>/<key>`.
///
/// Keys are already safe filenames by construction (the cache and queue
/// derive them from sanitized components joined with `_`), but the key is
/// validated anyway so a stray caller cannot escape the directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default per-user data directory, if the platform exposes one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_NAME))
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key.is_ascii()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // Write-then-rename so a reader interleaved with a rewrite sees the
        // old contents or the new ones, never a truncated file. The leading
        // dot keeps the temp name outside the valid key namespace.
        let tmp = self.dir.join(format!(".tmp-{key}"));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, bytes = value.len(), "stored value");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
