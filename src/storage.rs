//! Session-scoped storage.
//!
//! The browser dashboard kept its session and report snapshots in
//! `sessionStorage`; here the same role is played by a directory that is
//! wiped at logout. Each entry is one UTF-8 file named after its key.
//!
//! ## Storage Location
//!
//! Chosen by [`crate::config::SessionConfig::resolve_storage_dir`]:
//! - Windows: `%LOCALAPPDATA%\pawnshop-admin\session\`
//! - macOS: `~/Library/Caches/pawnshop-admin/session/`
//! - Linux: `~/.cache/pawnshop-admin/session/`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::{AdminError, AdminResult};

/// File extension for stored entries.
const ENTRY_EXTENSION: &str = "json";

/// Handle on the session storage directory.
#[derive(Debug, Clone)]
pub struct SessionStorage {
    root: PathBuf,
}

impl SessionStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage in a subdirectory, cleared independently of this one.
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.root.join(name))
    }

    fn entry_path(&self, key: &str) -> AdminResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AdminError::StorageError(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid storage key '{key}'"),
            )));
        }
        Ok(self.root.join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    /// Write `data` under `key`, creating the directory if needed.
    ///
    /// The write goes to a temporary file first and is then renamed, so a
    /// reader never sees a half-written entry.
    pub async fn save(&self, key: &str, data: &str) -> AdminResult<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.root).await?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key, bytes = data.len(), "Saved session entry");
        Ok(())
    }

    /// Load the entry under `key`. Returns `Ok(None)` if it does not exist.
    pub async fn load(&self, key: &str) -> AdminResult<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AdminError::StorageError(e)),
        }
    }

    /// Delete the entry under `key` (no-op if absent).
    pub async fn remove(&self, key: &str) -> AdminResult<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(_) => {
                debug!(key, "Removed session entry");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AdminError::StorageError(e)),
        }
    }

    /// Delete every entry in the storage directory.
    pub async fn clear(&self) -> AdminResult<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(AdminError::StorageError(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_entry = path
                .extension()
                .is_some_and(|ext| ext == ENTRY_EXTENSION || ext == "tmp");
            if is_entry {
                match fs::remove_file(&path).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(AdminError::StorageError(e)),
                }
            }
        }

        debug!(root = %self.root.display(), "Cleared session storage");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_storage() -> SessionStorage {
    let dir = std::env::temp_dir()
        .join("pawnshop-admin-tests")
        .join(uuid::Uuid::new_v4().to_string());
    SessionStorage::new(dir)
}
