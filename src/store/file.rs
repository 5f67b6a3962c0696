//! File-backed persistence slot
//!
//! Stores the serialized alert set as a single JSON file. A missing file is
//! an empty slot, not an error; everything else maps onto [`StorageError`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::backend::PersistenceBackend;
use super::error::{StorageError, StorageResult};

/// File-backed slot backend
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional slot file under the given directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(format!("{}.json", super::STORAGE_KEY)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                debug!("loaded {} bytes from {}", bytes.len(), self.path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, bytes: &[u8]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| StorageError::WriteFailed(format!("{}: {e}", self.path.display())))?;

        debug!("persisted {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}
