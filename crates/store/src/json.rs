use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use cadence_core::Directory;

use crate::error::StoreError;

/// Whole-document load/save of the recipient directory.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Latest persisted snapshot, `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<Directory>, StoreError>;

    /// Replace the persisted snapshot.
    async fn save(&self, directory: &Directory) -> Result<(), StoreError>;
}

/// JSON document on the local filesystem.
///
/// Saves write a sibling temp file and rename it over the document, so
/// a crash mid-save never leaves a truncated directory behind. Saves
/// are serialized internally; concurrent callers would otherwise race
/// on the shared temp file.
pub struct JsonFileStore {
    path: PathBuf,
    save_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<Directory>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let directory = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Serialize(e.to_string()))?;
                debug!(path = %self.path.display(), "directory loaded");
                Ok(Some(directory))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, directory: &Directory) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(directory)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            recipients = directory.recipients.len(),
            "directory saved"
        );
        Ok(())
    }
}
