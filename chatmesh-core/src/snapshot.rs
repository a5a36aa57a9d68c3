//! Last good directory listing, persisted as JSON for use while the tracker is down.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatError;
use crate::tracker::Directory;

/// On disk: `{"timestamp": ..., "peers": [...], "channels": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub directory: Directory,
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the snapshot with `directory`, stamped now.
    pub async fn save(&self, directory: &Directory) -> Result<DirectorySnapshot, ChatError> {
        let snapshot = DirectorySnapshot {
            timestamp: Utc::now(),
            directory: directory.clone(),
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        // Write-then-rename so a reader never sees a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), peers = snapshot.directory.peers.len(), "directory snapshot saved");
        Ok(snapshot)
    }

    /// `Ok(None)` when no snapshot has been saved yet.
    pub async fn load(&self) -> Result<Option<DirectorySnapshot>, ChatError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
