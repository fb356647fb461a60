//! File-based checkpoint store: one JSON document per session.
//!
//! Storage location: `~/.stepvault/checkpoints/<session>.json`
//!
//! Writes go to a temporary sibling and are renamed into place, so a reader
//! never sees a half-written checkpoint.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stepvault_core::checkpoint::{Checkpoint, CheckpointStore, conflict};
use stepvault_core::error::CheckpointError;
use stepvault_core::message::SessionId;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FileCheckpointStore {
    dir: PathBuf,
    /// Serialises read-compare-write sequences.
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            CheckpointError::Storage(format!(
                "Failed to create checkpoint directory {}: {e}",
                dir.display()
            ))
        })?;
        debug!(path = %dir.display(), "File checkpoint store opened");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a session id onto a safe file name.
    ///
    /// Alphanumerics, `-` and `_` pass through; every other byte becomes `%XX`.
    fn file_name(session_id: &SessionId) -> String {
        let mut name = String::with_capacity(session_id.as_str().len() + 5);
        for b in session_id.as_str().bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                name.push(b as char);
            } else {
                name.push_str(&format!("%{b:02X}"));
            }
        }
        name.push_str(".json");
        name
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir.join(Self::file_name(session_id))
    }

    async fn read(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(session_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CheckpointError::Corrupt {
                session_id: session_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.session_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| CheckpointError::Storage(format!("Failed to serialize checkpoint: {e}")))?;

        tokio::fs::write(&tmp, &body).await.map_err(|e| {
            CheckpointError::Storage(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            CheckpointError::Storage(format!("Failed to move {} into place: {e}", path.display()))
        })?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        self.read(session_id).await
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let _guard = self.write_lock.lock().await;
        self.write(&checkpoint).await
    }

    async fn put_if_version(
        &self,
        checkpoint: Checkpoint,
        expected: Option<u64>,
    ) -> Result<(), CheckpointError> {
        let _guard = self.write_lock.lock().await;
        let found = self.read(&checkpoint.session_id).await?.map(|c| c.step);
        if found != expected {
            return Err(conflict(&checkpoint.session_id, expected, found));
        }
        self.write(&checkpoint).await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, CheckpointError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CheckpointError::Storage(format!(
                "Failed to delete checkpoint: {e}"
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<SessionId>, CheckpointError> {
        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to list checkpoints: {e}")))?;

        let mut ids = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to list checkpoints: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .ok()
                .and_then(|b| serde_json::from_slice::<Checkpoint>(&b).ok());
            match parsed {
                Some(cp) => ids.push(cp.session_id),
                None => warn!(path = %path.display(), "Skipping unreadable checkpoint file"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
