//! In-memory checkpoint store: for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stepvault_core::checkpoint::{Checkpoint, CheckpointStore, conflict};
use stepvault_core::error::CheckpointError;
use stepvault_core::message::SessionId;
use tokio::sync::RwLock;

/// A simple in-memory store. Lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    entries: Arc<RwLock<HashMap<SessionId, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.entries.read().await.get(session_id).cloned())
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        self.entries
            .write()
            .await
            .insert(checkpoint.session_id.clone(), checkpoint);
        Ok(())
    }

    async fn put_if_version(
        &self,
        checkpoint: Checkpoint,
        expected: Option<u64>,
    ) -> Result<(), CheckpointError> {
        let mut entries = self.entries.write().await;
        let found = entries.get(&checkpoint.session_id).map(|c| c.step);
        if found != expected {
            return Err(conflict(&checkpoint.session_id, expected, found));
        }
        entries.insert(checkpoint.session_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, CheckpointError> {
        Ok(self.entries.write().await.remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionId>, CheckpointError> {
        let mut ids: Vec<_> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
