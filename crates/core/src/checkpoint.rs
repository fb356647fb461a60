//! Checkpoint trait: durable storage of the latest state per session.
//!
//! The store holds only the newest snapshot for each session. `step` is a
//! monotonically increasing version used for compare-and-set writes.

use crate::error::CheckpointError;
use crate::message::SessionId;
use crate::state::ConversationState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable snapshot of a session's state at a step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: SessionId,
    pub step: u64,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(session_id: SessionId, step: u64, state: ConversationState) -> Self {
        Self {
            session_id,
            step,
            state,
            created_at: Utc::now(),
        }
    }

    /// The snapshot that follows this one, holding `state`.
    pub fn next(&self, state: ConversationState) -> Self {
        Self::new(self.session_id.clone(), self.step + 1, state)
    }
}

/// The checkpoint store abstraction.
///
/// Implementations: in-memory, JSON files, SQLite. All must be internally
/// synchronised; the engine calls them from many sessions at once.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &str;

    /// Latest checkpoint for a session, if any.
    async fn get(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Unconditional last-write-wins put.
    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError>;

    /// Put only if the stored step equals `expected` (`None` = no checkpoint yet).
    async fn put_if_version(
        &self,
        checkpoint: Checkpoint,
        expected: Option<u64>,
    ) -> Result<(), CheckpointError>;

    /// Remove a session's checkpoint. Returns whether one existed.
    async fn delete(&self, session_id: &SessionId) -> Result<bool, CheckpointError>;

    /// Every session with a stored checkpoint.
    async fn list(&self) -> Result<Vec<SessionId>, CheckpointError>;
}

/// Conflict error for a failed compare-and-set.
pub fn conflict(session_id: &SessionId, expected: Option<u64>, found: Option<u64>) -> CheckpointError {
    CheckpointError::Conflict {
        session_id: session_id.to_string(),
        expected,
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_bumps_step_and_keeps_session() {
        let first = Checkpoint::new(SessionId::from("s"), 0, ConversationState::new(3));
        let mut state = first.state.clone();
        state.begin_task("hi");
        let second = first.next(state.clone());
        assert_eq!(second.step, 1);
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.state, state);
    }

    #[test]
    fn conflict_carries_versions() {
        let err = conflict(&SessionId::from("s"), Some(1), None);
        assert!(matches!(
            err,
            CheckpointError::Conflict {
                expected: Some(1),
                found: None,
                ..
            }
        ));
    }
}
