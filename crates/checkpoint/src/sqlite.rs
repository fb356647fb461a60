//! SQLite checkpoint store.
//!
//! One row per session in `checkpoints`, holding the latest step and the
//! state as JSON text. Versioned writes are a single conditional statement,
//! so concurrent writers from different processes cannot interleave.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use stepvault_core::checkpoint::{Checkpoint, CheckpointStore, conflict};
use stepvault_core::error::CheckpointError;
use stepvault_core::message::SessionId;
use stepvault_core::state::ConversationState;
use tracing::{debug, info};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (or create) a database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database.
    pub async fn new(path: &str) -> Result<Self, CheckpointError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| CheckpointError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // every connection to :memory: is its own database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite checkpoint store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id  TEXT PRIMARY KEY NOT NULL,
                step        INTEGER NOT NULL,
                state       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::MigrationFailed(format!("checkpoints table: {e}")))?;

        debug!("SQLite checkpoint migrations complete");
        Ok(())
    }

    fn row_to_checkpoint(row: &sqlx::sqlite::SqliteRow) -> Result<Checkpoint, CheckpointError> {
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| CheckpointError::Storage(format!("session_id column: {e}")))?;
        let step: i64 = row
            .try_get("step")
            .map_err(|e| CheckpointError::Storage(format!("step column: {e}")))?;
        let state_json: String = row
            .try_get("state")
            .map_err(|e| CheckpointError::Storage(format!("state column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| CheckpointError::Storage(format!("created_at column: {e}")))?;

        let state: ConversationState =
            serde_json::from_str(&state_json).map_err(|e| CheckpointError::Corrupt {
                session_id: session_id.clone(),
                reason: e.to_string(),
            })?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CheckpointError::Corrupt {
                session_id: session_id.clone(),
                reason: format!("created_at: {e}"),
            })?;

        Ok(Checkpoint {
            session_id: SessionId(session_id),
            step: step as u64,
            state,
            created_at,
        })
    }

    fn encode(checkpoint: &Checkpoint) -> Result<(String, String), CheckpointError> {
        let state = serde_json::to_string(&checkpoint.state)
            .map_err(|e| CheckpointError::Storage(format!("State serialization: {e}")))?;
        Ok((state, checkpoint.created_at.to_rfc3339()))
    }

    async fn current_step(&self, session_id: &SessionId) -> Result<Option<u64>, CheckpointError> {
        let row = sqlx::query("SELECT step FROM checkpoints WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT step failed: {e}")))?;
        Ok(row.and_then(|r| r.try_get::<i64, _>("step").ok()).map(|s| s as u64))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query("SELECT * FROM checkpoints WHERE session_id = ?1")
            .bind(session_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let (state, created_at) = Self::encode(&checkpoint)?;
        sqlx::query(
            r#"
            INSERT INTO checkpoints (session_id, step, state, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id) DO UPDATE SET
                step = excluded.step,
                state = excluded.state,
                created_at = excluded.created_at
            "#,
        )
        .bind(checkpoint.session_id.as_str())
        .bind(checkpoint.step as i64)
        .bind(&state)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("INSERT failed: {e}")))?;

        debug!(session_id = %checkpoint.session_id, step = checkpoint.step, "Checkpoint stored");
        Ok(())
    }

    async fn put_if_version(
        &self,
        checkpoint: Checkpoint,
        expected: Option<u64>,
    ) -> Result<(), CheckpointError> {
        let (state, created_at) = Self::encode(&checkpoint)?;

        let result = match expected {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO checkpoints (session_id, step, state, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(session_id) DO NOTHING
                    "#,
                )
                .bind(checkpoint.session_id.as_str())
                .bind(checkpoint.step as i64)
                .bind(&state)
                .bind(&created_at)
                .execute(&self.pool)
                .await
            }
            Some(version) => {
                sqlx::query(
                    r#"
                    UPDATE checkpoints
                    SET step = ?2, state = ?3, created_at = ?4
                    WHERE session_id = ?1 AND step = ?5
                    "#,
                )
                .bind(checkpoint.session_id.as_str())
                .bind(checkpoint.step as i64)
                .bind(&state)
                .bind(&created_at)
                .bind(version as i64)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| CheckpointError::Storage(format!("Versioned write failed: {e}")))?;

        if result.rows_affected() == 0 {
            let found = self.current_step(&checkpoint.session_id).await?;
            return Err(conflict(&checkpoint.session_id, expected, found));
        }

        debug!(session_id = %checkpoint.session_id, step = checkpoint.step, "Checkpoint committed");
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, CheckpointError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE session_id = ?1")
            .bind(session_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<SessionId>, CheckpointError> {
        let rows = sqlx::query("SELECT session_id FROM checkpoints ORDER BY session_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("session_id")
                    .map(SessionId)
                    .map_err(|e| CheckpointError::Storage(format!("session_id column: {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepvault_core::message::{Message, MessageToolCall};
    use stepvault_core::state::PendingInterrupt;

    async fn test_store() -> SqliteCheckpointStore {
        SqliteCheckpointStore::new("sqlite::memory:").await.unwrap()
    }

    fn snapshot(id: &str, step: u64) -> Checkpoint {
        let mut state = ConversationState::new(10);
        state.begin_task("book a table");
        state.messages.push(Message::assistant_with_calls(
            "",
            vec![MessageToolCall {
                id: "call_0".into(),
                name: "human_assistance".into(),
                arguments: r#"{"query":"For how many people?"}"#.into(),
            }],
        ));
        state.iterations_used = 1;
        state.pending_interrupt = Some(PendingInterrupt {
            id: "call_0".into(),
            query: "For how many people?".into(),
        });
        Checkpoint::new(SessionId::from(id), step, state)
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = test_store().await;
        let cp = snapshot("s1", 2);
        store.put(cp.clone()).await.unwrap();

        let loaded = store.get(&SessionId::from("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.state, cp.state);
        assert_eq!(loaded.step, 2);
        assert_eq!(loaded.session_id, cp.session_id);
    }

    #[tokio::test]
    async fn put_is_last_write_wins() {
        let store = test_store().await;
        store.put(snapshot("s1", 0)).await.unwrap();
        let mut newer = snapshot("s1", 1);
        newer.state.pending_interrupt = None;
        store.put(newer.clone()).await.unwrap();

        let loaded = store.get(&SessionId::from("s1")).await.unwrap().unwrap();
        assert_eq!(loaded.step, 1);
        assert!(loaded.state.pending_interrupt.is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn versioned_insert_and_update() {
        let store = test_store().await;
        store.put_if_version(snapshot("s1", 0), None).await.unwrap();

        let err = store
            .put_if_version(snapshot("s1", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { found: Some(0), .. }));

        store.put_if_version(snapshot("s1", 1), Some(0)).await.unwrap();
        let err = store
            .put_if_version(snapshot("s1", 2), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::Conflict {
                expected: Some(0),
                found: Some(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_of_missing_session_conflicts() {
        let store = test_store().await;
        let err = store
            .put_if_version(snapshot("ghost", 1), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Conflict { found: None, .. }));
    }

    #[tokio::test]
    async fn delete_and_list() {
        let store = test_store().await;
        store.put(snapshot("b", 0)).await.unwrap();
        store.put(snapshot("a", 0)).await.unwrap();
        assert_eq!(
            store.list().await.unwrap(),
            vec![SessionId::from("a"), SessionId::from("b")]
        );
        assert!(store.delete(&SessionId::from("a")).await.unwrap());
        assert!(!store.delete(&SessionId::from("a")).await.unwrap());
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("cp.db").display());
        {
            let store = SqliteCheckpointStore::new(&url).await.unwrap();
            store.put(snapshot("keep", 4)).await.unwrap();
        }
        let store = SqliteCheckpointStore::new(&url).await.unwrap();
        let loaded = store.get(&SessionId::from("keep")).await.unwrap();
        assert_eq!(loaded.map(|c| c.step), Some(4));
    }
}
