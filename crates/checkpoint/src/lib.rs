//! Checkpoint store implementations for StepVault.

pub mod file_backend;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileCheckpointStore;
pub use in_memory::InMemoryCheckpointStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointStore;

use std::sync::Arc;
use stepvault_config::{CheckpointBackend, CheckpointConfig};
use stepvault_core::checkpoint::CheckpointStore;
use stepvault_core::error::CheckpointError;

/// Open the store selected by configuration.
pub async fn open(config: &CheckpointConfig) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    match config.backend {
        CheckpointBackend::Memory => Ok(Arc::new(InMemoryCheckpointStore::new())),
        CheckpointBackend::File => Ok(Arc::new(FileCheckpointStore::new(
            config.resolved_path(),
        )?)),
        #[cfg(feature = "sqlite")]
        CheckpointBackend::Sqlite => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CheckpointError::Storage(format!(
                        "Failed to create {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteCheckpointStore::new(&url).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        CheckpointBackend::Sqlite => Err(CheckpointError::Storage(
            "SQLite support was not compiled in; rebuild with the `sqlite` feature".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_memory_backend() {
        let config = CheckpointConfig {
            backend: CheckpointBackend::Memory,
            path: None,
        };
        let store = open(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn open_file_backend_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig {
            backend: CheckpointBackend::File,
            path: Some(dir.path().join("nested").join("cps")),
        };
        let store = open(&config).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(dir.path().join("nested").join("cps").is_dir());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn open_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointConfig {
            backend: CheckpointBackend::Sqlite,
            path: Some(dir.path().join("db").join("checkpoints.db")),
        };
        let store = open(&config).await.unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(store.list().await.unwrap().is_empty());
    }
}
