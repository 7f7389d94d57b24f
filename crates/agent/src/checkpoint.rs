//! Per-thread conversation checkpoints.
//!
//! A checkpoint holds the thread's message history and the snapshot of its
//! most recent completed run. It is written once per completed run.

use crate::state::{RunSnapshot, Turn};
use chrono::{DateTime, Utc};
use ragloop_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub messages: Vec<Turn>,
    pub last_run: RunSnapshot,
    pub updated_at: DateTime<Utc>,
}

/// Persistence for thread checkpoints, keyed by thread id.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> AppResult<Option<Checkpoint>>;

    /// Replace the thread's checkpoint.
    async fn save(&self, thread_id: &str, checkpoint: &Checkpoint) -> AppResult<()>;

    /// Remove the thread's checkpoint. Returns whether one existed.
    async fn delete(&self, thread_id: &str) -> AppResult<bool>;
}

/// Process-local checkpoints.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> AppResult<Option<Checkpoint>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, thread_id: &str, checkpoint: &Checkpoint) -> AppResult<()> {
        self.threads
            .write()
            .await
            .insert(thread_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, thread_id: &str) -> AppResult<bool> {
        Ok(self.threads.write().await.remove(thread_id).is_some())
    }
}

/// Checkpoints stored as JSON rows in SQLite.
///
/// Statements run on the blocking pool.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Agent(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Agent(format!("Failed to open checkpoint store: {}", e)))?;

        tracing::debug!("Opened checkpoint store at {:?}", db_path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Agent(format!("Failed to open in-memory checkpoint store: {}", e))
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::Agent(format!("Failed to create checkpoint table: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, statement: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock_connection(&conn)?;
            statement(&conn)
        })
        .await
        .map_err(|e| AppError::Agent(format!("Checkpoint task failed: {}", e)))?
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::Agent("Checkpoint store lock poisoned".to_string()))
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> AppResult<Option<Checkpoint>> {
        let thread_id = thread_id.to_string();
        let payload: Option<String> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT payload FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| AppError::Agent(format!("Failed to load checkpoint: {}", e)))
            })
            .await?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(AppError::from))
            .transpose()
    }

    async fn save(&self, thread_id: &str, checkpoint: &Checkpoint) -> AppResult<()> {
        let payload = serde_json::to_string(checkpoint)?;
        let thread_id = thread_id.to_string();
        let updated_at = checkpoint.updated_at.to_rfc3339();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checkpoints (thread_id, payload, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![thread_id, payload, updated_at],
            )
            .map_err(|e| AppError::Agent(format!("Failed to save checkpoint: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, thread_id: &str) -> AppResult<bool> {
        let thread_id = thread_id.to_string();
        self.blocking(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                )
                .map_err(|e| AppError::Agent(format!("Failed to delete checkpoint: {}", e)))?;
            Ok(removed > 0)
        })
        .await
    }
}
