//! SQLite-based checkpoint store
//!
//! Stores one row per thread for durable, queryable persistence. Version
//! bumps happen inside the upsert, so concurrent writers through separate
//! connections still produce a monotonic sequence. A busy or locked
//! database surfaces as [`CheckpointError::WriteConflict`].
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS checkpoints (
//!     thread_id  TEXT PRIMARY KEY,
//!     version    INTEGER NOT NULL,
//!     state      TEXT NOT NULL,
//!     updated_at TEXT NOT NULL
//! );
//! ```
//!
//! # Usage
//!
//! ```ignore
//! // File-based database
//! let store = SqliteCheckpointStore::new("./checkpoints.db").await?;
//!
//! // In-memory database (for testing)
//! let store = SqliteCheckpointStore::new(":memory:").await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;

use super::{Checkpoint, CheckpointError, CheckpointStore, ThreadId};
use crate::state::ConversationState;

/// Checkpoint store backed by a SQLite database
#[derive(Debug)]
pub struct SqliteCheckpointStore {
    conn: Connection,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database at `path` and ensure the schema.
    /// Pass `:memory:` for an in-memory database.
    pub async fn new(path: impl AsRef<str>) -> Result<Self, CheckpointError> {
        let path = path.as_ref().to_string();

        let conn = Connection::open(&path)
            .await
            .map_err(CheckpointError::storage)?;

        conn.call(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS checkpoints (
                    thread_id  TEXT PRIMARY KEY,
                    version    INTEGER NOT NULL,
                    state      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            )?;
            Ok(())
        })
        .await
        .map_err(CheckpointError::storage)?;

        Ok(Self { conn })
    }

    /// Map backend errors, surfacing lock contention as a write conflict
    fn backend_error(thread_id: &ThreadId, err: tokio_rusqlite::Error) -> CheckpointError {
        if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(ffi_err, _)) = &err {
            if matches!(
                ffi_err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return CheckpointError::WriteConflict {
                    thread_id: thread_id.clone(),
                };
            }
        }
        CheckpointError::storage(err)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError> {
        let id = thread_id.as_str().to_string();

        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT version, state, updated_at FROM checkpoints WHERE thread_id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![id])?;

                if let Some(row) = rows.next()? {
                    let version: i64 = row.get(0)?;
                    let state: String = row.get(1)?;
                    let updated_at: String = row.get(2)?;
                    Ok(Some((version, state, updated_at)))
                } else {
                    Ok(None)
                }
            })
            .await
            .map_err(|e| Self::backend_error(thread_id, e))?;

        match row {
            Some((version, state, updated_at)) => {
                let state: ConversationState = serde_json::from_str(&state)?;
                let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                    .map_err(CheckpointError::storage)?
                    .with_timezone(&Utc);

                Ok(Some(Checkpoint {
                    thread_id: thread_id.clone(),
                    state,
                    version: version as u64,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        thread_id: &ThreadId,
        state: &ConversationState,
    ) -> Result<u64, CheckpointError> {
        let id = thread_id.as_str().to_string();
        let json = serde_json::to_string(state)?;
        let updated_at = Utc::now().to_rfc3339();

        let version = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO checkpoints (thread_id, version, state, updated_at)
                    VALUES (?1, 1, ?2, ?3)
                    ON CONFLICT(thread_id) DO UPDATE SET
                        version = version + 1,
                        state = excluded.state,
                        updated_at = excluded.updated_at
                    "#,
                    rusqlite::params![id, json, updated_at],
                )?;

                let version: i64 = conn.query_row(
                    "SELECT version FROM checkpoints WHERE thread_id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )?;
                Ok(version)
            })
            .await
            .map_err(|e| Self::backend_error(thread_id, e))?;

        Ok(version as u64)
    }

    async fn reset(&self, thread_id: &ThreadId) -> Result<(), CheckpointError> {
        let id = thread_id.as_str().to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM checkpoints WHERE thread_id = ?1",
                    rusqlite::params![id],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| Self::backend_error(thread_id, e))?;

        Ok(())
    }
}
