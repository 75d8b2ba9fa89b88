//! Thread-keyed checkpoint storage
//!
//! Every conversation thread owns exactly one checkpoint: the state left
//! behind by its most recent completed run. Stores replace it wholesale on
//! save (last writer wins) and hand back fresh defaults for threads they
//! have never seen.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                CheckpointStore                │
//! │   ┌──────────┐  ┌──────────┐  ┌──────────┐    │
//! │   │  Memory  │  │   File   │  │  SQLite  │    │
//! │   └──────────┘  └──────────┘  └──────────┘    │
//! │         │             │             │         │
//! │         └─────────────┴─────────────┘         │
//! │                       │                       │
//! │                       ▼                       │
//! │          Checkpoint (one per ThreadId)        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let store = MemoryCheckpointStore::new();
//! let thread = ThreadId::new("user-42")?;
//!
//! let state = store.load_state(&thread).await?; // defaults for a new thread
//! store.save(&thread, &state).await?;
//! store.reset(&thread).await?; // back to defaults
//! ```

mod file;
#[cfg(feature = "checkpointer-sqlite")]
mod sqlite;

pub use file::FileCheckpointStore;
#[cfg(feature = "checkpointer-sqlite")]
pub use sqlite::SqliteCheckpointStore;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ConversationState;

/// Rejection of an empty or blank thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("thread id must be a non-empty string")]
pub struct InvalidThreadIdError;

/// Identifier scoping one conversation's persisted state
///
/// Construction goes through [`ThreadId::new`], so a held value is always
/// non-blank. Callers that have no id yet get one from
/// [`ThreadId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Validate a caller-supplied identifier
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidThreadIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidThreadIdError);
        }
        Ok(Self(id))
    }

    /// Mint a fresh identifier for callers that did not supply one
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures inside a checkpoint backend
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Backend I/O or query failure
    #[error("checkpoint storage failed: {0}")]
    Storage(String),

    /// Checkpoint (de)serialization failure
    #[error("checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend could not serialize concurrent writers on a thread
    #[error("checkpoint write conflict on thread {thread_id}")]
    WriteConflict {
        /// Thread whose write lost the race
        thread_id: ThreadId,
    },
}

impl CheckpointError {
    /// Wrap any backend error into the storage variant
    pub(crate) fn storage(err: impl fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Durable snapshot of one thread's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Thread the snapshot belongs to
    pub thread_id: ThreadId,

    /// State after the thread's most recent completed run
    pub state: ConversationState,

    /// Monotonic per-thread sequence number, starting at 1
    pub version: u64,

    /// When the snapshot was written
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Create a snapshot stamped with the current time
    pub fn new(thread_id: ThreadId, state: ConversationState, version: u64) -> Self {
        Self {
            thread_id,
            state,
            version,
            updated_at: Utc::now(),
        }
    }
}

/// Trait for persisting per-thread conversation state
///
/// Implementations must make `save` atomic per thread: a concurrent reader
/// sees either the previous checkpoint or the new one, never a torn write.
/// Across threads there is no ordering requirement at all.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint for a thread, or `None` if the thread is unseen
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Replace the thread's checkpoint with `state`, bumping the version.
    /// Last writer wins. Returns the version just stored.
    async fn save(
        &self,
        thread_id: &ThreadId,
        state: &ConversationState,
    ) -> Result<u64, CheckpointError>;

    /// Drop the thread's checkpoint so the next load sees `None`. Resetting
    /// an unseen thread is a no-op, not an error.
    async fn reset(&self, thread_id: &ThreadId) -> Result<(), CheckpointError>;

    /// Starting state for a run: the stored snapshot, or defaults for an
    /// unseen thread
    async fn load_state(&self, thread_id: &ThreadId) -> Result<ConversationState, CheckpointError> {
        Ok(self
            .load(thread_id)
            .await?
            .map(|checkpoint| checkpoint.state)
            .unwrap_or_default())
    }
}

/// In-memory checkpoint store
///
/// Not durable across process restarts; the default for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    threads: tokio::sync::RwLock<HashMap<ThreadId, Checkpoint>>,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned())
    }

    async fn save(
        &self,
        thread_id: &ThreadId,
        state: &ConversationState,
    ) -> Result<u64, CheckpointError> {
        let mut threads = self.threads.write().await;
        let version = threads.get(thread_id).map(|c| c.version + 1).unwrap_or(1);
        threads.insert(
            thread_id.clone(),
            Checkpoint::new(thread_id.clone(), state.clone(), version),
        );
        Ok(version)
    }

    async fn reset(&self, thread_id: &ThreadId) -> Result<(), CheckpointError> {
        let mut threads = self.threads.write().await;
        threads.remove(thread_id);
        Ok(())
    }
}
