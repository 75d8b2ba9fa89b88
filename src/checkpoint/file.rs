//! File-based checkpoint store
//!
//! Stores one JSON file per thread, optionally zstd-compressed. Writes go
//! through a temporary file followed by a rename, so a concurrent reader
//! sees either the previous checkpoint or the new one. Thread ids are
//! percent-encoded to keep arbitrary identifiers file-safe. Loads probe
//! both extensions, so the compression setting can change between store
//! instances without stranding existing checkpoints.
//!
//! # Directory layout
//!
//! ```text
//! checkpoints/
//! ├── user-42.json[.zst]
//! ├── session%2F7f3a.json[.zst]
//! └── ...
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{Checkpoint, CheckpointError, CheckpointStore, ThreadId};
use crate::state::ConversationState;

/// zstd level used when compression is enabled
const COMPRESSION_LEVEL: i32 = 3;

/// Checkpoint store backed by one file per thread
#[derive(Debug)]
pub struct FileCheckpointStore {
    /// Directory holding the per-thread files
    root: PathBuf,
    /// Whether to compress checkpoint data with zstd
    compression: bool,
}

impl FileCheckpointStore {
    /// Store checkpoints under `root`; the directory is created on first save
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: false,
        }
    }

    /// Enable zstd compression for stored checkpoints
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// File path for a thread's checkpoint with the given encoding
    fn checkpoint_path(&self, thread_id: &ThreadId, compressed: bool) -> PathBuf {
        let name = urlencoding::encode(thread_id.as_str());
        let filename = if compressed {
            format!("{}.json.zst", name)
        } else {
            format!("{}.json", name)
        };
        self.root.join(filename)
    }

    /// Unique temporary path for an in-flight write
    fn temp_path(&self) -> PathBuf {
        self.root.join(format!(".{}.tmp", uuid::Uuid::new_v4()))
    }

    /// Compress data using zstd
    fn compress(data: &[u8]) -> Result<Vec<u8>, CheckpointError> {
        zstd::stream::encode_all(data, COMPRESSION_LEVEL).map_err(CheckpointError::storage)
    }

    /// Decompress data using zstd
    fn decompress(data: &[u8]) -> Result<Vec<u8>, CheckpointError> {
        zstd::stream::decode_all(data).map_err(CheckpointError::storage)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>, CheckpointError> {
        // Probe the configured extension first, then the other one, so a
        // store reopened with a different compression setting still finds
        // checkpoints written before the flip. The file's own extension
        // decides how it is decoded.
        for compressed in [self.compression, !self.compression] {
            let path = self.checkpoint_path(thread_id, compressed);

            let data = match fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CheckpointError::storage(e)),
            };

            let json = if compressed {
                Self::decompress(&data)?
            } else {
                data
            };

            return Ok(Some(serde_json::from_slice(&json)?));
        }

        Ok(None)
    }

    async fn save(
        &self,
        thread_id: &ThreadId,
        state: &ConversationState,
    ) -> Result<u64, CheckpointError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(CheckpointError::storage)?;

        let version = match self.load(thread_id).await? {
            Some(previous) => previous.version + 1,
            None => 1,
        };
        let checkpoint = Checkpoint::new(thread_id.clone(), state.clone(), version);

        let json = serde_json::to_vec_pretty(&checkpoint)?;
        let data = if self.compression {
            Self::compress(&json)?
        } else {
            json
        };

        // Write to a temp file first, then rename into place
        let temp_path = self.temp_path();
        let final_path = self.checkpoint_path(thread_id, self.compression);

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(CheckpointError::storage)?;
        file.write_all(&data).await.map_err(CheckpointError::storage)?;
        file.sync_all().await.map_err(CheckpointError::storage)?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CheckpointError::storage(e));
        }

        // Drop the other-extension file, if any, so the thread keeps exactly
        // one checkpoint after a compression-setting flip
        match fs::remove_file(self.checkpoint_path(thread_id, !self.compression)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CheckpointError::storage(e)),
        }

        Ok(version)
    }

    async fn reset(&self, thread_id: &ThreadId) -> Result<(), CheckpointError> {
        for compressed in [false, true] {
            match fs::remove_file(self.checkpoint_path(thread_id, compressed)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CheckpointError::storage(e)),
            }
        }
        Ok(())
    }
}
