//! Resume state manager implementation
//!
//! Provides file-based checkpoint persistence with atomic writes.

use super::types::ResumeCheckpoint;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Storage for a single target's resume checkpoint
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, `None` if there never was a sync
    async fn load(&self) -> Result<Option<ResumeCheckpoint>>;

    /// Replace the checkpoint. Either the old or the new value is
    /// observable after a crash.
    async fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()>;

    /// Forget the checkpoint
    async fn clear(&self) -> Result<()>;

    /// Protocol version new checkpoints are written under
    fn protocol_version(&self) -> u32;
}

/// Resume state manager for persisting and loading checkpoints
#[derive(Debug)]
pub struct ResumeStateManager {
    /// Path to the checkpoint file (empty for in-memory)
    path: PathBuf,
    /// Protocol version the engine writes checkpoints under; a loaded
    /// checkpoint with another version is only logged
    protocol_version: u32,
    /// Last loaded or saved checkpoint (cached)
    cached: Arc<RwLock<Option<ResumeCheckpoint>>>,
}

impl ResumeStateManager {
    /// Create a new manager backed by the given file
    pub fn new(path: impl AsRef<Path>, protocol_version: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            protocol_version,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Create an in-memory manager (no file persistence)
    pub fn in_memory(protocol_version: u32) -> Self {
        Self {
            path: PathBuf::new(),
            protocol_version,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Last checkpoint seen by this manager, without touching disk
    pub async fn cached(&self) -> Option<ResumeCheckpoint> {
        self.cached.read().await.clone()
    }

    async fn read_file(&self) -> Result<Option<ResumeCheckpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to read checkpoint file: {e}"),
            })?;

        let checkpoint: ResumeCheckpoint =
            serde_json::from_str(&contents).map_err(|e| Error::State {
                message: format!("Failed to parse checkpoint file: {e}"),
            })?;

        Ok(Some(checkpoint))
    }

    async fn write_file(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        let contents = serde_json::to_string_pretty(checkpoint).map_err(|e| Error::Checkpoint {
            message: format!("Failed to serialize checkpoint: {e}"),
        })?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Checkpoint {
                message: format!("Failed to create checkpoint file: {e}"),
            })?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| Error::Checkpoint {
                message: format!("Failed to write checkpoint file: {e}"),
            })?;
        file.sync_all().await.map_err(|e| Error::Checkpoint {
            message: format!("Failed to flush checkpoint file: {e}"),
        })?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::Checkpoint {
                message: format!("Failed to rename checkpoint file: {e}"),
            })?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for ResumeStateManager {
    async fn load(&self) -> Result<Option<ResumeCheckpoint>> {
        let loaded = if self.is_in_memory() {
            self.cached.read().await.clone()
        } else {
            self.read_file().await?
        };

        if let Some(cp) = &loaded {
            // The store is self-consistent, a different version never blocks resume
            if cp.protocol_version != self.protocol_version {
                debug!(
                    saved = cp.protocol_version,
                    current = self.protocol_version,
                    "Checkpoint written under a different protocol version"
                );
            }
        }

        *self.cached.write().await = loaded.clone();
        Ok(loaded)
    }

    async fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        if !self.is_in_memory() {
            self.write_file(checkpoint).await?;
        }
        *self.cached.write().await = Some(checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if !self.is_in_memory() && self.path.exists() {
            tokio::fs::remove_file(&self.path)
                .await
                .map_err(|e| Error::State {
                    message: format!("Failed to remove checkpoint file: {e}"),
                })?;
        }
        *self.cached.write().await = None;
        Ok(())
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

impl Clone for ResumeStateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            protocol_version: self.protocol_version,
            cached: Arc::clone(&self.cached),
        }
    }
}
