//! On-disk layout of a target's backup
//!
//! ```text
//! <backups_dir>/<target_id>/
//!     backup.duckdb      record store
//!     metadata.json      resume checkpoint
//!     media/
//!         profile_photos/ photos/ documents/ stickers/
//! ```

use crate::error::{Error, Result};
use crate::media::MediaCategory;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "backup.duckdb";
const METADATA_FILE: &str = "metadata.json";
const MEDIA_DIR: &str = "media";

/// Paths of a single target's backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    root: PathBuf,
}

impl BackupLayout {
    /// Layout for a target under the given backups directory
    pub fn new(backups_dir: impl AsRef<Path>, target_id: i64) -> Self {
        Self {
            root: backups_dir.as_ref().join(target_id.to_string()),
        }
    }

    /// The target's backup directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether anything has been backed up for this target
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the target's backup directory
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            Error::store(format!(
                "Failed to create backup directory {}: {e}",
                self.root.display()
            ))
        })
    }

    /// Record store file
    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    /// Resume checkpoint file
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Directory for one media category
    pub fn media_dir(&self, category: MediaCategory) -> PathBuf {
        self.root.join(MEDIA_DIR).join(category.dir_name())
    }

    /// Create every media category directory
    pub fn create_media_dirs(&self) -> Result<Vec<PathBuf>> {
        MediaCategory::ALL
            .iter()
            .map(|category| -> Result<PathBuf> {
                let dir = self.media_dir(*category);
                std::fs::create_dir_all(&dir)?;
                Ok(dir)
            })
            .collect()
    }

    /// Remove the whole backup for this target
    pub fn delete(&self) -> Result<()> {
        if self.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
