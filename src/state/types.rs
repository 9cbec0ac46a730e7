//! Resume checkpoint types
//!
//! The checkpoint is serialized to JSON and persisted between runs.

use crate::types::{RecordId, SyncTarget, SyncTargetKind};
use serde::{Deserialize, Serialize};

/// Cursor value meaning "start from the newest record".
///
/// Record identities are strictly positive, so 0 never collides with a
/// real record.
pub const RESUME_SENTINEL: RecordId = 0;

/// Persisted sync position for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCheckpoint {
    /// Identity of the oldest record handled by the last committed page,
    /// or [`RESUME_SENTINEL`]
    pub last_processed_id: RecordId,

    /// Identity of the archived target
    pub target_id: i64,

    /// Display name of the archived target
    pub target_name: String,

    /// Discriminant tag of the archived target ("user", "chat", "channel")
    pub target_kind: String,

    /// Protocol version the checkpoint was written under
    pub protocol_version: u32,
}

impl ResumeCheckpoint {
    /// Create a checkpoint for a target
    pub fn new(target: &SyncTarget, last_processed_id: RecordId, protocol_version: u32) -> Self {
        Self {
            last_processed_id,
            target_id: target.id(),
            target_name: target.name.clone(),
            target_kind: target.kind.tag().to_string(),
            protocol_version,
        }
    }

    /// Whether the checkpoint holds the "start from newest" sentinel
    pub fn is_at_beginning(&self) -> bool {
        self.last_processed_id == RESUME_SENTINEL
    }

    /// Rebuild the target this checkpoint belongs to
    pub fn target(&self) -> Option<SyncTarget> {
        SyncTargetKind::from_tag(&self.target_kind, self.target_id)
            .map(|kind| SyncTarget::new(kind, self.target_name.clone()))
    }
}

/// How far a target has been synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    /// No checkpoint: first-ever run
    Fresh,
    /// Sentinel checkpoint: everything below the stored range is archived,
    /// only records newer than the stored ones may be missing
    TailComplete,
    /// A run stopped part-way; older history below this identity is pending
    Partial(RecordId),
}

impl ResumeState {
    /// Classify a loaded checkpoint
    pub fn from_checkpoint(checkpoint: Option<&ResumeCheckpoint>) -> Self {
        match checkpoint {
            None => Self::Fresh,
            Some(cp) if cp.is_at_beginning() => Self::TailComplete,
            Some(cp) => Self::Partial(cp.last_processed_id),
        }
    }

    /// Whether the next run starts from the newest record
    pub fn starts_at_beginning(&self) -> bool {
        !matches!(self, Self::Partial(_))
    }

    /// Cursor the next run starts from
    pub fn cursor(&self) -> RecordId {
        match self {
            Self::Partial(id) => *id,
            Self::Fresh | Self::TailComplete => RESUME_SENTINEL,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh => "never synchronized",
            Self::TailComplete => "fully synchronized",
            Self::Partial(_) => "partially synchronized",
        }
    }
}
