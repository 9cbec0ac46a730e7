//! Resume state module
//!
//! Persists the position a sync run reached so the next run can resume.
//!
//! # Overview
//!
//! The state module provides:
//! - `ResumeCheckpoint` - Last processed record identity plus target metadata
//! - `ResumeState` - Fresh / fully / partially synchronized classification
//! - `CheckpointStore` - Seam the sync engine writes checkpoints through
//! - `ResumeStateManager` - File-based checkpoint persistence with atomic writes

mod manager;
mod types;

pub use manager::{CheckpointStore, ResumeStateManager};
pub use types::{ResumeCheckpoint, ResumeState, RESUME_SENTINEL};
