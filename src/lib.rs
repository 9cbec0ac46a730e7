// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Chat Archiver
//!
//! Resumable local backups of remote conversation history.
//!
//! ## Features
//!
//! - **Resumable sync**: Page through history newest to oldest, checkpointing
//!   after every committed page; an interrupted run resumes where it stopped
//!   and a later run fills the gap of records that arrived in between
//! - **Media retrieval**: Download photos, documents and profile photos,
//!   skipping files already on disk
//! - **HTML export**: One page per calendar day with navigation between
//!   non-empty days and reply links across days
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chat_archiver::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let layout = BackupLayout::new("backups", 1234);
//!     layout.ensure()?;
//!
//!     let store = Arc::new(DuckDbStore::open(layout.database_path())?);
//!     let remote = Arc::new(HttpFetcher::from_config(
//!         HttpClientConfig::builder().base_url("https://gateway.example.com").build(),
//!     )?);
//!     let checkpoints = Arc::new(ResumeStateManager::new(layout.metadata_path(), 1));
//!
//!     let target = SyncTarget::new(SyncTargetKind::Chat { chat_id: 1234 }, "Book club");
//!     let mut engine = SyncEngine::new(store, remote, checkpoints);
//!     engine.run(&target, None, &CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   pages    ┌────────────┐  records   ┌─────────────┐
//! │ RemoteFetcher├───────────►│ SyncEngine ├───────────►│ RecordStore │
//! └──────┬───────┘            └─────┬──────┘            └──────┬──────┘
//!        │ blobs                    │ checkpoint               │ scans
//!        ▼                          ▼                          ▼
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │MediaRetriever│          │ResumeState   │          │   Exporter   │
//! └──────────────┘          │Manager       │          └──────────────┘
//!                           └──────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the archiver
pub mod error;

/// Common types and type aliases
pub mod types;

/// YAML configuration
pub mod config;

/// Per-target directory layout
pub mod layout;

/// Resume checkpoints
pub mod state;

/// Record store backends
pub mod store;

/// Remote history gateway
pub mod remote;

/// History sync engine
pub mod engine;

/// Media retrieval
pub mod media;

/// Day-bucketed HTML export
pub mod export;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

/// Commonly used types
pub mod prelude {
    pub use crate::config::ArchiverConfig;
    pub use crate::engine::{SyncConfig, SyncEngine, SyncEvent, SyncOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::export::Exporter;
    pub use crate::layout::BackupLayout;
    pub use crate::media::{MediaRetriever, MediaSelection};
    pub use crate::remote::{HttpClientConfig, HttpFetcher, RemoteFetcher};
    pub use crate::state::{CheckpointStore, ResumeStateManager};
    pub use crate::store::{DuckDbStore, RecordStore};
    pub use crate::types::{SyncTarget, SyncTargetKind};
    pub use tokio_util::sync::CancellationToken;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
