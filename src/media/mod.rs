//! Media retrieval module
//!
//! Downloads photos, documents and profile photos referenced by a stored
//! backup into `<target>/media/<category>/<blob_id><ext>`.
//!
//! A file that already exists is never fetched again, so re-running
//! retrieval resumes where the last run stopped. Failed items are reported
//! and skipped.

mod retriever;
mod types;

pub use retriever::MediaRetriever;
pub use types::{
    CategoryReport, MediaCategory, MediaOutcome, MediaProgress, MediaReport, MediaSelection,
};

#[cfg(test)]
mod tests;
