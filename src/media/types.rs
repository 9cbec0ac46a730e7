//! Media retrieval types

use crate::types::MediaKind;
use std::fmt;

/// Fixed media subdirectories of a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaCategory {
    ProfilePhotos,
    Photos,
    Documents,
    /// Materialized on disk, nothing downloads into it
    Stickers,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 4] = [
        Self::ProfilePhotos,
        Self::Photos,
        Self::Documents,
        Self::Stickers,
    ];

    /// Directory name under `<target>/media/`
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::ProfilePhotos => "profile_photos",
            Self::Photos => "photos",
            Self::Documents => "documents",
            Self::Stickers => "stickers",
        }
    }

    /// Media kind whose blobs land in this category
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::ProfilePhotos => Some(MediaKind::ProfilePhoto),
            Self::Photos => Some(MediaKind::Photo),
            Self::Documents => Some(MediaKind::Document),
            Self::Stickers => None,
        }
    }

    /// Category whose directory holds blobs of this kind
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::ProfilePhoto => Self::ProfilePhotos,
            MediaKind::Photo => Self::Photos,
            MediaKind::Document => Self::Documents,
        }
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProfilePhotos => "profile photos",
            Self::Photos => "photos",
            Self::Documents => "documents",
            Self::Stickers => "stickers",
        })
    }
}

/// Which categories a retrieval run downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaSelection {
    pub profile_photos: bool,
    pub photos: bool,
    pub documents: bool,
}

impl Default for MediaSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl MediaSelection {
    pub fn all() -> Self {
        Self {
            profile_photos: true,
            photos: true,
            documents: true,
        }
    }

    pub fn none() -> Self {
        Self {
            profile_photos: false,
            photos: false,
            documents: false,
        }
    }

    /// Selected categories, in download order
    pub fn categories(&self) -> Vec<MediaCategory> {
        [
            (self.profile_photos, MediaCategory::ProfilePhotos),
            (self.photos, MediaCategory::Photos),
            (self.documents, MediaCategory::Documents),
        ]
        .into_iter()
        .filter_map(|(selected, category)| selected.then_some(category))
        .collect()
    }
}

/// Result of one download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    /// Fetched and written
    Downloaded,
    /// File already present, nothing fetched
    Skipped,
    /// Fetch or write failed; the item is retried on the next run
    Failed(String),
}

impl MediaOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Progress event sent after every attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProgress {
    pub category: MediaCategory,
    /// 1-based position within the category
    pub index: usize,
    pub total: usize,
    /// Blob the attempt was for
    pub blob_id: i64,
    pub outcome: MediaOutcome,
}

/// Per-category counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryReport {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CategoryReport {
    pub fn record(&mut self, outcome: &MediaOutcome) {
        match outcome {
            MediaOutcome::Downloaded => self.downloaded += 1,
            MediaOutcome::Skipped => self.skipped += 1,
            MediaOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }

    pub fn succeeded(&self) -> usize {
        self.downloaded + self.skipped
    }
}

/// Summary of a retrieval run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaReport {
    /// Counters per processed category, in processing order
    pub categories: Vec<(MediaCategory, CategoryReport)>,
    /// The run stopped early on request
    pub cancelled: bool,
}

impl MediaReport {
    pub fn category(&self, category: MediaCategory) -> Option<&CategoryReport> {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, report)| report)
    }

    pub fn attempted(&self) -> usize {
        self.categories.iter().map(|(_, r)| r.attempted()).sum()
    }

    pub fn failed(&self) -> usize {
        self.categories.iter().map(|(_, r)| r.failed).sum()
    }

    pub fn fetched(&self) -> usize {
        self.categories.iter().map(|(_, r)| r.downloaded).sum()
    }

    /// Share of attempted items that succeeded; 1.0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        let attempted = self.attempted();
        if attempted == 0 {
            return 1.0;
        }
        (attempted - self.failed()) as f64 / attempted as f64
    }
}
