//! Export types

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use crate::media::MediaCategory;
use crate::types::{MediaDescriptor, RecordId};

/// Characters that cannot appear in a directory name on common filesystems
static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).unwrap());

/// Turn a target's display name into a single safe path component
pub fn sanitize_name(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(name, "_");
    let cleaned = cleaned.trim().trim_matches('.');
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Estimated time left, extrapolated from the average time per exported record
pub fn calculate_etl(elapsed: Duration, exported: usize, total: usize) -> Duration {
    if exported == 0 {
        return Duration::ZERO;
    }
    let per_record = elapsed.as_secs_f64() / exported as f64;
    Duration::from_secs_f64(per_record * total.saturating_sub(exported) as f64)
}

// ============================================================================
// Paths
// ============================================================================

/// Where the units of one export live and how they refer to each other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    root: PathBuf,
    media_root: Option<PathBuf>,
}

impl ExportPaths {
    /// Paths for `<output_dir>/<sanitized name>/`
    pub fn new(output_dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            root: output_dir.as_ref().join(sanitize_name(name)),
            media_root: None,
        }
    }

    /// Point media references at a backup's `media/` directory
    #[must_use]
    pub fn with_media_root(mut self, media_root: impl Into<PathBuf>) -> Self {
        self.media_root = Some(media_root.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<year>/<month>/<day>.html`, month and day not zero-padded
    pub fn unit_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(day.year().to_string())
            .join(day.month().to_string())
            .join(format!("{}.html", day.day()))
    }

    /// Link from any unit to another unit, optionally to one record in it
    pub fn link(day: NaiveDate, record: Option<RecordId>) -> String {
        let page = format!("../../{}/{}/{}.html", day.year(), day.month(), day.day());
        match record {
            Some(id) => format!("{page}#message-{id}"),
            None => page,
        }
    }

    /// Reference to a downloaded blob, if a media root is known
    pub fn media_href(&self, media: &MediaDescriptor) -> Option<String> {
        let root = self.media_root.as_ref()?;
        let path = root
            .join(MediaCategory::for_kind(media.kind).dir_name())
            .join(media.file_name());
        Some(path.display().to_string())
    }
}

// ============================================================================
// Units and Progress
// ============================================================================

/// Nearest non-empty days around a unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayLinks {
    pub previous: Option<NaiveDate>,
    pub following: Option<NaiveDate>,
}

/// One written day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    pub day: NaiveDate,
    pub path: PathBuf,
    pub links: DayLinks,
    pub records: usize,
}

/// Sent on every day switch and once at the end with `etl` zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub exported: usize,
    pub total: usize,
    pub etl: Duration,
}

/// Result of an export run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Units written completely, in day order
    pub units: Vec<OutputUnit>,
    /// Days whose unit could not be written
    pub failed_units: Vec<NaiveDate>,
    /// Records visited
    pub exported: usize,
    pub total: usize,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ExportSummary {
    pub fn unit(&self, day: NaiveDate) -> Option<&OutputUnit> {
        self.units.iter().find(|unit| unit.day == day)
    }

    pub fn is_clean(&self) -> bool {
        self.failed_units.is_empty() && !self.cancelled
    }
}
