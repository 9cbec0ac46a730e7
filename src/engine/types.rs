//! Engine types
//!
//! Phases, configuration, events and statistics for the sync engine.

use std::fmt;
use std::time::Duration;

/// Backfill state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Not started yet
    #[default]
    Initial,
    /// Walking older history below the resume cursor
    DrainingTail,
    /// Second pass from the newest record down to the previously stored range
    FillingGap,
    /// Everything is archived
    Complete,
}

impl SyncPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::DrainingTail => "draining_tail",
            Self::FillingGap => "filling_gap",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Configuration for sync operation
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per page
    pub chunk_size: usize,
    /// Pause after every page
    pub page_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            page_delay: Duration::from_secs(1),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set page size (at least one)
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set inter-page delay
    #[must_use]
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }
}

/// Progress snapshot emitted after every page that stored new records
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    /// Records in the store, including earlier runs
    pub downloaded: usize,
    /// Remote history size (authoritative or first-page estimate)
    pub total: usize,
    /// Estimated time until the tail is drained
    pub eta: Duration,
    pub phase: SyncPhase,
}

impl SyncProgress {
    /// Completed fraction in `0.0..=1.0`; an unknown total counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.downloaded as f64 / self.total as f64).min(1.0)
    }
}

/// How a run ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Reached [`SyncPhase::Complete`]
    Completed,
    /// Stopped on request after the last committed page
    Cancelled,
}

/// Event stream of a sync run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    PhaseChanged(SyncPhase),
    Progress(SyncProgress),
    Finished(SyncOutcome),
}

/// Statistics from a sync run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Pages fetched from the remote
    pub pages_fetched: usize,
    /// Records newly inserted by this run
    pub records_inserted: usize,
    /// Author rows written
    pub authors_upserted: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&mut self) {
        self.pages_fetched += 1;
    }

    pub fn add_records(&mut self, count: usize) {
        self.records_inserted += count;
    }

    pub fn add_authors(&mut self, count: usize) {
        self.authors_upserted += count;
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as u64;
    }
}

/// `ceil(remaining / chunk_size) * page_delay`
pub fn calculate_eta(remaining: usize, chunk_size: usize, page_delay: Duration) -> Duration {
    let chunks = remaining.div_ceil(chunk_size.max(1));
    page_delay.saturating_mul(u32::try_from(chunks).unwrap_or(u32::MAX))
}
