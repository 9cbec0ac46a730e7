//! Sync engine module
//!
//! Mirrors a remote newest-to-oldest history into a record store.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - The fetch, reconcile, persist loop
//! - `SyncPhase` - Two-phase backfill state machine
//! - `SyncConfig` - Page size and inter-page delay
//! - `SyncEvent` - Phase changes, progress and the final outcome
//!
//! # Algorithm
//!
//! A run first drains the tail: pages older than the resume cursor until a
//! page brings nothing new. A run that resumed from the middle of history
//! then fills the gap: it restarts from the newest record and walks down
//! until it meets what is already stored. Each page is committed to the
//! record store before the checkpoint is written, so the checkpoint never
//! points past stored data.

mod types;

pub use types::{
    calculate_eta, SyncConfig, SyncEvent, SyncOutcome, SyncPhase, SyncProgress, SyncStats,
};

use crate::error::Result;
use crate::remote::{HistoryPage, RemoteFetcher};
use crate::state::{CheckpointStore, ResumeCheckpoint, ResumeState, RESUME_SENTINEL};
use crate::store::{RecordFilter, RecordStore};
use crate::types::{Record, SyncTarget};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What to do after a committed page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Continue,
    FillGap,
    Complete,
}

/// Sync engine for one target at a time
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteFetcher>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: SyncConfig,
    phase: SyncPhase,
    stats: SyncStats,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteFetcher>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            store,
            remote,
            checkpoints,
            config: SyncConfig::default(),
            phase: SyncPhase::Initial,
            stats: SyncStats::default(),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Phase reached by the last run
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Statistics of the last run
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Synchronize `target` until complete, cancelled or failed.
    ///
    /// The caller must not run two engines for the same target at once.
    pub async fn run(
        &mut self,
        target: &SyncTarget,
        events: Option<&UnboundedSender<SyncEvent>>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let start = Instant::now();
        self.stats = SyncStats::new();
        self.phase = SyncPhase::Initial;

        let result = self.drive(target, events, cancel).await;
        self.stats.set_duration(start.elapsed());

        match &result {
            Ok(outcome) => {
                info!(
                    target_id = target.id(),
                    ?outcome,
                    pages = self.stats.pages_fetched,
                    inserted = self.stats.records_inserted,
                    duration_ms = self.stats.duration_ms,
                    "Sync finished"
                );
                emit(events, SyncEvent::Finished(*outcome));
            }
            Err(e) => error!(target_id = target.id(), phase = %self.phase, "Sync failed: {e}"),
        }
        result
    }

    async fn drive(
        &mut self,
        target: &SyncTarget,
        events: Option<&UnboundedSender<SyncEvent>>,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome> {
        let checkpoint = self.checkpoints.load().await?;
        let resume = ResumeState::from_checkpoint(checkpoint.as_ref());

        let mut started_at_beginning = resume.starts_at_beginning();
        let mut cursor = resume.cursor();
        // A resumed run may find its first page already stored when the last
        // checkpoint write was lost after the page commit
        let mut may_skip_lagged_page = !started_at_beginning;
        let mut downloaded = self.store.count(RecordFilter::All)?;
        let mut total: Option<usize> = None;

        info!(
            target_id = target.id(),
            resume = resume.label(),
            cursor,
            stored = downloaded,
            "Starting sync"
        );
        self.enter(SyncPhase::DrainingTail, events);

        loop {
            let page = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(target_id = target.id(), cursor, "Sync cancelled while fetching");
                    return Ok(SyncOutcome::Cancelled);
                }
                page = self.remote.fetch_page(target, cursor, self.config.chunk_size) => page?,
            };
            self.stats.add_page();

            total = match (page.total_count, total) {
                (Some(reported), _) => Some(reported),
                (None, Some(known)) => Some(known),
                (None, None) => Some(page.records.len()),
            };

            if !page.authors.is_empty() {
                let written = self.store.upsert_authors(&page.authors)?;
                self.stats.add_authors(written);
            }

            let lagged = may_skip_lagged_page && self.fully_stored(&page)?;
            may_skip_lagged_page = false;

            let (fresh, overlapped): (&[Record], bool) = if lagged {
                warn!(
                    target_id = target.id(),
                    cursor,
                    "First page after resume is already stored, skipping past it"
                );
                (&[], true)
            } else {
                let (fresh_len, overlapped) = self.split_at_overlap(&page.records)?;
                (&page.records[..fresh_len], overlapped)
            };

            let inserted = self.store.insert_records(fresh)?;
            downloaded += inserted;
            self.stats.add_records(inserted);

            let next_cursor = if lagged {
                page.records.last().map_or(cursor, |r| r.id)
            } else {
                fresh.last().map_or(cursor, |r| r.id)
            };

            let step = if lagged || (!fresh.is_empty() && !overlapped) {
                Step::Continue
            } else if started_at_beginning {
                Step::Complete
            } else {
                Step::FillGap
            };

            let saved_id = match step {
                Step::Continue => next_cursor,
                Step::FillGap | Step::Complete => RESUME_SENTINEL,
            };
            let checkpoint =
                ResumeCheckpoint::new(target, saved_id, self.checkpoints.protocol_version());
            self.checkpoints.save(&checkpoint).await?;
            debug!(
                target_id = target.id(),
                phase = %self.phase,
                fetched = page.records.len(),
                inserted,
                checkpoint = saved_id,
                "Committed page"
            );

            if inserted > 0 {
                let total = total.unwrap_or(downloaded);
                emit(
                    events,
                    SyncEvent::Progress(SyncProgress {
                        downloaded,
                        total,
                        eta: calculate_eta(
                            total.saturating_sub(downloaded),
                            self.config.chunk_size,
                            self.config.page_delay,
                        ),
                        phase: self.phase,
                    }),
                );
            }

            match step {
                Step::Continue => cursor = next_cursor,
                Step::FillGap => {
                    cursor = RESUME_SENTINEL;
                    started_at_beginning = true;
                    self.enter(SyncPhase::FillingGap, events);
                }
                Step::Complete => {
                    info!(target_id = target.id(), total = downloaded, "Downloaded all messages");
                    self.enter(SyncPhase::Complete, events);
                    return Ok(SyncOutcome::Completed);
                }
            }

            if cancel.is_cancelled() {
                info!(target_id = target.id(), cursor, "Sync cancelled after commit");
                return Ok(SyncOutcome::Cancelled);
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(target_id = target.id(), cursor, "Sync cancelled during page delay");
                    return Ok(SyncOutcome::Cancelled);
                }
                () = tokio::time::sleep(self.config.page_delay) => {}
            }
        }
    }

    /// Length of the leading run of records not yet stored, and whether a
    /// stored record ended it
    fn split_at_overlap(&self, records: &[Record]) -> Result<(usize, bool)> {
        for (index, record) in records.iter().enumerate() {
            if self.store.exists(record.id)? {
                debug!(id = record.id, "Reached already stored record");
                return Ok((index, true));
            }
        }
        Ok((records.len(), false))
    }

    fn fully_stored(&self, page: &HistoryPage) -> Result<bool> {
        if page.records.is_empty() {
            return Ok(false);
        }
        for record in &page.records {
            if !self.store.exists(record.id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn enter(&mut self, phase: SyncPhase, events: Option<&UnboundedSender<SyncEvent>>) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Sync phase changed");
            self.phase = phase;
            emit(events, SyncEvent::PhaseChanged(phase));
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn emit(events: Option<&UnboundedSender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is watching
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests;
