//! Export module
//!
//! Renders a stored backup as browsable HTML, one unit per calendar day:
//!
//! ```text
//! <output_dir>/<name>/<year>/<month>/<day>.html
//! ```
//!
//! Records are streamed in ascending identity order and bucketed by day.
//! Every unit links to the nearest non-empty days around it, so navigation
//! skips days without records. Replies link into whichever unit holds the
//! replied-to record.
//!
//! Export is not incremental: each run overwrites the units it produces.

mod types;
mod writer;

pub use types::{
    calculate_etl, sanitize_name, DayLinks, ExportPaths, ExportProgress, ExportSummary,
    OutputUnit,
};
pub use writer::DayWriter;

use crate::error::Result;
use crate::store::{RecordFilter, RecordScan, RecordStore, ScanOrder};
use crate::types::{Author, AuthorId, Record};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exports one target's record store to day units
pub struct Exporter {
    store: Arc<dyn RecordStore>,
    output_dir: PathBuf,
    media_root: Option<PathBuf>,
}

/// The unit currently receiving records; `writer` is gone once it failed
struct OpenUnit {
    day: NaiveDate,
    writer: Option<DayWriter>,
}

impl Exporter {
    pub fn new(store: Arc<dyn RecordStore>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            media_root: None,
        }
    }

    /// Link media attachments to files under this directory
    #[must_use]
    pub fn with_media_root(mut self, media_root: impl Into<PathBuf>) -> Self {
        self.media_root = Some(media_root.into());
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths of the units exported under `name`
    pub fn paths(&self, name: &str) -> ExportPaths {
        let paths = ExportPaths::new(&self.output_dir, name);
        match &self.media_root {
            Some(root) => paths.with_media_root(root),
            None => paths,
        }
    }

    /// Run the export on the blocking pool
    pub fn spawn(
        self,
        name: String,
        events: Option<UnboundedSender<ExportProgress>>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<ExportSummary>> {
        tokio::task::spawn_blocking(move || self.export(&name, events.as_ref(), &cancel))
    }

    /// Export every stored record.
    ///
    /// Blocks on store reads and file writes. A unit that fails to write is
    /// skipped and listed in the summary; store failures end the export.
    pub fn export(
        &self,
        name: &str,
        events: Option<&UnboundedSender<ExportProgress>>,
        cancel: &CancellationToken,
    ) -> Result<ExportSummary> {
        let started = Instant::now();
        let paths = self.paths(name);
        let total = self.store.count(RecordFilter::All)?;
        info!(target_name = name, total, output = %paths.root().display(), "Starting export");

        let mut summary = ExportSummary {
            total,
            ..ExportSummary::default()
        };
        let mut authors: HashMap<AuthorId, Option<Author>> = HashMap::new();
        let mut current: Option<OpenUnit> = None;

        for record in RecordScan::new(self.store.as_ref(), RecordFilter::All, ScanOrder::Ascending) {
            let record = record?;
            if cancel.is_cancelled() {
                info!(target_name = name, exported = summary.exported, "Export cancelled");
                summary.cancelled = true;
                break;
            }
            summary.exported += 1;

            let day = record.day();
            if current.as_ref().map(|unit| unit.day) != Some(day) {
                let switching = current.is_some();
                if let Some(unit) = current.take() {
                    close(unit, &mut summary);
                }
                current = Some(self.open(&paths, name, day, &mut summary)?);

                if switching {
                    emit(
                        events,
                        ExportProgress {
                            exported: summary.exported,
                            total,
                            etl: calculate_etl(started.elapsed(), summary.exported, total),
                        },
                    );
                }
            }

            if let Some(unit) = current.as_mut() {
                self.write(unit, &paths, &record, &mut authors, &mut summary)?;
            }
        }

        if let Some(unit) = current.take() {
            close(unit, &mut summary);
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        emit(
            events,
            ExportProgress {
                exported: summary.exported,
                total,
                etl: Duration::ZERO,
            },
        );
        info!(
            target_name = name,
            units = summary.units.len(),
            failed = summary.failed_units.len(),
            duration_ms = summary.duration_ms,
            "Export finished"
        );
        Ok(summary)
    }

    fn links(&self, day: NaiveDate) -> Result<DayLinks> {
        let previous = self.store.nearest_before(day)?.map(|r| r.day());
        let following = match day.succ_opt() {
            Some(next) => self.store.nearest_at_or_after(next)?.map(|r| r.day()),
            None => None,
        };
        Ok(DayLinks {
            previous,
            following,
        })
    }

    fn open(
        &self,
        paths: &ExportPaths,
        name: &str,
        day: NaiveDate,
        summary: &mut ExportSummary,
    ) -> Result<OpenUnit> {
        let links = self.links(day)?;
        debug!(%day, ?links, "Opening day unit");

        let writer = match DayWriter::create(paths, name, day, links) {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!(%day, "Skipping day unit: {e}");
                summary.failed_units.push(day);
                None
            }
        };
        Ok(OpenUnit { day, writer })
    }

    fn write(
        &self,
        unit: &mut OpenUnit,
        paths: &ExportPaths,
        record: &Record,
        authors: &mut HashMap<AuthorId, Option<Author>>,
        summary: &mut ExportSummary,
    ) -> Result<()> {
        let Some(writer) = unit.writer.as_mut() else {
            return Ok(());
        };

        let author = match record.author_id {
            Some(id) => {
                if !authors.contains_key(&id) {
                    authors.insert(id, self.store.author(id)?);
                }
                authors.get(&id).and_then(Option::as_ref)
            }
            None => None,
        };
        let reply_day = match record.reply_to {
            Some(id) => self.store.get(id)?.map(|target| target.day()),
            None => None,
        };

        if let Err(e) = writer.write_record(paths, record, author, reply_day) {
            warn!(day = %unit.day, record_id = record.id, "Skipping rest of day unit: {e}");
            summary.failed_units.push(unit.day);
            unit.writer = None;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("output_dir", &self.output_dir)
            .field("media_root", &self.media_root)
            .finish_non_exhaustive()
    }
}

fn close(unit: OpenUnit, summary: &mut ExportSummary) {
    let Some(writer) = unit.writer else {
        return;
    };
    match writer.finish() {
        Ok(output) => summary.units.push(output),
        Err(e) => {
            warn!(day = %unit.day, "Failed to finish day unit: {e}");
            summary.failed_units.push(unit.day);
        }
    }
}

fn emit(events: Option<&UnboundedSender<ExportProgress>>, progress: ExportProgress) {
    if let Some(tx) = events {
        let _ = tx.send(progress);
    }
}
