//! Media retriever implementation

use super::types::{
    CategoryReport, MediaCategory, MediaOutcome, MediaProgress, MediaReport, MediaSelection,
};
use crate::error::Result;
use crate::layout::BackupLayout;
use crate::remote::{RateLimiter, RateLimiterConfig, RemoteFetcher};
use crate::store::{RecordFilter, RecordScan, RecordStore, ScanOrder};
use crate::types::MediaDescriptor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Descriptors<'a> = Box<dyn Iterator<Item = Result<MediaDescriptor>> + Send + 'a>;

/// Downloads the media referenced by a target's stored records and authors
pub struct MediaRetriever {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteFetcher>,
    layout: BackupLayout,
    limiter: Option<RateLimiter>,
}

impl MediaRetriever {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteFetcher>,
        layout: BackupLayout,
    ) -> Self {
        Self {
            store,
            remote,
            layout,
            limiter: None,
        }
    }

    /// Throttle downloads with a token bucket
    #[must_use]
    pub fn with_rate_limit(mut self, config: &RateLimiterConfig) -> Self {
        self.limiter = Some(RateLimiter::new(config));
        self
    }

    pub fn layout(&self) -> &BackupLayout {
        &self.layout
    }

    /// Run retrieval on its own task
    pub fn spawn(
        self,
        selection: MediaSelection,
        events: Option<UnboundedSender<MediaProgress>>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<MediaReport>> {
        tokio::spawn(async move { self.run(&selection, events.as_ref(), &cancel).await })
    }

    /// Download every selected category, one item at a time.
    ///
    /// Item failures are counted and skipped. Store failures end the run.
    pub async fn run(
        &self,
        selection: &MediaSelection,
        events: Option<&UnboundedSender<MediaProgress>>,
        cancel: &CancellationToken,
    ) -> Result<MediaReport> {
        self.layout.create_media_dirs()?;
        let mut report = MediaReport::default();

        for category in selection.categories() {
            let dir = self.layout.media_dir(category);
            let (total, items) = self.descriptors(category)?;
            info!(%category, total, "Starting media download");

            let mut counts = CategoryReport {
                total,
                ..CategoryReport::default()
            };

            for (position, item) in items.enumerate() {
                let media = item?;
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }

                let Some(outcome) = self.retrieve(&dir, &media, cancel).await else {
                    report.cancelled = true;
                    break;
                };
                counts.record(&outcome);

                if let Some(tx) = events {
                    let _ = tx.send(MediaProgress {
                        category,
                        index: position + 1,
                        total: total.max(position + 1),
                        blob_id: media.blob_id,
                        outcome,
                    });
                }
            }

            info!(
                %category,
                downloaded = counts.downloaded,
                skipped = counts.skipped,
                failed = counts.failed,
                "Finished media category"
            );
            report.categories.push((category, counts));

            if report.cancelled {
                info!("Media download cancelled");
                break;
            }
        }

        Ok(report)
    }

    fn descriptors(&self, category: MediaCategory) -> Result<(usize, Descriptors<'_>)> {
        if category == MediaCategory::ProfilePhotos {
            let photos: Vec<MediaDescriptor> = self
                .store
                .authors_with_photo()?
                .into_iter()
                .filter_map(|author| author.photo)
                .collect();
            return Ok((photos.len(), Box::new(photos.into_iter().map(Ok))));
        }

        let Some(kind) = category.media_kind() else {
            return Ok((0, Box::new(std::iter::empty())));
        };
        let filter = RecordFilter::WithMedia(kind);
        let total = self.store.count(filter)?;
        let scan = RecordScan::new(self.store.as_ref(), filter, ScanOrder::Ascending)
            .filter_map(|record| record.map(|r| r.media).transpose());
        Ok((total, Box::new(scan)))
    }

    /// One attempt; `None` when cancelled before it finished
    async fn retrieve(
        &self,
        dir: &Path,
        media: &MediaDescriptor,
        cancel: &CancellationToken,
    ) -> Option<MediaOutcome> {
        let path = dir.join(media.file_name());
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(blob_id = media.blob_id, "Already downloaded");
            return Some(MediaOutcome::Skipped);
        }

        if let Some(limiter) = &self.limiter {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = limiter.wait() => {}
            }
        }

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            fetched = self.remote.fetch_blob(media) => fetched,
        };

        let outcome = match fetched {
            Ok(bytes) => match write_file(&path, &bytes).await {
                Ok(()) => MediaOutcome::Downloaded,
                Err(e) => {
                    warn!(path = %path.display(), "Failed to write media file: {e}");
                    MediaOutcome::Failed(e.to_string())
                }
            },
            Err(e) => {
                warn!(
                    blob_id = media.blob_id,
                    kind = media.kind.as_str(),
                    "Media download failed: {e}"
                );
                MediaOutcome::Failed(e.to_string())
            }
        };
        Some(outcome)
    }
}

impl std::fmt::Debug for MediaRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRetriever")
            .field("layout", &self.layout)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Write through a `.part` file so a present file is always complete
async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut part = path.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);

    tokio::fs::write(&part, bytes).await?;
    tokio::fs::rename(&part, path).await
}
