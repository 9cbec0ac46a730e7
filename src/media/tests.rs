//! Tests for media retrieval

use super::*;
use crate::layout::BackupLayout;
use crate::remote::{InMemoryRemote, RateLimiterConfig};
use crate::store::{MemoryStore, RecordStore};
use crate::types::{Author, AuthorKind, MediaKind, Record};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn record(id: i64) -> Record {
    Record::new(id, Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap(), "")
}

struct Fixture {
    _dir: TempDir,
    layout: BackupLayout,
    store: Arc<MemoryStore>,
    remote: Arc<InMemoryRemote>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let layout = BackupLayout::new(dir.path(), 42);

        let store = Arc::new(MemoryStore::with_records(vec![
            record(1).with_media(MediaKind::Photo, 100, ".jpg"),
            record(2),
            record(3).with_media(MediaKind::Document, 300, ".pdf"),
            record(4).with_media(MediaKind::Photo, 400, ".jpg"),
        ]));
        store
            .upsert_authors(&[
                Author::new(7, AuthorKind::User, "Alice").with_photo(700, ".jpg"),
                Author::new(8, AuthorKind::User, "Bob"),
            ])
            .unwrap();

        let remote = Arc::new(InMemoryRemote::new());
        for blob in [100, 300, 400, 700] {
            remote.add_blob(blob, format!("blob-{blob}").into_bytes());
        }

        Self {
            _dir: dir,
            layout,
            store,
            remote,
        }
    }

    fn retriever(&self) -> MediaRetriever {
        MediaRetriever::new(self.store.clone(), self.remote.clone(), self.layout.clone())
    }

    fn file(&self, category: MediaCategory, name: &str) -> std::path::PathBuf {
        self.layout.media_dir(category).join(name)
    }
}

// ============================================================================
// Type Tests
// ============================================================================

#[test]
fn test_selection_categories() {
    assert_eq!(
        MediaSelection::all().categories(),
        vec![
            MediaCategory::ProfilePhotos,
            MediaCategory::Photos,
            MediaCategory::Documents
        ]
    );
    assert!(MediaSelection::none().categories().is_empty());

    let docs_only = MediaSelection {
        documents: true,
        ..MediaSelection::none()
    };
    assert_eq!(docs_only.categories(), vec![MediaCategory::Documents]);
}

#[test]
fn test_category_names() {
    let names: Vec<&str> = MediaCategory::ALL.iter().map(|c| c.dir_name()).collect();
    assert_eq!(names, vec!["profile_photos", "photos", "documents", "stickers"]);
    assert_eq!(MediaCategory::Stickers.media_kind(), None);
    assert_eq!(
        MediaCategory::ProfilePhotos.media_kind(),
        Some(MediaKind::ProfilePhoto)
    );
}

#[test]
fn test_report_success_rate() {
    let mut counts = CategoryReport::default();
    counts.record(&MediaOutcome::Downloaded);
    counts.record(&MediaOutcome::Skipped);
    counts.record(&MediaOutcome::Failed("x".into()));
    counts.record(&MediaOutcome::Downloaded);

    let report = MediaReport {
        categories: vec![(MediaCategory::Photos, counts)],
        cancelled: false,
    };
    assert_eq!(report.attempted(), 4);
    assert_eq!(report.failed(), 1);
    assert!((report.success_rate() - 0.75).abs() < f64::EPSILON);
    assert!((MediaReport::default().success_rate() - 1.0).abs() < f64::EPSILON);
}

// ============================================================================
// Retrieval Tests
// ============================================================================

#[tokio::test]
async fn test_downloads_every_category() {
    let fx = Fixture::new();

    let report = fx
        .retriever()
        .run(&MediaSelection::all(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.fetched(), 4);
    assert_eq!(report.category(MediaCategory::Photos).unwrap().total, 2);
    assert_eq!(report.category(MediaCategory::ProfilePhotos).unwrap().total, 1);

    assert_eq!(
        std::fs::read(fx.file(MediaCategory::Photos, "100.jpg")).unwrap(),
        b"blob-100"
    );
    assert!(fx.file(MediaCategory::Documents, "300.pdf").exists());
    assert!(fx.file(MediaCategory::ProfilePhotos, "700.jpg").exists());
    assert!(!fx.file(MediaCategory::Photos, "100.jpg.part").exists());
    assert!(fx.layout.media_dir(MediaCategory::Stickers).is_dir());
}

#[tokio::test]
async fn test_rerun_fetches_nothing() {
    let fx = Fixture::new();
    fx.retriever()
        .run(&MediaSelection::all(), None, &CancellationToken::new())
        .await
        .unwrap();
    fx.remote.reset_counters();

    let report = fx
        .retriever()
        .run(&MediaSelection::all(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fx.remote.blob_fetches(), 0);
    assert_eq!(report.fetched(), 0);
    assert_eq!(report.attempted(), 4);
    assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_failed_item_does_not_stop_category() {
    let fx = Fixture::new();
    fx.remote.fail_blob(100);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let selection = MediaSelection {
        photos: true,
        ..MediaSelection::none()
    };
    let report = fx
        .retriever()
        .run(&selection, Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    let photos = report.category(MediaCategory::Photos).unwrap();
    assert_eq!(photos.failed, 1);
    assert_eq!(photos.downloaded, 1);
    assert!(!fx.file(MediaCategory::Photos, "100.jpg").exists());
    assert!(fx.file(MediaCategory::Photos, "400.jpg").exists());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push((event.index, event.total, event.outcome.is_success()));
    }
    assert_eq!(events, vec![(1, 2, false), (2, 2, true)]);

    // The failed item is picked up by the next run
    fx.remote.clear_failures();
    fx.remote.reset_counters();
    let report = fx
        .retriever()
        .run(&selection, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fx.remote.blob_fetches(), 1);
    assert_eq!(report.failed(), 0);
}

#[tokio::test]
async fn test_missing_blob_is_item_failure() {
    let fx = Fixture::new();
    fx.store
        .insert_records(&[record(9).with_media(MediaKind::Document, 999, ".zip")])
        .unwrap();

    let selection = MediaSelection {
        documents: true,
        ..MediaSelection::none()
    };
    let report = fx
        .retriever()
        .run(&selection, None, &CancellationToken::new())
        .await
        .unwrap();

    let documents = report.category(MediaCategory::Documents).unwrap();
    assert_eq!(documents.total, 2);
    assert_eq!(documents.downloaded, 1);
    assert_eq!(documents.failed, 1);
}

#[tokio::test]
async fn test_cancelled_run_fetches_nothing() {
    let fx = Fixture::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = fx
        .retriever()
        .run(&MediaSelection::all(), None, &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(fx.remote.blob_fetches(), 0);
    assert_eq!(report.categories.len(), 1);
}

#[tokio::test]
async fn test_spawned_with_rate_limit() {
    let fx = Fixture::new();
    let retriever = fx
        .retriever()
        .with_rate_limit(&RateLimiterConfig::new(100, 10));

    let report = retriever
        .spawn(MediaSelection::all(), None, CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.fetched(), 4);
}
