//! Tests for engine module

use super::*;
use crate::error::Error;
use crate::remote::InMemoryRemote;
use crate::state::ResumeStateManager;
use crate::store::MemoryStore;
use crate::types::{Author, AuthorKind, SyncTargetKind};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

fn target() -> SyncTarget {
    SyncTarget::new(SyncTargetKind::Chat { chat_id: 10 }, "Club")
}

fn history(ids: std::ops::RangeInclusive<i64>) -> Vec<Record> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    ids.map(|id| {
        Record::new(id, base + ChronoDuration::minutes(id), format!("m{id}")).with_author(1)
    })
    .collect()
}

fn sync_config(chunk: usize) -> SyncConfig {
    SyncConfig::new()
        .with_chunk_size(chunk)
        .with_page_delay(Duration::ZERO)
}

fn stored_ids(store: &MemoryStore) -> Vec<i64> {
    store
        .fetch_batch(RecordFilter::All, crate::store::ScanOrder::Ascending, None, usize::MAX)
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect()
}

async fn checkpoint_id(checkpoints: &ResumeStateManager) -> Option<i64> {
    checkpoints
        .load()
        .await
        .unwrap()
        .map(|cp| cp.last_processed_id)
}

struct Harness {
    store: Arc<MemoryStore>,
    remote: Arc<InMemoryRemote>,
    checkpoints: Arc<ResumeStateManager>,
}

impl Harness {
    fn new(records: Vec<Record>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            remote: Arc::new(InMemoryRemote::with_history(records)),
            checkpoints: Arc::new(ResumeStateManager::in_memory(1)),
        }
    }

    fn engine(&self, chunk: usize) -> SyncEngine {
        SyncEngine::new(
            self.store.clone(),
            self.remote.clone(),
            self.checkpoints.clone(),
        )
        .with_config(sync_config(chunk))
    }

    async fn run(&self, chunk: usize) -> Result<SyncOutcome> {
        self.engine(chunk)
            .run(&target(), None, &CancellationToken::new())
            .await
    }
}

/// Record store whose n-th insert fails
struct FlakyStore {
    inner: MemoryStore,
    inserts_before_failure: AtomicUsize,
}

impl RecordStore for FlakyStore {
    fn insert_records(&self, records: &[Record]) -> Result<usize> {
        if self.inserts_before_failure.load(Ordering::SeqCst) == 0 {
            return Err(Error::store("disk full"));
        }
        self.inserts_before_failure.fetch_sub(1, Ordering::SeqCst);
        self.inner.insert_records(records)
    }
    fn exists(&self, id: i64) -> Result<bool> {
        self.inner.exists(id)
    }
    fn get(&self, id: i64) -> Result<Option<Record>> {
        self.inner.get(id)
    }
    fn upsert_authors(&self, authors: &[Author]) -> Result<usize> {
        self.inner.upsert_authors(authors)
    }
    fn author(&self, id: i64) -> Result<Option<Author>> {
        self.inner.author(id)
    }
    fn authors_with_photo(&self) -> Result<Vec<Author>> {
        self.inner.authors_with_photo()
    }
    fn count_authors(&self) -> Result<usize> {
        self.inner.count_authors()
    }
    fn count(&self, filter: RecordFilter) -> Result<usize> {
        self.inner.count(filter)
    }
    fn fetch_batch(
        &self,
        filter: RecordFilter,
        order: crate::store::ScanOrder,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        self.inner.fetch_batch(filter, order, after, limit)
    }
    fn nearest_before(&self, day: chrono::NaiveDate) -> Result<Option<Record>> {
        self.inner.nearest_before(day)
    }
    fn nearest_at_or_after(&self, day: chrono::NaiveDate) -> Result<Option<Record>> {
        self.inner.nearest_at_or_after(day)
    }
}

/// Checkpoint store whose n-th save fails, as if the process died there
struct FlakyCheckpoints {
    inner: ResumeStateManager,
    saves_before_failure: AtomicUsize,
}

#[async_trait]
impl CheckpointStore for FlakyCheckpoints {
    async fn load(&self) -> Result<Option<ResumeCheckpoint>> {
        self.inner.load().await
    }
    async fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        if self.saves_before_failure.load(Ordering::SeqCst) == 0 {
            return Err(Error::checkpoint("crashed before rename"));
        }
        self.saves_before_failure.fetch_sub(1, Ordering::SeqCst);
        self.inner.save(checkpoint).await
    }
    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
    fn protocol_version(&self) -> u32 {
        self.inner.protocol_version()
    }
}

// ============================================================================
// Config / Types Tests
// ============================================================================

#[test]
fn test_sync_config_default() {
    let config = SyncConfig::default();
    assert_eq!(config.chunk_size, 100);
    assert_eq!(config.page_delay, Duration::from_secs(1));
}

#[test]
fn test_sync_config_builder() {
    let config = SyncConfig::new()
        .with_chunk_size(0)
        .with_page_delay(Duration::from_millis(250));
    assert_eq!(config.chunk_size, 1);
    assert_eq!(config.page_delay, Duration::from_millis(250));
}

#[test]
fn test_calculate_eta() {
    let delay = Duration::from_secs(1);
    assert_eq!(calculate_eta(0, 100, delay), Duration::ZERO);
    assert_eq!(calculate_eta(1, 100, delay), Duration::from_secs(1));
    assert_eq!(calculate_eta(100, 100, delay), Duration::from_secs(1));
    assert_eq!(calculate_eta(101, 100, delay), Duration::from_secs(2));
    assert_eq!(
        calculate_eta(250, 10, Duration::from_millis(500)),
        Duration::from_millis(12_500)
    );
}

#[test]
fn test_progress_fraction() {
    let progress = SyncProgress {
        downloaded: 25,
        total: 100,
        eta: Duration::ZERO,
        phase: SyncPhase::DrainingTail,
    };
    assert!((progress.fraction() - 0.25).abs() < f64::EPSILON);

    let unknown = SyncProgress { total: 0, ..progress };
    assert!((unknown.fraction() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_sync_stats() {
    let mut stats = SyncStats::new();
    stats.add_page();
    stats.add_page();
    stats.add_records(15);
    stats.add_authors(2);
    stats.set_duration(Duration::from_millis(1500));

    assert_eq!(stats.pages_fetched, 2);
    assert_eq!(stats.records_inserted, 15);
    assert_eq!(stats.authors_upserted, 2);
    assert_eq!(stats.duration_ms, 1500);
}

#[test]
fn test_phase_labels() {
    assert_eq!(SyncPhase::default(), SyncPhase::Initial);
    assert_eq!(SyncPhase::FillingGap.to_string(), "filling_gap");
}

// ============================================================================
// Backfill Tests
// ============================================================================

#[tokio::test]
async fn test_fresh_sync_downloads_everything() {
    let h = Harness::new(history(1..=25));
    h.remote
        .push_authors([Author::new(1, AuthorKind::User, "Alice")]);

    let mut engine = h.engine(10);
    let outcome = engine
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(engine.phase(), SyncPhase::Complete);
    assert_eq!(stored_ids(&h.store), (1..=25).collect::<Vec<_>>());
    // 10 + 10 + 5, then the empty page that ends the tail
    assert_eq!(h.remote.page_fetches(), 4);
    assert_eq!(engine.stats().records_inserted, 25);
    assert_eq!(checkpoint_id(&h.checkpoints).await, Some(RESUME_SENTINEL));
    assert_eq!(h.store.author(1).unwrap().unwrap().display_name, "Alice");
}

#[tokio::test]
async fn test_idempotent_resume() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(InMemoryRemote::with_history(history(1..=25)));
    let checkpoints = Arc::new(ResumeStateManager::new(&path, 1));

    let mut engine = SyncEngine::new(store.clone(), remote.clone(), checkpoints.clone())
        .with_config(sync_config(10));
    engine
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    let checkpoint_before = std::fs::read(&path).unwrap();
    let ids_before = stored_ids(&store);
    remote.reset_counters();

    let outcome = engine
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(remote.page_fetches(), 1);
    assert_eq!(engine.stats().records_inserted, 0);
    assert_eq!(stored_ids(&store), ids_before);
    assert_eq!(std::fs::read(&path).unwrap(), checkpoint_before);
}

#[tokio::test]
async fn test_interrupted_sync_completes_on_resume() {
    let h = Harness::new(history(1..=25));
    h.remote.fail_pages_after(2);

    let err = h.run(10).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(stored_ids(&h.store), (6..=25).collect::<Vec<_>>());
    assert_eq!(checkpoint_id(&h.checkpoints).await, Some(6));

    h.remote.clear_failures();
    let outcome = h.run(10).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(stored_ids(&h.store), (1..=25).collect::<Vec<_>>());
    assert_eq!(checkpoint_id(&h.checkpoints).await, Some(RESUME_SENTINEL));
}

#[tokio::test]
async fn test_gap_fill_captures_new_records() {
    let h = Harness::new(history(1..=25));
    h.remote.fail_pages_after(1);
    assert!(h.run(10).await.is_err());
    assert_eq!(checkpoint_id(&h.checkpoints).await, Some(16));

    // Five newer records arrive before the next run
    h.remote.clear_failures();
    h.remote.push_records(history(26..=30));
    h.remote.reset_counters();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = h.engine(10);
    let outcome = engine
        .run(&target(), Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(stored_ids(&h.store), (1..=30).collect::<Vec<_>>());
    // 15..6, 5..1, empty tail, then one overlapping page from the top
    assert_eq!(h.remote.page_fetches(), 4);
    assert_eq!(engine.stats().records_inserted, 20);

    let mut phases = Vec::new();
    let mut first_progress = None;
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::PhaseChanged(phase) => phases.push(phase),
            SyncEvent::Progress(p) if first_progress.is_none() => first_progress = Some(p),
            _ => {}
        }
    }
    assert_eq!(
        phases,
        vec![
            SyncPhase::DrainingTail,
            SyncPhase::FillingGap,
            SyncPhase::Complete
        ]
    );
    // Counting starts from what the store already held
    let first_progress = first_progress.unwrap();
    assert_eq!(first_progress.downloaded, 20);
    assert_eq!(first_progress.total, 30);
}

#[tokio::test]
async fn test_gap_fill_not_needed_after_fresh_start() {
    let h = Harness::new(history(1..=5));
    h.run(10).await.unwrap();

    h.remote.push_records(history(6..=8));
    h.remote.reset_counters();
    h.run(10).await.unwrap();

    // The newest page carries 8..6 and then overlaps, which ends the run
    assert_eq!(h.remote.page_fetches(), 1);
    assert_eq!(stored_ids(&h.store), (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_total_falls_back_to_first_page_length() {
    let h = Harness::new(history(1..=25));
    h.remote.hide_total_count();

    let (tx, mut rx) = mpsc::unbounded_channel();
    h.engine(10)
        .run(&target(), Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    let mut totals = Vec::new();
    while let Some(event) = rx.recv().await {
        if let SyncEvent::Progress(p) = event {
            totals.push((p.downloaded, p.total));
        }
    }
    assert_eq!(totals, vec![(10, 10), (20, 10), (25, 10)]);
}

// ============================================================================
// Checkpoint Atomicity Tests
// ============================================================================

#[tokio::test]
async fn test_lost_checkpoint_write_recovers() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(InMemoryRemote::with_history(history(1..=25)));
    let durable = ResumeStateManager::in_memory(1);
    let flaky = Arc::new(FlakyCheckpoints {
        inner: durable.clone(),
        saves_before_failure: AtomicUsize::new(1),
    });

    let err = SyncEngine::new(store.clone(), remote.clone(), flaky)
        .with_config(sync_config(10))
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_persistence());

    // Second page committed, its checkpoint lost: at most one page behind
    let saved = checkpoint_id(&durable).await.unwrap();
    assert_eq!(saved, 16);
    assert!(store.exists(saved).unwrap());
    assert_eq!(stored_ids(&store), (6..=25).collect::<Vec<_>>());

    let outcome = SyncEngine::new(store.clone(), remote.clone(), Arc::new(durable.clone()))
        .with_config(sync_config(10))
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(stored_ids(&store), (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_failed_record_commit_keeps_checkpoint() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        inserts_before_failure: AtomicUsize::new(1),
    });
    let remote = Arc::new(InMemoryRemote::with_history(history(1..=25)));
    let checkpoints = Arc::new(ResumeStateManager::in_memory(1));

    let mut engine = SyncEngine::new(store.clone(), remote.clone(), checkpoints.clone())
        .with_config(sync_config(10));
    let err = engine
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_persistence());
    assert_eq!(checkpoint_id(&checkpoints).await, Some(16));
    assert_eq!(stored_ids(&store.inner), (16..=25).collect::<Vec<_>>());

    store.inserts_before_failure.store(usize::MAX, Ordering::SeqCst);
    engine
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stored_ids(&store.inner), (1..=25).collect::<Vec<_>>());
}

// ============================================================================
// Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_cancel_before_start_fetches_nothing() {
    let h = Harness::new(history(1..=5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = h
        .engine(10)
        .run(&target(), None, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Cancelled);
    assert_eq!(h.remote.page_fetches(), 0);
    assert_eq!(checkpoint_id(&h.checkpoints).await, None);
}

#[tokio::test]
async fn test_cancel_during_page_delay_keeps_committed_page() {
    let h = Harness::new(history(1..=25));
    let mut engine = SyncEngine::new(h.store.clone(), h.remote.clone(), h.checkpoints.clone())
        .with_config(
            SyncConfig::new()
                .with_chunk_size(10)
                .with_page_delay(Duration::from_secs(3600)),
        );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let canceller = async {
        while let Some(event) = rx.recv().await {
            if matches!(event, SyncEvent::Progress(_)) {
                cancel.cancel();
                break;
            }
        }
    };

    let target = target();
    let (outcome, ()) = tokio::join!(engine.run(&target, Some(&tx), &cancel), canceller);

    assert_eq!(outcome.unwrap(), SyncOutcome::Cancelled);
    assert_eq!(h.remote.page_fetches(), 1);
    assert_eq!(stored_ids(&h.store), (16..=25).collect::<Vec<_>>());
    assert_eq!(checkpoint_id(&h.checkpoints).await, Some(16));

    // A later run picks up where the cancelled one stopped
    h.run(10).await.unwrap();
    assert_eq!(stored_ids(&h.store), (1..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_checkpoint_uses_store_protocol_version() {
    let store = Arc::new(MemoryStore::new());
    let remote = Arc::new(InMemoryRemote::with_history(history(1..=3)));
    let checkpoints = Arc::new(ResumeStateManager::in_memory(71));

    SyncEngine::new(store, remote, checkpoints.clone())
        .with_config(sync_config(10))
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    let saved = checkpoints.load().await.unwrap().unwrap();
    assert_eq!(saved.protocol_version, 71);
    assert_eq!(saved.target_kind, "chat");
}

#[tokio::test]
async fn test_partial_checkpoint_above_stored_range() {
    // Everything below 16 is already stored, 16..=20 is not
    let store = Arc::new(MemoryStore::with_records(history(1..=15)));
    let remote = Arc::new(InMemoryRemote::with_history(history(1..=20)));
    let checkpoints = Arc::new(ResumeStateManager::in_memory(1));
    checkpoints
        .save(&ResumeCheckpoint::new(&target(), 16, 1))
        .await
        .unwrap();

    let outcome = SyncEngine::new(store.clone(), remote.clone(), checkpoints.clone())
        .with_config(sync_config(10))
        .run(&target(), None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::Completed);
    assert_eq!(stored_ids(&store), (1..=20).collect::<Vec<_>>());
    // 15..6 is skipped as a lagged page, 5..1 ends the tail, then one gap page
    assert_eq!(remote.page_fetches(), 3);
    assert_eq!(checkpoint_id(&checkpoints).await, Some(RESUME_SENTINEL));
}
