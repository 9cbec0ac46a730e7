//! Scriptable in-memory remote
//!
//! Serves a fixed newest-to-oldest history and a blob table, counts calls,
//! and can be told to fail. Used by tests and dry runs.

use super::types::{HistoryPage, RemoteFetcher};
use crate::error::{Error, Result};
use crate::state::RESUME_SENTINEL;
use crate::types::{Author, AuthorId, MediaDescriptor, Record, RecordId, SyncTarget};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    history: BTreeMap<RecordId, Record>,
    authors: BTreeMap<AuthorId, Author>,
    blobs: HashMap<i64, Bytes>,
    failing_blobs: HashSet<i64>,
    /// Page fetches still allowed before every further fetch fails
    pages_before_failure: Option<usize>,
}

/// In-memory [`RemoteFetcher`]
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    inner: Mutex<Inner>,
    hide_total: AtomicBool,
    page_fetches: AtomicUsize,
    blob_fetches: AtomicUsize,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a remote serving the given history
    pub fn with_history(records: impl IntoIterator<Item = Record>) -> Self {
        let remote = Self::new();
        remote.push_records(records);
        remote
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::transient("In-memory remote lock poisoned"))
    }

    fn with_inner(&self, f: impl FnOnce(&mut Inner)) {
        if let Ok(mut inner) = self.inner.lock() {
            f(&mut inner);
        }
    }

    /// Add records, e.g. new messages arriving between two runs
    pub fn push_records(&self, records: impl IntoIterator<Item = Record>) {
        self.with_inner(|inner| inner.history.extend(records.into_iter().map(|r| (r.id, r))));
    }

    /// Add or replace participants sent along with pages
    pub fn push_authors(&self, authors: impl IntoIterator<Item = Author>) {
        self.with_inner(|inner| inner.authors.extend(authors.into_iter().map(|a| (a.id, a))));
    }

    /// Register the bytes served for a blob
    pub fn add_blob(&self, blob_id: i64, bytes: impl Into<Bytes>) {
        let bytes: Bytes = bytes.into();
        self.with_inner(|inner| {
            inner.blobs.insert(blob_id, bytes);
        });
    }

    /// Make downloads of this blob fail
    pub fn fail_blob(&self, blob_id: i64) {
        self.with_inner(|inner| {
            inner.failing_blobs.insert(blob_id);
        });
    }

    /// Serve `pages` more pages, then fail every page fetch
    pub fn fail_pages_after(&self, pages: usize) {
        self.with_inner(|inner| inner.pages_before_failure = Some(pages));
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.with_inner(|inner| {
            inner.failing_blobs.clear();
            inner.pages_before_failure = None;
        });
    }

    /// Stop reporting a total count in pages
    pub fn hide_total_count(&self) {
        self.hide_total.store(true, Ordering::SeqCst);
    }

    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub fn blob_fetches(&self) -> usize {
        self.blob_fetches.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.page_fetches.store(0, Ordering::SeqCst);
        self.blob_fetches.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteFetcher for InMemoryRemote {
    async fn fetch_page(
        &self,
        _target: &SyncTarget,
        cursor: RecordId,
        limit: usize,
    ) -> Result<HistoryPage> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock()?;

        if let Some(remaining) = inner.pages_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(Error::transient("Injected page fetch failure"));
            }
            *remaining -= 1;
        }

        let upper = if cursor == RESUME_SENTINEL {
            RecordId::MAX
        } else {
            cursor
        };
        let records: Vec<Record> = inner
            .history
            .range(..upper)
            .rev()
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect();

        let referenced: HashSet<AuthorId> = records.iter().filter_map(|r| r.author_id).collect();
        let authors = inner
            .authors
            .values()
            .filter(|a| referenced.contains(&a.id))
            .cloned()
            .collect();

        let total_count = if self.hide_total.load(Ordering::SeqCst) {
            None
        } else {
            Some(inner.history.len())
        };

        Ok(HistoryPage {
            records,
            authors,
            total_count,
        })
    }

    async fn fetch_blob(&self, media: &MediaDescriptor) -> Result<Bytes> {
        self.blob_fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock()?;

        if inner.failing_blobs.contains(&media.blob_id) {
            return Err(Error::transient(format!(
                "Injected failure downloading blob {}",
                media.blob_id
            )));
        }
        inner
            .blobs
            .get(&media.blob_id)
            .cloned()
            .ok_or_else(|| Error::http_status(404, format!("Blob {} not found", media.blob_id)))
    }
}
