//! Record store abstractions
//!
//! The sync engine is the single writer of a store; export and media
//! retrieval read it, possibly while a sync is appending to it.

use crate::error::Result;
use crate::types::{Author, AuthorId, MediaKind, Record, RecordId};
use chrono::NaiveDate;
use std::collections::VecDeque;

/// Default number of rows pulled per batch by [`RecordScan`]
pub const DEFAULT_SCAN_BATCH: usize = 500;

/// Which records a query selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    /// Every record
    #[default]
    All,
    /// Records carrying media of the given kind
    WithMedia(MediaKind),
}

impl RecordFilter {
    /// Whether a record passes this filter
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::WithMedia(kind) => record.media.as_ref().is_some_and(|m| m.kind == *kind),
        }
    }
}

/// Identity order of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanOrder {
    #[default]
    Ascending,
    Descending,
}

/// Keyed, append-only store of records and their authors
pub trait RecordStore: Send + Sync {
    /// Insert records in one transaction, ignoring identities already
    /// present. Returns how many rows were added.
    fn insert_records(&self, records: &[Record]) -> Result<usize>;

    /// Whether a record with this identity is stored
    fn exists(&self, id: RecordId) -> Result<bool>;

    /// Look up a single record
    fn get(&self, id: RecordId) -> Result<Option<Record>>;

    /// Insert or replace authors (last write wins)
    fn upsert_authors(&self, authors: &[Author]) -> Result<usize>;

    /// Look up a single author
    fn author(&self, id: AuthorId) -> Result<Option<Author>>;

    /// Authors that have a profile photo, ordered by identity
    fn authors_with_photo(&self) -> Result<Vec<Author>>;

    /// Number of stored authors
    fn count_authors(&self) -> Result<usize>;

    /// Number of records matching the filter
    fn count(&self, filter: RecordFilter) -> Result<usize>;

    /// Up to `limit` matching records strictly past `after` in the given order
    fn fetch_batch(
        &self,
        filter: RecordFilter,
        order: ScanOrder,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Highest-identity record dated strictly before the given day
    fn nearest_before(&self, day: NaiveDate) -> Result<Option<Record>>;

    /// Lowest-identity record dated on or after the given day
    fn nearest_at_or_after(&self, day: NaiveDate) -> Result<Option<Record>>;
}

/// Lazy, batched scan over a store in identity order.
///
/// Each batch resumes strictly after the last yielded identity, so rows
/// appended during the scan never cause a record to be yielded twice.
pub struct RecordScan<'a> {
    store: &'a dyn RecordStore,
    filter: RecordFilter,
    order: ScanOrder,
    batch_size: usize,
    after: Option<RecordId>,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl<'a> RecordScan<'a> {
    /// Start a scan over the whole store
    pub fn new(store: &'a dyn RecordStore, filter: RecordFilter, order: ScanOrder) -> Self {
        Self {
            store,
            filter,
            order,
            batch_size: DEFAULT_SCAN_BATCH,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Set the batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn refill(&mut self) -> Result<()> {
        let batch = self
            .store
            .fetch_batch(self.filter, self.order, self.after, self.batch_size)?;
        if batch.len() < self.batch_size {
            self.exhausted = true;
        }
        if let Some(last) = batch.last() {
            self.after = Some(last.id);
        }
        self.buffer.extend(batch);
        Ok(())
    }
}

impl Iterator for RecordScan<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.refill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl std::fmt::Debug for RecordScan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordScan")
            .field("filter", &self.filter)
            .field("order", &self.order)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}
