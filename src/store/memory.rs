//! In-memory record store for tests and dry runs

use super::types::{RecordFilter, RecordStore, ScanOrder};
use crate::error::{Error, Result};
use crate::types::{Author, AuthorId, Record, RecordId};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Record store keeping everything in ordered maps
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, Record>>,
    authors: RwLock<BTreeMap<AuthorId, Author>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            map.extend(records.into_iter().map(|r| (r.id, r)));
        }
        store
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, BTreeMap<RecordId, Record>>> {
        self.records
            .read()
            .map_err(|_| Error::store("Record map lock poisoned"))
    }

    fn records_mut(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<RecordId, Record>>> {
        self.records
            .write()
            .map_err(|_| Error::store("Record map lock poisoned"))
    }

    fn authors(&self) -> Result<RwLockReadGuard<'_, BTreeMap<AuthorId, Author>>> {
        self.authors
            .read()
            .map_err(|_| Error::store("Author map lock poisoned"))
    }
}

impl RecordStore for MemoryStore {
    fn insert_records(&self, records: &[Record]) -> Result<usize> {
        let mut map = self.records_mut()?;
        let mut inserted = 0;
        for record in records {
            if !map.contains_key(&record.id) {
                map.insert(record.id, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn exists(&self, id: RecordId) -> Result<bool> {
        Ok(self.records()?.contains_key(&id))
    }

    fn get(&self, id: RecordId) -> Result<Option<Record>> {
        Ok(self.records()?.get(&id).cloned())
    }

    fn upsert_authors(&self, authors: &[Author]) -> Result<usize> {
        let mut map = self
            .authors
            .write()
            .map_err(|_| Error::store("Author map lock poisoned"))?;
        for author in authors {
            map.insert(author.id, author.clone());
        }
        Ok(authors.len())
    }

    fn author(&self, id: AuthorId) -> Result<Option<Author>> {
        Ok(self.authors()?.get(&id).cloned())
    }

    fn authors_with_photo(&self) -> Result<Vec<Author>> {
        Ok(self
            .authors()?
            .values()
            .filter(|a| a.photo.is_some())
            .cloned()
            .collect())
    }

    fn count_authors(&self) -> Result<usize> {
        Ok(self.authors()?.len())
    }

    fn count(&self, filter: RecordFilter) -> Result<usize> {
        Ok(self
            .records()?
            .values()
            .filter(|r| filter.matches(r))
            .count())
    }

    fn fetch_batch(
        &self,
        filter: RecordFilter,
        order: ScanOrder,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let map = self.records()?;
        let past = after.map_or(Bound::Unbounded, Bound::Excluded);
        let batch = match order {
            ScanOrder::Ascending => map
                .range((past, Bound::Unbounded))
                .map(|(_, r)| r)
                .filter(|r| filter.matches(r))
                .take(limit)
                .cloned()
                .collect(),
            ScanOrder::Descending => map
                .range((Bound::Unbounded, past))
                .rev()
                .map(|(_, r)| r)
                .filter(|r| filter.matches(r))
                .take(limit)
                .cloned()
                .collect(),
        };
        Ok(batch)
    }

    fn nearest_before(&self, day: NaiveDate) -> Result<Option<Record>> {
        Ok(self
            .records()?
            .values()
            .rev()
            .find(|r| r.day() < day)
            .cloned())
    }

    fn nearest_at_or_after(&self, day: NaiveDate) -> Result<Option<Record>> {
        Ok(self
            .records()?
            .values()
            .find(|r| r.day() >= day)
            .cloned())
    }
}
