//! Tests for record stores

use super::*;
use crate::types::{Author, AuthorKind, MediaKind, Record};
use chrono::{NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use test_case::test_case;

#[derive(Debug, Clone, Copy)]
enum Backend {
    Memory,
    DuckDb,
}

fn open(backend: Backend) -> Box<dyn RecordStore> {
    match backend {
        Backend::Memory => Box::new(MemoryStore::new()),
        Backend::DuckDb => Box::new(DuckDbStore::open_in_memory().unwrap()),
    }
}

fn record(id: i64, y: i32, m: u32, d: u32) -> Record {
    Record::new(
        id,
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap(),
        format!("message {id}"),
    )
}

fn ids(records: &[Record]) -> Vec<i64> {
    records.iter().map(|r| r.id).collect()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Insert Tests
// ============================================================================

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_insert_and_get(backend: Backend) {
    let store = open(backend);
    let original = record(7, 2024, 3, 1)
        .with_author(42)
        .with_reply_to(5)
        .with_media(MediaKind::Photo, 9001, ".jpg");

    assert_eq!(store.insert_records(&[original.clone()]).unwrap(), 1);
    assert!(store.exists(7).unwrap());
    assert!(!store.exists(8).unwrap());
    assert_eq!(store.get(7).unwrap(), Some(original));
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_insert_is_idempotent(backend: Backend) {
    let store = open(backend);
    let batch = vec![record(1, 2024, 1, 1), record(2, 2024, 1, 1)];

    assert_eq!(store.insert_records(&batch).unwrap(), 2);
    assert_eq!(store.insert_records(&batch).unwrap(), 0);
    assert_eq!(store.count(RecordFilter::All).unwrap(), 2);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_insert_never_overwrites(backend: Backend) {
    let store = open(backend);
    store.insert_records(&[record(1, 2024, 1, 1)]).unwrap();

    let changed = Record::new(1, Utc::now(), "edited");
    store.insert_records(&[changed]).unwrap();

    assert_eq!(store.get(1).unwrap().unwrap().text, "message 1");
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_insert_empty_batch(backend: Backend) {
    let store = open(backend);
    assert_eq!(store.insert_records(&[]).unwrap(), 0);
    assert_eq!(store.count(RecordFilter::All).unwrap(), 0);
}

// ============================================================================
// Author Tests
// ============================================================================

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_upsert_authors_last_write_wins(backend: Backend) {
    let store = open(backend);
    store
        .upsert_authors(&[Author::new(1, AuthorKind::User, "Alice")])
        .unwrap();
    store
        .upsert_authors(&[
            Author::new(1, AuthorKind::User, "Alice Cooper").with_photo(77, ".jpg"),
            Author::new(2, AuthorKind::Group, "Readers"),
        ])
        .unwrap();

    let alice = store.author(1).unwrap().unwrap();
    assert_eq!(alice.display_name, "Alice Cooper");
    assert_eq!(alice.photo.unwrap().blob_id, 77);
    assert_eq!(store.author(2).unwrap().unwrap().kind, AuthorKind::Group);
    assert_eq!(store.count_authors().unwrap(), 2);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_upsert_duplicate_ids_in_one_batch(backend: Backend) {
    let store = open(backend);
    store
        .upsert_authors(&[
            Author::new(3, AuthorKind::User, "old"),
            Author::new(3, AuthorKind::User, "new"),
        ])
        .unwrap();

    assert_eq!(store.author(3).unwrap().unwrap().display_name, "new");
    assert_eq!(store.count_authors().unwrap(), 1);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_authors_with_photo(backend: Backend) {
    let store = open(backend);
    store
        .upsert_authors(&[
            Author::new(5, AuthorKind::User, "b").with_photo(50, ".jpg"),
            Author::new(4, AuthorKind::User, "a"),
            Author::new(3, AuthorKind::User, "c").with_photo(30, ".png"),
        ])
        .unwrap();

    let with_photo: Vec<i64> = store
        .authors_with_photo()
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(with_photo, vec![3, 5]);
}

// ============================================================================
// Query Tests
// ============================================================================

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_count_with_media_filter(backend: Backend) {
    let store = open(backend);
    store
        .insert_records(&[
            record(1, 2024, 1, 1).with_media(MediaKind::Photo, 11, ".jpg"),
            record(2, 2024, 1, 1).with_media(MediaKind::Document, 12, ".pdf"),
            record(3, 2024, 1, 1).with_media(MediaKind::Photo, 13, ".jpg"),
            record(4, 2024, 1, 1),
        ])
        .unwrap();

    assert_eq!(store.count(RecordFilter::All).unwrap(), 4);
    assert_eq!(
        store.count(RecordFilter::WithMedia(MediaKind::Photo)).unwrap(),
        2
    );
    assert_eq!(
        store
            .count(RecordFilter::WithMedia(MediaKind::Document))
            .unwrap(),
        1
    );
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_fetch_batch_keyset(backend: Backend) {
    let store = open(backend);
    let batch: Vec<Record> = (1..=6).map(|id| record(id * 10, 2024, 1, 1)).collect();
    store.insert_records(&batch).unwrap();

    let asc = store
        .fetch_batch(RecordFilter::All, ScanOrder::Ascending, Some(20), 2)
        .unwrap();
    assert_eq!(ids(&asc), vec![30, 40]);

    let desc = store
        .fetch_batch(RecordFilter::All, ScanOrder::Descending, None, 2)
        .unwrap();
    assert_eq!(ids(&desc), vec![60, 50]);

    let desc_after = store
        .fetch_batch(RecordFilter::All, ScanOrder::Descending, Some(50), 10)
        .unwrap();
    assert_eq!(ids(&desc_after), vec![40, 30, 20, 10]);
}

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_nearest_neighbours_by_day(backend: Backend) {
    let store = open(backend);
    store
        .insert_records(&[
            record(1, 2024, 1, 1),
            record(2, 2024, 1, 1),
            record(3, 2024, 1, 2),
            record(4, 2024, 1, 5),
        ])
        .unwrap();

    assert_eq!(store.nearest_before(day(2024, 1, 2)).unwrap().unwrap().id, 2);
    assert_eq!(store.nearest_before(day(2024, 1, 1)).unwrap(), None);
    assert_eq!(
        store
            .nearest_at_or_after(day(2024, 1, 3))
            .unwrap()
            .unwrap()
            .id,
        4
    );
    assert_eq!(store.nearest_at_or_after(day(2024, 1, 6)).unwrap(), None);
}

// ============================================================================
// Scan Tests
// ============================================================================

#[test_case(Backend::Memory ; "memory")]
#[test_case(Backend::DuckDb ; "duckdb")]
fn test_scan_crosses_batches(backend: Backend) {
    let store = open(backend);
    let batch: Vec<Record> = (1..=7).map(|id| record(id, 2024, 1, 1)).collect();
    store.insert_records(&batch).unwrap();

    let scanned: Vec<i64> = RecordScan::new(store.as_ref(), RecordFilter::All, ScanOrder::Ascending)
        .with_batch_size(3)
        .map(|r| r.unwrap().id)
        .collect();
    assert_eq!(scanned, vec![1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_scan_filtered_descending() {
    let store = MemoryStore::with_records(vec![
        record(1, 2024, 1, 1).with_media(MediaKind::Photo, 1, ".jpg"),
        record(2, 2024, 1, 1),
        record(3, 2024, 1, 1).with_media(MediaKind::Photo, 3, ".jpg"),
    ]);

    let scanned: Vec<i64> = RecordScan::new(
        &store,
        RecordFilter::WithMedia(MediaKind::Photo),
        ScanOrder::Descending,
    )
    .with_batch_size(1)
    .map(|r| r.unwrap().id)
    .collect();
    assert_eq!(scanned, vec![3, 1]);
}

#[test]
fn test_scan_tolerates_appends() {
    let store = MemoryStore::with_records((1..=4).map(|id| record(id, 2024, 1, 1)));
    let mut scan =
        RecordScan::new(&store, RecordFilter::All, ScanOrder::Ascending).with_batch_size(2);

    assert_eq!(scan.next().unwrap().unwrap().id, 1);
    store.insert_records(&[record(5, 2024, 1, 2)]).unwrap();

    let rest: Vec<i64> = scan.map(|r| r.unwrap().id).collect();
    assert_eq!(rest, vec![2, 3, 4, 5]);
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_duckdb_reopen_keeps_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("backup.duckdb");

    {
        let store = DuckDbStore::open(&path).unwrap();
        store
            .insert_records(&[record(1, 2024, 1, 1), record(2, 2024, 1, 2)])
            .unwrap();
        store
            .upsert_authors(&[Author::new(9, AuthorKind::User, "Bob")])
            .unwrap();
    }

    let store = DuckDbStore::open(&path).unwrap();
    assert_eq!(store.count(RecordFilter::All).unwrap(), 2);
    assert_eq!(store.author(9).unwrap().unwrap().display_name, "Bob");
}

#[test]
fn test_duckdb_open_bad_path_is_store_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("backup.duckdb");

    let err = DuckDbStore::open(&path).unwrap_err();
    assert!(err.is_persistence());
}
