//! DuckDB-backed record store
//!
//! One database file per target. Rows are mapped to typed records here
//! and nowhere else.

use super::types::{RecordFilter, RecordStore, ScanOrder};
use crate::error::{Error, Result};
use crate::types::{Author, AuthorId, AuthorKind, MediaDescriptor, MediaKind, Record, RecordId};
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id BIGINT PRIMARY KEY,
    date_us BIGINT NOT NULL,
    author_id BIGINT,
    text VARCHAR NOT NULL,
    reply_to BIGINT,
    media_kind VARCHAR,
    media_blob_id BIGINT,
    media_ext VARCHAR
);
CREATE TABLE IF NOT EXISTS authors (
    id BIGINT PRIMARY KEY,
    kind VARCHAR NOT NULL,
    display_name VARCHAR NOT NULL,
    photo_blob_id BIGINT,
    photo_ext VARCHAR
);
";

const RECORD_COLUMNS: &str =
    "id, date_us, author_id, text, reply_to, media_kind, media_blob_id, media_ext";

const AUTHOR_COLUMNS: &str = "id, kind, display_name, photo_blob_id, photo_ext";

/// Record store using an embedded DuckDB database
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Open (creating if needed) a store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::store(format!(
                "Failed to open record store {}: {e}",
                path.display()
            ))
        })?;
        Self::with_connection(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("Failed to create DuckDB connection: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| Error::store(format!("Failed to create schema: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::store("Record store connection lock poisoned"))
    }

    fn query_records(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> Result<Vec<Record>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::store(format!("Failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params, record_from_row)
            .map_err(|e| Error::store(format!("Failed to query records: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| Error::store(format!("Failed to decode record: {e}")))?);
        }
        Ok(records)
    }

    fn query_authors(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Vec<Author>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::store(format!("Failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map(params, author_from_row)
            .map_err(|e| Error::store(format!("Failed to query authors: {e}")))?;

        let mut authors = Vec::new();
        for row in rows {
            authors.push(row.map_err(|e| Error::store(format!("Failed to decode author: {e}")))?);
        }
        Ok(authors)
    }

    fn count_where(&self, sql: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| Error::store(format!("Failed to count rows: {e}")))?;
        Ok(count.max(0) as usize)
    }
}

impl RecordStore for DuckDbStore {
    fn insert_records(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::store(format!("Failed to begin transaction: {e}")))?;

        let sql = format!(
            "INSERT OR IGNORE INTO messages ({RECORD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let mut inserted = 0;
        for record in records {
            let media = record.media.as_ref();
            inserted += tx
                .execute(
                    &sql,
                    params![
                        record.id,
                        record.date.timestamp_micros(),
                        record.author_id,
                        record.text,
                        record.reply_to,
                        media.map(|m| m.kind.as_str()),
                        media.map(|m| m.blob_id),
                        media.map(|m| m.extension.as_str()),
                    ],
                )
                .map_err(|e| Error::store(format!("Failed to insert record {}: {e}", record.id)))?;
        }

        tx.commit()
            .map_err(|e| Error::store(format!("Failed to commit records: {e}")))?;
        Ok(inserted)
    }

    fn exists(&self, id: RecordId) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages WHERE id = ?", params![id], |row| {
                row.get(0)
            })
            .map_err(|e| Error::store(format!("Failed to check record {id}: {e}")))?;
        Ok(count > 0)
    }

    fn get(&self, id: RecordId) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM messages WHERE id = ?");
        Ok(self.query_records(&sql, &[&id])?.into_iter().next())
    }

    fn upsert_authors(&self, authors: &[Author]) -> Result<usize> {
        if authors.is_empty() {
            return Ok(0);
        }

        // Collapse duplicates first, a single statement may not touch a key twice
        let latest: BTreeMap<AuthorId, &Author> = authors.iter().map(|a| (a.id, a)).collect();

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::store(format!("Failed to begin transaction: {e}")))?;

        let sql = format!("INSERT OR REPLACE INTO authors ({AUTHOR_COLUMNS}) VALUES (?, ?, ?, ?, ?)");
        for author in latest.values() {
            let photo = author.photo.as_ref();
            tx.execute(
                &sql,
                params![
                    author.id,
                    author.kind.as_str(),
                    author.display_name,
                    photo.map(|p| p.blob_id),
                    photo.map(|p| p.extension.as_str()),
                ],
            )
            .map_err(|e| Error::store(format!("Failed to upsert author {}: {e}", author.id)))?;
        }

        tx.commit()
            .map_err(|e| Error::store(format!("Failed to commit authors: {e}")))?;
        Ok(latest.len())
    }

    fn author(&self, id: AuthorId) -> Result<Option<Author>> {
        let sql = format!("SELECT {AUTHOR_COLUMNS} FROM authors WHERE id = ?");
        Ok(self.query_authors(&sql, &[&id])?.into_iter().next())
    }

    fn authors_with_photo(&self) -> Result<Vec<Author>> {
        let sql = format!(
            "SELECT {AUTHOR_COLUMNS} FROM authors WHERE photo_blob_id IS NOT NULL ORDER BY id ASC"
        );
        self.query_authors(&sql, &[])
    }

    fn count_authors(&self) -> Result<usize> {
        self.count_where("SELECT COUNT(*) FROM authors")
    }

    fn count(&self, filter: RecordFilter) -> Result<usize> {
        self.count_where(&format!(
            "SELECT COUNT(*) FROM messages WHERE {}",
            filter_clause(filter)
        ))
    }

    fn fetch_batch(
        &self,
        filter: RecordFilter,
        order: ScanOrder,
        after: Option<RecordId>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let (bound, direction) = match order {
            ScanOrder::Ascending => (">", "ASC"),
            ScanOrder::Descending => ("<", "DESC"),
        };
        let limit = limit as i64;

        match after {
            Some(after) => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM messages WHERE {} AND id {bound} ? \
                     ORDER BY id {direction} LIMIT ?",
                    filter_clause(filter)
                );
                self.query_records(&sql, &[&after, &limit])
            }
            None => {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS} FROM messages WHERE {} ORDER BY id {direction} LIMIT ?",
                    filter_clause(filter)
                );
                self.query_records(&sql, &[&limit])
            }
        }
    }

    fn nearest_before(&self, day: NaiveDate) -> Result<Option<Record>> {
        let start = day_start_micros(day);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM messages WHERE date_us < ? ORDER BY id DESC LIMIT 1"
        );
        Ok(self.query_records(&sql, &[&start])?.into_iter().next())
    }

    fn nearest_at_or_after(&self, day: NaiveDate) -> Result<Option<Record>> {
        let start = day_start_micros(day);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM messages WHERE date_us >= ? ORDER BY id ASC LIMIT 1"
        );
        Ok(self.query_records(&sql, &[&start])?.into_iter().next())
    }
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore").finish_non_exhaustive()
    }
}

/// SQL predicate for a filter. Only static strings are interpolated.
fn filter_clause(filter: RecordFilter) -> String {
    match filter {
        RecordFilter::All => "TRUE".to_string(),
        RecordFilter::WithMedia(kind) => format!("media_kind = '{}'", kind.as_str()),
    }
}

fn day_start_micros(day: NaiveDate) -> i64 {
    day.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp_micros())
}

fn record_from_row(row: &Row<'_>) -> duckdb::Result<Record> {
    let id: i64 = row.get(0)?;
    let date_us: i64 = row.get(1)?;
    let media_kind: Option<String> = row.get(5)?;
    let media_blob_id: Option<i64> = row.get(6)?;
    let media_ext: Option<String> = row.get(7)?;

    let media = match (media_kind.as_deref().and_then(MediaKind::parse), media_blob_id) {
        (Some(kind), Some(blob_id)) => Some(MediaDescriptor::new(
            id,
            kind,
            blob_id,
            media_ext.unwrap_or_default(),
        )),
        _ => None,
    };

    Ok(Record {
        id,
        date: DateTime::<Utc>::from_timestamp_micros(date_us).unwrap_or_default(),
        author_id: row.get(2)?,
        text: row.get(3)?,
        reply_to: row.get(4)?,
        media,
    })
}

fn author_from_row(row: &Row<'_>) -> duckdb::Result<Author> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(1)?;
    let photo_blob_id: Option<i64> = row.get(3)?;
    let photo_ext: Option<String> = row.get(4)?;

    Ok(Author {
        id,
        kind: AuthorKind::parse(&kind),
        display_name: row.get(2)?,
        photo: photo_blob_id.map(|blob_id| {
            MediaDescriptor::new(
                id,
                MediaKind::ProfilePhoto,
                blob_id,
                photo_ext.unwrap_or_default(),
            )
        }),
    })
}
