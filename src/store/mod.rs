//! Record store module
//!
//! Durable, keyed storage for synchronized records and their authors.
//!
//! # Overview
//!
//! - `RecordStore` - Trait the sync, media and export engines depend on
//! - `RecordScan` - Lazy batched iteration in identity order
//! - `DuckDbStore` - Embedded DuckDB implementation, one file per target
//! - `MemoryStore` - Map-backed implementation for tests
//!
//! # Example
//!
//! ```ignore
//! use chat_archiver::store::{DuckDbStore, RecordFilter, RecordScan, RecordStore, ScanOrder};
//!
//! let store = DuckDbStore::open("backups/101/backup.duckdb")?;
//! for record in RecordScan::new(&store, RecordFilter::All, ScanOrder::Ascending) {
//!     println!("{}", record?.text);
//! }
//! ```

mod database;
mod memory;
mod types;

pub use database::DuckDbStore;
pub use memory::MemoryStore;
pub use types::{RecordFilter, RecordScan, RecordStore, ScanOrder, DEFAULT_SCAN_BATCH};

#[cfg(test)]
mod tests;
