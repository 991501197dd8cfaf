//! Table storage for Leadbook and the service that runs every operation on it.
//!
//! Backends implement [`Repository`]: [`MemoryStore`] for tests and scratch
//! work, [`CsvStore`] for a directory of CSV files, and `DuckStore` (feature
//! `duckdb`) for a single DuckDB database file.

mod book;
mod csv_store;
mod error;
mod locks;
mod memory;
mod repository;

pub use book::{DeriveReport, IngestReport, LeadBook};
pub use csv_store::CsvStore;
pub use error::StoreError;
pub use locks::TableLocks;
pub use memory::MemoryStore;
pub use repository::Repository;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
