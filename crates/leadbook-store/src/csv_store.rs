//! File-backed repository: one `<table>.csv` per table in a data directory.
//!
//! Writes go to a temporary file in the same directory and are renamed over
//! the target, so readers see either the old or the new table, never a mix.
//! Empty cells read back as null.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use leadbook_core::{Record, Table, codec};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::repository::{Repository, upsert_in_table};
use crate::StoreError;

pub struct CsvStore {
    dir: PathBuf,
    // Serialises read-modify-write in `upsert_row`.
    write_lock: Mutex<()>,
}

impl CsvStore {
    /// Open a data directory, creating it when missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "opened csv store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `table`.
    pub fn table_path(&self, table: &str) -> Result<PathBuf, StoreError> {
        if table.is_empty() || table.contains(['/', '\\']) || table.starts_with('.') {
            return Err(StoreError::Other(format!("invalid table name: {table:?}")));
        }
        Ok(self.dir.join(format!("{table}.csv")))
    }

    async fn read(&self, name: &str) -> Result<Table, StoreError> {
        let path = self.table_path(name)?;
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::TableNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let parsed = codec::parse(&text, true)?;
        debug!(table = name, rows = parsed.rows.len(), "read csv table");
        Ok(Table {
            name: name.to_string(),
            columns: parsed.columns,
            rows: parsed.rows,
        })
    }

    async fn write(&self, table: &Table) -> Result<(), StoreError> {
        let path = self.table_path(&table.name)?;
        let text = codec::serialize(&table.columns, &table.rows)?;
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            use std::io::Write;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(text.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Other(format!("write task failed: {e}")))??;
        info!(table = %table.name, rows = table.len(), "wrote csv table");
        Ok(())
    }
}

#[async_trait]
impl Repository for CsvStore {
    async fn load_table(&self, name: &str) -> Result<Table, StoreError> {
        self.read(name).await
    }

    async fn upsert_row(
        &self,
        table: &str,
        identity_field: &str,
        record: &Record,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut current = match self.read(table).await {
            Ok(t) => t,
            Err(StoreError::TableNotFound(_)) => Table::new(table, Vec::<String>::new()),
            Err(e) => return Err(e),
        };
        upsert_in_table(&mut current, identity_field, record)?;
        self.write(&current).await
    }

    async fn replace_table(&self, table: &Table) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(table).await
    }
}
