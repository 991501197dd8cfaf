//! DuckDB-backed repository.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{Connection, params_from_iter};
use leadbook_core::{CoreError, Record, Table, batch};
use tracing::{debug, info};

use crate::repository::Repository;
use crate::StoreError;

/// DuckDB store holding every table as `VARCHAR` columns.
///
/// Reads go through DuckDB's Arrow interface and are flattened into records.
/// Writes use prepared statements inside a transaction, so a failed
/// [`replace_table`](Repository::replace_table) leaves the old table in place.
/// Repository calls run on the blocking thread pool.
///
/// Supports both in-memory (ephemeral) and persistent (file-backed) modes.
/// Use [`open`](Self::open) for in-memory and [`open_persistent`](Self::open_persistent)
/// for file-backed storage that survives across process restarts.
pub struct DuckStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckStore {
    /// Open an in-memory DuckDB database.
    pub fn open() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened duckdb store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        lock(&self.conn)
    }

    /// Run `f` with the connection on tokio's blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Other(format!("duckdb task failed: {e}")))?
    }

    /// Whether `name` exists in the database.
    pub fn has_table(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        table_exists(&conn, name)
    }

    /// Number of rows in `name`.
    pub fn count_table(&self, name: &str) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        if !table_exists(&conn, name)? {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        let sql = format!("SELECT count(*)::BIGINT FROM {}", quote_ident(name));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Execute arbitrary SQL and return Arrow RecordBatches.
    pub fn query_arrow(&self, sql: &str) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        Ok(batches)
    }
}

#[async_trait]
impl Repository for DuckStore {
    async fn load_table(&self, name: &str) -> Result<Table, StoreError> {
        let name = name.to_string();
        self.blocking(move |conn| load(conn, &name)).await
    }

    async fn upsert_row(
        &self,
        table: &str,
        identity_field: &str,
        record: &Record,
    ) -> Result<(), StoreError> {
        let table = table.to_string();
        let identity_field = identity_field.to_string();
        let record = record.clone();
        self.blocking(move |conn| upsert(conn, &table, &identity_field, &record))
            .await
    }

    async fn replace_table(&self, table: &Table) -> Result<(), StoreError> {
        let table = table.clone();
        self.blocking(move |conn| replace(conn, &table)).await
    }
}

fn load(conn: &mut Connection, name: &str) -> Result<Table, StoreError> {
    if !table_exists(conn, name)? {
        return Err(StoreError::TableNotFound(name.to_string()));
    }
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_ident(name)))?;
    let result = stmt.query_arrow([])?;
    let columns = batch::column_names(&result.get_schema());
    let batches: Vec<RecordBatch> = result.collect();
    let rows = batch::from_record_batches(&batches)?;
    debug!(table = name, rows = rows.len(), "loaded duckdb table");
    Ok(Table {
        name: name.to_string(),
        columns,
        rows,
    })
}

fn replace(conn: &mut Connection, table: &Table) -> Result<(), StoreError> {
    if table.columns.is_empty() {
        return Err(StoreError::Other(format!(
            "table {} has no columns",
            table.name
        )));
    }
    let tx = conn.transaction()?;
    let column_defs: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} VARCHAR", quote_ident(c)))
        .collect();
    tx.execute_batch(&format!(
        "CREATE OR REPLACE TABLE {} ({})",
        quote_ident(&table.name),
        column_defs.join(", ")
    ))?;
    {
        let mut insert = tx.prepare(&insert_sql(&table.name, &table.columns))?;
        for row in &table.rows {
            insert.execute(params_from_iter(values(row, &table.columns)))?;
        }
    }
    tx.commit()?;
    info!(table = %table.name, rows = table.len(), "replaced duckdb table");
    Ok(())
}

fn upsert(
    conn: &mut Connection,
    table: &str,
    identity_field: &str,
    record: &Record,
) -> Result<(), StoreError> {
    let identity = record
        .identity(identity_field)
        .ok_or(CoreError::MissingIdentity)?
        .to_string();
    let fields: Vec<String> = record.fields().map(|(f, _)| f.to_string()).collect();

    let tx = conn.transaction()?;
    if table_exists(&tx, table)? {
        let existing = existing_columns(&tx, table)?;
        for field in fields.iter().filter(|f| !existing.contains(f)) {
            tx.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} VARCHAR",
                quote_ident(table),
                quote_ident(field)
            ))?;
        }
    } else {
        let defs: Vec<String> = fields
            .iter()
            .map(|c| format!("{} VARCHAR", quote_ident(c)))
            .collect();
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(table),
            defs.join(", ")
        ))?;
    }

    let assignments: Vec<String> = fields
        .iter()
        .map(|c| format!("{} = ?", quote_ident(c)))
        .collect();
    let update = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_ident(table),
        assignments.join(", "),
        quote_ident(identity_field)
    );
    let mut params = values(record, &fields);
    params.push(Some(identity));
    let changed = tx.execute(&update, params_from_iter(params))?;
    if changed == 0 {
        tx.execute(
            &insert_sql(table, &fields),
            params_from_iter(values(record, &fields)),
        )?;
    }
    tx.commit()?;
    Ok(())
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|e| StoreError::Other(format!("mutex poisoned: {e}")))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_ident(table),
        names.join(", ")
    )
}

fn values(record: &Record, columns: &[String]) -> Vec<Option<String>> {
    columns
        .iter()
        .map(|c| record.get(c).map(str::to_string))
        .collect()
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn.query_row(
        "SELECT count(*)::BIGINT FROM information_schema.tables WHERE table_name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn existing_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
