//! Persistent table access.

use async_trait::async_trait;
use leadbook_core::{Record, Table};

use crate::StoreError;

/// Narrow storage interface the service is written against.
///
/// Implementations replace tables atomically: a failed `replace_table` leaves
/// the previous content readable.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Load a whole table. Unknown tables are [`StoreError::TableNotFound`].
    async fn load_table(&self, name: &str) -> Result<Table, StoreError>;

    /// Replace the row whose `identity_field` matches `record`'s, or append it.
    ///
    /// Creates the table when missing, with `record`'s fields as columns.
    async fn upsert_row(
        &self,
        table: &str,
        identity_field: &str,
        record: &Record,
    ) -> Result<(), StoreError>;

    /// Overwrite a table (columns and rows), creating it when missing.
    async fn replace_table(&self, table: &Table) -> Result<(), StoreError>;

    /// Load a table, or an empty one with `columns` when it does not exist yet.
    async fn load_or_empty(&self, name: &str, columns: &[&str]) -> Result<Table, StoreError> {
        match self.load_table(name).await {
            Ok(table) => Ok(table),
            Err(StoreError::TableNotFound(_)) => Ok(Table::new(name, columns.iter().copied())),
            Err(e) => Err(e),
        }
    }
}

/// Upsert into an in-memory table: shared by backends that store whole tables.
pub(crate) fn upsert_in_table(table: &mut Table, identity_field: &str, record: &Record) -> Result<(), StoreError> {
    let identity = record
        .identity(identity_field)
        .ok_or(leadbook_core::CoreError::MissingIdentity)?;
    for (field, _) in record.fields() {
        table.ensure_column(field);
    }
    match table.position(identity_field, identity) {
        Some(i) => table.rows[i] = record.clone(),
        None => table.rows.push(record.clone()),
    }
    Ok(())
}
