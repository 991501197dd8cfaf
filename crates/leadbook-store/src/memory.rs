//! In-process repository.

use std::collections::HashMap;

use async_trait::async_trait;
use leadbook_core::{Record, Table};
use tokio::sync::RwLock;

use crate::repository::{Repository, upsert_in_table};
use crate::StoreError;

/// Tables held in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with tables, keyed by their names.
    pub fn with_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let tables = tables.into_iter().map(|t| (t.name.clone(), t)).collect();
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn load_table(&self, name: &str) -> Result<Table, StoreError> {
        self.tables
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    async fn upsert_row(
        &self,
        table: &str,
        identity_field: &str,
        record: &Record,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let mut updated = tables
            .get(table)
            .cloned()
            .unwrap_or_else(|| Table::new(table, Vec::<String>::new()));
        upsert_in_table(&mut updated, identity_field, record)?;
        tables.insert(table.to_string(), updated);
        Ok(())
    }

    async fn replace_table(&self, table: &Table) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .insert(table.name.clone(), table.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_table() {
        let store = MemoryStore::new();
        let err = store.load_table("Agents").await.unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(_)));
        let empty = store.load_or_empty("Agents", &["AgentName"]).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.columns, vec!["AgentName"]);
    }

    #[tokio::test]
    async fn replace_then_load() {
        let store = MemoryStore::new();
        let table = Table::new("T", ["Name"]).with_rows(vec![Record::new().with("Name", "A")]);
        store.replace_table(&table).await.unwrap();
        assert_eq!(store.load_table("T").await.unwrap(), table);
    }

    #[tokio::test]
    async fn upsert_replaces_by_identity() {
        let store = MemoryStore::with_tables([Table::new("T", ["Name", "Lead"]).with_rows(vec![
            Record::from_pairs([("Name", "A"), ("Lead", "cold")]),
            Record::from_pairs([("Name", "B"), ("Lead", "cold")]),
        ])]);
        let row = Record::from_pairs([("Name", "B"), ("Lead", "hot")]);
        store.upsert_row("T", "Name", &row).await.unwrap();
        store
            .upsert_row("T", "Name", &Record::from_pairs([("Name", "C")]))
            .await
            .unwrap();

        let table = store.load_table("T").await.unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[1].get("Lead"), Some("hot"));
        assert_eq!(table.rows[2].get("Name"), Some("C"));
    }

    #[tokio::test]
    async fn upsert_without_identity_writes_nothing() {
        let store = MemoryStore::with_tables([Table::new("T", ["Name"])]);
        let err = store
            .upsert_row("T", "Name", &Record::new().with("Lead", "x"))
            .await
            .unwrap_err();
        assert!(err.is_malformed_input());
        assert!(store.load_table("T").await.unwrap().is_empty());
    }
}
