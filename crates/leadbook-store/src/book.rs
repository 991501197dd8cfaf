//! The Leadbook service: every user-facing operation over a [`Repository`].
//!
//! Each write computes the complete new table in memory and hands it to the
//! repository in one call, so a failing step never leaves a half-written
//! table. Writes to the same table are serialised through [`TableLocks`];
//! when an operation needs two tables it always takes MainData first.

use std::collections::HashSet;

use leadbook_core::schema::{MAIN_DATA_TABLE, MAIN_IDENTITY};
use leadbook_core::{
    AnnotationEdit, CoreError, EditOutcome, EntityKind, Ingested, Page, Table, ViewQuery,
    apply_annotation_edit, codec, derive_entities, normalize_headerless, normalize_upload,
    select_page, view,
};
use serde::Serialize;
use tracing::info;

use crate::locks::TableLocks;
use crate::repository::Repository;
use crate::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub missing_identity: usize,
    pub incomplete: usize,
    pub already_known: usize,
    pub repeated: usize,
    /// MainData size after the upload.
    pub total_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeriveReport {
    pub table: String,
    pub rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

pub struct LeadBook<R> {
    repo: R,
    locks: TableLocks,
}

impl<R: Repository> LeadBook<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            locks: TableLocks::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Load any table.
    pub async fn table(&self, name: &str) -> Result<Table, StoreError> {
        self.repo.load_table(name).await
    }

    /// Replace MainData with the content of a full CSV snapshot.
    pub async fn import_main_data(&self, text: &str) -> Result<usize, StoreError> {
        let parsed = codec::parse(text, true)?;
        if parsed.columns.is_empty() {
            return Err(CoreError::malformed("snapshot has no header row").into());
        }
        let table = Table {
            name: MAIN_DATA_TABLE.to_string(),
            columns: parsed.columns,
            rows: parsed.rows,
        };

        let _guard = self.locks.acquire(MAIN_DATA_TABLE).await;
        self.repo.replace_table(&table).await?;
        info!(rows = table.len(), "imported main data snapshot");
        Ok(table.len())
    }

    /// Append the complete, previously unseen rows of an uploaded CSV to MainData.
    pub async fn ingest_main_data(&self, text: &str) -> Result<IngestReport, StoreError> {
        self.append_upload(|_, known| normalize_upload(text, MAIN_IDENTITY, known))
            .await
    }

    /// Like [`ingest_main_data`](Self::ingest_main_data) for rows without a
    /// header line, read in MainData's current column order.
    pub async fn append_main_data(&self, text: &str) -> Result<IngestReport, StoreError> {
        self.append_upload(|main, known| {
            if main.columns.is_empty() {
                return Err(CoreError::malformed(
                    "header-less rows need an existing MainData table",
                ));
            }
            normalize_headerless(text, &main.columns, MAIN_IDENTITY, known)
        })
        .await
    }

    async fn append_upload<F>(&self, normalize: F) -> Result<IngestReport, StoreError>
    where
        F: FnOnce(&Table, &HashSet<String>) -> Result<Ingested, CoreError>,
    {
        let _guard = self.locks.acquire(MAIN_DATA_TABLE).await;
        let mut main = self.repo.load_or_empty(MAIN_DATA_TABLE, &[]).await?;
        let known = main.identities(MAIN_IDENTITY);
        let ingested = normalize(&main, &known)?;

        let mut report = IngestReport {
            accepted: ingested.accepted.len(),
            missing_identity: ingested.missing_identity,
            incomplete: ingested.incomplete,
            already_known: ingested.already_known,
            repeated: ingested.repeated,
            total_rows: main.len(),
        };
        if ingested.accepted.is_empty() {
            return Ok(report);
        }

        for column in &ingested.columns {
            main.ensure_column(column);
        }
        main.rows.extend(ingested.accepted);
        self.repo.replace_table(&main).await?;
        report.total_rows = main.len();
        info!(
            accepted = report.accepted,
            total = report.total_rows,
            "appended upload to main data"
        );
        Ok(report)
    }

    /// Rebuild the `kind` table from MainData, keeping annotations.
    pub async fn derive(&self, kind: EntityKind) -> Result<DeriveReport, StoreError> {
        let spec = kind.spec();
        let _main_guard = self.locks.acquire(MAIN_DATA_TABLE).await;
        let _guard = self.locks.acquire(spec.table).await;

        let main = self.repo.load_or_empty(MAIN_DATA_TABLE, &[]).await?;
        let dest = self.repo.load_or_empty(spec.table, &spec.columns()).await?;
        let derivation = derive_entities(&main.rows, &dest.rows, kind);

        let mut table = Table::new(spec.table, spec.columns());
        for column in &dest.columns {
            table.ensure_column(column);
        }
        table.rows = derivation.rows;
        self.repo.replace_table(&table).await?;

        Ok(DeriveReport {
            table: spec.table.to_string(),
            rows: table.len(),
            inserted: derivation.inserted,
            updated: derivation.updated,
            unchanged: derivation.unchanged,
            skipped: derivation.skipped,
        })
    }

    /// Derive every entity table.
    pub async fn derive_all(&self) -> Result<Vec<DeriveReport>, StoreError> {
        let mut reports = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            reports.push(self.derive(kind).await?);
        }
        Ok(reports)
    }

    /// Apply a user edit to one entity row. Unknown identities write nothing.
    pub async fn annotate(
        &self,
        kind: EntityKind,
        edit: &AnnotationEdit,
    ) -> Result<EditOutcome, StoreError> {
        let spec = kind.spec();
        let _guard = self.locks.acquire(spec.table).await;
        let mut table = self.repo.load_or_empty(spec.table, &spec.columns()).await?;

        let outcome = apply_annotation_edit(&mut table.rows, kind, edit)?;
        if let EditOutcome::Updated(record) = &outcome {
            self.repo.upsert_row(spec.table, kind.identity_field(), record).await?;
        }
        Ok(outcome)
    }

    /// Delete rows whose every field is empty. Returns the number removed.
    pub async fn clean_blank_rows(&self, name: &str) -> Result<usize, StoreError> {
        let _guard = self.locks.acquire(name).await;
        let mut table = self.repo.load_table(name).await?;
        let removed = view::remove_blank_rows(&mut table.rows);
        if removed > 0 {
            self.repo.replace_table(&table).await?;
            info!(table = name, removed, "removed blank rows");
        }
        Ok(removed)
    }

    /// One page of a table for display.
    pub async fn view(&self, name: &str, query: &ViewQuery) -> Result<Page, StoreError> {
        let table = self.repo.load_table(name).await?;
        Ok(select_page(&table.rows, query))
    }

    /// CSV export. Entity tables use their export layout; others export every column.
    pub async fn export(&self, name: &str) -> Result<String, StoreError> {
        let table = self.repo.load_table(name).await?;
        let text = match EntityKind::from_table(name) {
            Some(kind) => codec::export(&table.rows, &kind.spec().export_columns())?,
            None => codec::serialize(&table.columns, &table.rows)?,
        };
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CsvStore, MemoryStore};
    use leadbook_core::schema::{PHONE_NUMBER, SCRAPED_DATE};
    use leadbook_core::{Record, SortKey};
    use std::sync::Arc;

    const HEADER: &str = "Opposition Number,Agent Code,Agent Name,Agent Address,\
Opponent Agent Name,Opponent Agent Address,Proprietor Code,Proprietor Name,\
Proprietor Address,Opponent Code,Opponent Name,Opponent Address,scraped_date";

    fn upload(rows: &[&str]) -> String {
        let mut text = format!("{HEADER}\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    fn book() -> LeadBook<MemoryStore> {
        LeadBook::new(MemoryStore::new())
    }

    fn agent<'a>(table: &'a Table, name: &str) -> &'a Record {
        &table.rows[table.position("AgentName", name).unwrap()]
    }

    const ROW_1: &str = "1,A1,X,addr1,Y,addr2,P1,Acme,pa,P2,Globex,pb,01/01/2024";
    const ROW_2: &str = "2,A2,Z,addr3,X,addr4,P3,Initech,pc,P1,Acme,pd,15/03/2024";

    #[tokio::test]
    async fn ingest_appends_only_new_complete_rows() {
        let book = book();
        let first = book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        assert_eq!(first.accepted, 1);
        assert_eq!(first.total_rows, 1);

        let second = book
            .ingest_main_data(&upload(&[ROW_1, ROW_2, "3,,,,,,,,,,,,"]))
            .await
            .unwrap();
        assert_eq!(second.accepted, 1);
        assert_eq!(second.already_known, 1);
        assert_eq!(second.incomplete, 1);
        assert_eq!(second.total_rows, 2);
    }

    #[tokio::test]
    async fn ingest_of_header_only_writes_nothing() {
        let book = book();
        let report = book.ingest_main_data(&upload(&[])).await.unwrap();
        assert_eq!(report.accepted, 0);
        assert!(matches!(
            book.table(MAIN_DATA_TABLE).await,
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn malformed_upload_leaves_main_data_alone() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        let err = book.ingest_main_data("Agent Name\nX\n").await.unwrap_err();
        assert!(err.is_malformed_input());
        assert_eq!(book.table(MAIN_DATA_TABLE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn headerless_rows_append_in_main_data_column_order() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        let report = book
            .append_main_data(&format!("{ROW_1}\n{ROW_2}\n"))
            .await
            .unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.already_known, 1);
        assert_eq!(report.total_rows, 2);

        let main = book.table(MAIN_DATA_TABLE).await.unwrap();
        assert_eq!(main.rows[1].get("Agent Name"), Some("Z"));
        assert_eq!(main.rows[1].get(SCRAPED_DATE), Some("15/03/2024"));
    }

    #[tokio::test]
    async fn headerless_rows_need_existing_main_data() {
        let err = book().append_main_data(ROW_1).await.unwrap_err();
        assert!(err.is_malformed_input());
    }

    #[tokio::test]
    async fn derive_agents_from_single_row() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        let report = book.derive(EntityKind::Agent).await.unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.inserted, 2);

        let agents = book.table("Agents").await.unwrap();
        assert_eq!(agents.columns, EntityKind::Agent.spec().columns().to_vec());
        for name in ["X", "Y"] {
            let row = agent(&agents, name);
            assert_eq!(row.get(PHONE_NUMBER), None);
            assert_eq!(row.get("Lead"), None);
            assert_eq!(row.get("Notes"), None);
        }
    }

    #[tokio::test]
    async fn annotation_survives_rederive_and_new_snapshot() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        book.derive(EntityKind::Agent).await.unwrap();

        let edit = AnnotationEdit::new("X").phone_number("555");
        let outcome = book.annotate(EntityKind::Agent, &edit).await.unwrap();
        assert!(matches!(outcome, EditOutcome::Updated(_)));

        book.derive(EntityKind::Agent).await.unwrap();
        let agents = book.table("Agents").await.unwrap();
        assert_eq!(agent(&agents, "X").get(PHONE_NUMBER), Some("555"));

        // X appears again, as primary in ROW_1 and opponent in ROW_2.
        book.ingest_main_data(&upload(&[ROW_2])).await.unwrap();
        let report = book.derive(EntityKind::Agent).await.unwrap();
        assert_eq!(report.inserted, 1);
        let agents = book.table("Agents").await.unwrap();
        let x = agent(&agents, "X");
        assert_eq!(x.get(PHONE_NUMBER), Some("555"));
        assert_eq!(x.get("AgentAddress"), Some("addr1"));
        assert_eq!(agents.len(), 3);
    }

    #[tokio::test]
    async fn derive_twice_is_stable() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1, ROW_2])).await.unwrap();
        book.derive_all().await.unwrap();
        let agents = book.table("Agents").await.unwrap();
        let proprietors = book.table("Proprietors").await.unwrap();

        let reports = book.derive_all().await.unwrap();
        assert!(reports.iter().all(|r| r.inserted == 0 && r.updated == 0));
        assert_eq!(book.table("Agents").await.unwrap(), agents);
        assert_eq!(book.table("Proprietors").await.unwrap(), proprietors);
    }

    #[tokio::test]
    async fn proprietor_primary_beats_opponent() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1, ROW_2])).await.unwrap();
        book.derive(EntityKind::Proprietor).await.unwrap();
        let table = book.table("Proprietors").await.unwrap();
        let acme = &table.rows[table.position("ProprietorName", "Acme").unwrap()];
        assert_eq!(acme.get("ProprietorAddress"), Some("pa"));
        assert_eq!(acme.get(SCRAPED_DATE), Some("01/01/2024"));
        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn derive_over_empty_main_data() {
        let book = book();
        let report = book.derive(EntityKind::Agent).await.unwrap();
        assert_eq!(report.rows, 0);
        assert!(book.table("Agents").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn annotate_unknown_identity_leaves_table_unchanged() {
        let tmp = tempfile::TempDir::new().unwrap();
        let book = LeadBook::new(CsvStore::open(tmp.path()).await.unwrap());
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        book.derive(EntityKind::Agent).await.unwrap();

        let path = book.repository().table_path("Agents").unwrap();
        let before = std::fs::read(&path).unwrap();
        let edit = AnnotationEdit::new("nonexistent").phone_number("1");
        let outcome = book.annotate(EntityKind::Agent, &edit).await.unwrap();
        assert_eq!(outcome, EditOutcome::NotFound);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_annotate_and_derive_keep_every_edit() {
        let tmp = tempfile::TempDir::new().unwrap();
        let book = Arc::new(LeadBook::new(CsvStore::open(tmp.path()).await.unwrap()));
        let rows: Vec<String> = (0..40)
            .map(|i| {
                format!("{i},A{i},Agent{i},addr{i},Opp{i},oaddr{i},P{i},Prop{i},pa,Q{i},Other{i},pb,01/01/2024")
            })
            .collect();
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        book.ingest_main_data(&upload(&rows)).await.unwrap();
        book.derive(EntityKind::Agent).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..40 {
            let annotating = Arc::clone(&book);
            tasks.push(tokio::spawn(async move {
                let edit = AnnotationEdit::new(format!("Agent{i}")).phone_number("555");
                annotating.annotate(EntityKind::Agent, &edit).await.map(|_| ())
            }));
            let deriving = Arc::clone(&book);
            tasks.push(tokio::spawn(async move {
                deriving.derive(EntityKind::Agent).await.map(|_| ())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let agents = book.table("Agents").await.unwrap();
        assert_eq!(agents.len(), 80);
        for i in 0..40 {
            let name = format!("Agent{i}");
            assert_eq!(agent(&agents, &name).get(PHONE_NUMBER), Some("555"), "{name}");
        }
    }

    #[tokio::test]
    async fn annotate_without_identity_is_rejected() {
        let book = book();
        let edit = AnnotationEdit {
            lead: Some("hot".into()),
            ..Default::default()
        };
        let err = book.annotate(EntityKind::Agent, &edit).await.unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::MissingIdentity)));
    }

    #[tokio::test]
    async fn csv_backed_round_trip_of_whole_flow() {
        let tmp = tempfile::TempDir::new().unwrap();
        let book = LeadBook::new(CsvStore::open(tmp.path()).await.unwrap());
        book.ingest_main_data(&upload(&[ROW_1, ROW_2])).await.unwrap();
        book.derive(EntityKind::Agent).await.unwrap();
        book.annotate(EntityKind::Agent, &AnnotationEdit::new("Y").notes("called, no answer"))
            .await
            .unwrap();
        book.derive(EntityKind::Agent).await.unwrap();

        let agents = book.table("Agents").await.unwrap();
        assert_eq!(agent(&agents, "Y").get("Notes"), Some("called, no answer"));
        assert_eq!(agent(&agents, "Y").get(PHONE_NUMBER), None);
    }

    #[tokio::test]
    async fn clean_removes_blank_rows() {
        let store = MemoryStore::with_tables([Table::new(MAIN_DATA_TABLE, ["a", "b"]).with_rows(vec![
            Record::from_pairs([("a", "1"), ("b", "2")]),
            Record::from_pairs([("a", ""), ("b", "")]),
        ])]);
        let book = LeadBook::new(store);
        assert_eq!(book.clean_blank_rows(MAIN_DATA_TABLE).await.unwrap(), 1);
        assert_eq!(book.clean_blank_rows(MAIN_DATA_TABLE).await.unwrap(), 0);
        assert_eq!(book.table(MAIN_DATA_TABLE).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn view_marks_latest_snapshot() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1, ROW_2])).await.unwrap();
        let query = ViewQuery {
            sort: Some(SortKey::asc("Opposition Number")),
            ..Default::default()
        };
        let page = book.view(MAIN_DATA_TABLE, &query).await.unwrap();
        let flags: Vec<bool> = page.rows.iter().map(|r| r.latest).collect();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn export_uses_entity_layout() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1])).await.unwrap();
        book.derive(EntityKind::Agent).await.unwrap();
        let text = book.export("Agents").await.unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Agent Name,Agent Address,Agent Code,Scraped Date,PhoneNumber,Lead,Notes")
        );
        assert_eq!(lines.next(), Some("X,addr1,A1,01/01/2024,,,"));
    }

    #[tokio::test]
    async fn import_replaces_main_data() {
        let book = book();
        book.ingest_main_data(&upload(&[ROW_1, ROW_2])).await.unwrap();
        let count = book.import_main_data(&upload(&[ROW_2])).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(book.table(MAIN_DATA_TABLE).await.unwrap().len(), 1);
        assert!(book.import_main_data("").await.unwrap_err().is_malformed_input());
    }
}
