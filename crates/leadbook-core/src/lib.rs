//! Core of Leadbook: records, CSV ingest, scrape dates and the reconciliation
//! of scraped opposition data into Agents and Proprietors tables.

pub mod batch;
pub mod codec;
pub mod date;
mod error;
pub mod ingest;
pub mod latest;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod view;

pub use date::parse_scraped_date;
pub use error::CoreError;
pub use ingest::{Ingested, normalize_headerless, normalize_upload};
pub use latest::{LatestSelector, latest_flags};
pub use reconcile::{AnnotationEdit, Derivation, EditOutcome, apply_annotation_edit, derive_entities};
pub use record::{Record, Table};
pub use schema::{EntityKind, EntitySpec, Role};
pub use view::{Page, SortDirection, SortKey, ViewQuery, ViewRow, select_page};
