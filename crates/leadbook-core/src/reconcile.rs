//! Derivation of entity tables from MainData, and annotation edits.
//!
//! # Derivation
//!
//! Every MainData row is projected twice, once per [`Role`]: all primary
//! projections first, then all opponent projections. Each projection is upserted
//! into the destination by identity:
//!
//! - structural fields (code, name, address, `scraped_date`) replace
//! - annotation fields (`PhoneNumber`, `Lead`, `Notes`) keep the destination's
//!   value when the identity was already stored, and start null otherwise
//!
//! Within one pass the same identity can be produced many times:
//!
//! - once an identity has a primary projection, opponent projections for it are
//!   skipped
//! - among projections of the same role, the newest valid scrape date wins; a
//!   projection with no valid date never displaces one that has a date; ties go
//!   to the row processed last
//!
//! Destination rows that MainData no longer mentions are kept as they are.
//! The result depends only on MainData and the destination's annotation
//! values, so running a derivation twice gives the same table.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::date::parse_scraped_date;
use crate::error::CoreError;
use crate::record::Record;
use crate::schema::{
    ANNOTATION_FIELDS, EntityKind, EntitySpec, LEAD, NOTES, PHONE_NUMBER, Role, SCRAPED_DATE,
};

/// New destination rows plus what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Derivation {
    pub rows: Vec<Record>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Projections that lost to a primary or to a newer snapshot.
    pub skipped: usize,
}

struct Slot {
    position: usize,
    original: Option<Record>,
    claim: Option<(Role, Option<NaiveDate>)>,
}

/// Rebuild the `kind` table from `main_rows` on top of its current `existing` rows.
pub fn derive_entities(main_rows: &[Record], existing: &[Record], kind: EntityKind) -> Derivation {
    let spec = kind.spec();
    let mut rows: Vec<Record> = Vec::with_capacity(existing.len());
    let mut slots: HashMap<String, Slot> = HashMap::new();

    for row in existing {
        let Some(identity) = row.identity(spec.name) else {
            rows.push(row.clone());
            continue;
        };
        if slots.contains_key(identity) {
            warn!(table = spec.table, identity, "collapsing duplicate stored identity");
            continue;
        }
        slots.insert(
            identity.to_string(),
            Slot {
                position: rows.len(),
                original: Some(row.clone()),
                claim: None,
            },
        );
        rows.push(row.clone());
    }

    let mut out = Derivation::default();
    for role in [Role::Primary, Role::Opponent] {
        for main in main_rows {
            let Some(candidate) = project(main, spec, role) else {
                continue;
            };
            let date = candidate.get(SCRAPED_DATE).and_then(parse_scraped_date);
            let identity = candidate.get(spec.name).unwrap_or_default().to_string();

            match slots.get_mut(&identity) {
                None => {
                    slots.insert(
                        identity,
                        Slot {
                            position: rows.len(),
                            original: None,
                            claim: Some((role, date)),
                        },
                    );
                    rows.push(candidate);
                }
                Some(slot) => {
                    if let Some((claimed_role, claimed_date)) = slot.claim {
                        let loses_to_primary =
                            claimed_role == Role::Primary && role == Role::Opponent;
                        if loses_to_primary || date < claimed_date {
                            out.skipped += 1;
                            continue;
                        }
                    }
                    merge_structural(&mut rows[slot.position], &candidate, spec);
                    slot.claim = Some((role, date));
                }
            }
        }
    }

    for slot in slots.values() {
        match &slot.original {
            None => out.inserted += 1,
            Some(before) if *before == rows[slot.position] => out.unchanged += 1,
            Some(_) => out.updated += 1,
        }
    }

    info!(
        table = spec.table,
        inserted = out.inserted,
        updated = out.updated,
        unchanged = out.unchanged,
        skipped = out.skipped,
        "derived entity table"
    );
    out.rows = rows;
    out
}

/// Project one MainData row through `role`'s mapping. `None` when the identity is blank.
fn project(main: &Record, spec: &EntitySpec, role: Role) -> Option<Record> {
    let mapping = spec.mapping(role);
    let name = main.identity(mapping.name)?;

    let mut record = Record::new();
    record.set(spec.code, mapping.code.and_then(|c| main.get(c)).map(str::to_string));
    record.set(spec.name, Some(name.to_string()));
    record.set(spec.address, main.get(mapping.address).map(str::to_string));
    for field in ANNOTATION_FIELDS {
        record.set(field, None);
    }
    record.set(SCRAPED_DATE, main.get(SCRAPED_DATE).map(str::to_string));
    Some(record)
}

fn merge_structural(target: &mut Record, incoming: &Record, spec: &EntitySpec) {
    for field in spec.structural_fields() {
        target.set(field, incoming.get(field).map(str::to_string));
    }
    for field in ANNOTATION_FIELDS {
        if !target.contains(field) {
            target.set(field, None);
        }
    }
}

/// A user edit of annotation fields on one entity row.
///
/// Deserializes from `{"identity": ..., "PhoneNumber": ..., "Lead": ..., "Notes": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationEdit {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(rename = "PhoneNumber", default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(rename = "Lead", default, skip_serializing_if = "Option::is_none")]
    pub lead: Option<String>,
    #[serde(rename = "Notes", default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AnnotationEdit {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            ..Default::default()
        }
    }

    pub fn phone_number(mut self, value: impl Into<String>) -> Self {
        self.phone_number = Some(value.into());
        self
    }

    pub fn lead(mut self, value: impl Into<String>) -> Self {
        self.lead = Some(value.into());
        self
    }

    pub fn notes(mut self, value: impl Into<String>) -> Self {
        self.notes = Some(value.into());
        self
    }

    fn changes(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (PHONE_NUMBER, self.phone_number.as_deref()),
            (LEAD, self.lead.as_deref()),
            (NOTES, self.notes.as_deref()),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field, v)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum EditOutcome {
    /// The row after the edit.
    Updated(Record),
    NotFound,
}

/// Apply `edit` to the matching row of `rows` in place.
///
/// Only the supplied annotation fields change. Nothing is modified when the
/// identity is missing or unknown, or when the edit carries no fields.
pub fn apply_annotation_edit(
    rows: &mut [Record],
    kind: EntityKind,
    edit: &AnnotationEdit,
) -> Result<EditOutcome, CoreError> {
    let identity = edit
        .identity
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(CoreError::MissingIdentity)?;
    if edit.changes().next().is_none() {
        return Err(CoreError::malformed("annotation edit carries no fields"));
    }

    let field = kind.identity_field();
    let Some(row) = rows.iter_mut().find(|r| r.get(field) == Some(identity)) else {
        info!(table = kind.table(), identity, "annotation target not found");
        return Ok(EditOutcome::NotFound);
    };
    for (name, value) in edit.changes() {
        row.set(name, Some(value.to_string()));
    }
    info!(table = kind.table(), identity, "applied annotation edit");
    Ok(EditOutcome::Updated(row.clone()))
}
