//! Normalisation of uploaded CSV snapshots.
//!
//! Uploaded rows must be complete: a row is accepted only when its identity is
//! non-empty, every column has a value, and the identity is not already known.
//! Accepted rows keep their source order and are not touched afterwards.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::codec;
use crate::error::CoreError;
use crate::record::Record;

/// Accepted rows plus a tally of what was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ingested {
    pub columns: Vec<String>,
    pub accepted: Vec<Record>,
    pub missing_identity: usize,
    pub incomplete: usize,
    pub already_known: usize,
    pub repeated: usize,
}

impl Ingested {
    pub fn rejected(&self) -> usize {
        self.missing_identity + self.incomplete + self.already_known + self.repeated
    }
}

/// Parse `text` and keep only complete, previously unseen rows.
///
/// An identity that occurs twice in the same upload is accepted once (first
/// occurrence). Empty text and header-only text yield no rows. A header that
/// does not name `identity_field` is rejected as malformed.
pub fn normalize_upload(
    text: &str,
    identity_field: &str,
    known: &HashSet<String>,
) -> Result<Ingested, CoreError> {
    let parsed = codec::parse(text, true)?;
    normalize_rows(parsed.columns, parsed.rows, identity_field, known)
}

/// Like [`normalize_upload`] for rows without a header line, read in the
/// order of `columns`.
pub fn normalize_headerless<S: AsRef<str>>(
    text: &str,
    columns: &[S],
    identity_field: &str,
    known: &HashSet<String>,
) -> Result<Ingested, CoreError> {
    let rows = codec::parse_with_columns(text, columns)?;
    let columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
    normalize_rows(columns, rows, identity_field, known)
}

fn normalize_rows(
    columns: Vec<String>,
    rows: Vec<Record>,
    identity_field: &str,
    known: &HashSet<String>,
) -> Result<Ingested, CoreError> {
    let mut out = Ingested {
        columns,
        ..Default::default()
    };

    if out.columns.is_empty() {
        return Ok(out);
    }
    if !out.columns.iter().any(|c| c == identity_field) {
        return Err(CoreError::malformed(format!(
            "upload has no {identity_field:?} column"
        )));
    }

    let mut seen: HashSet<String> = HashSet::new();
    for (i, row) in rows.into_iter().enumerate() {
        let Some(identity) = row.identity(identity_field) else {
            debug!(row = i + 1, "dropping row without identity");
            out.missing_identity += 1;
            continue;
        };
        if row.has_empty_field(&out.columns) {
            debug!(row = i + 1, identity, "dropping incomplete row");
            out.incomplete += 1;
            continue;
        }
        if known.contains(identity) {
            out.already_known += 1;
            continue;
        }
        if !seen.insert(identity.to_string()) {
            out.repeated += 1;
            continue;
        }
        out.accepted.push(row);
    }

    info!(
        accepted = out.accepted.len(),
        rejected = out.rejected(),
        "normalised upload"
    );
    Ok(out)
}
