//! Search, sort and pagination over a table, as shown by the browser.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::latest::LatestSelector;
use crate::record::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewQuery {
    pub search: Option<String>,
    pub sort: Option<SortKey>,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: None,
            page: 1,
            per_page: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    pub record: Record,
    pub latest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub rows: Vec<ViewRow>,
    pub page: usize,
    pub per_page: usize,
    pub total_rows: usize,
    pub total_pages: usize,
}

/// Filter, sort and slice `rows` for display.
///
/// Blank rows are never shown. The `latest` flag is computed over the whole
/// table, not just the matching rows.
pub fn select_page(rows: &[Record], query: &ViewQuery) -> Page {
    let selector = LatestSelector::new(rows);
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut matching: Vec<&Record> = rows
        .iter()
        .filter(|r| !r.is_blank())
        .filter(|r| needle.as_deref().is_none_or(|n| matches_search(r, n)))
        .collect();

    if let Some(sort) = &query.sort {
        matching.sort_by(|a, b| compare(a, b, sort));
    }

    let per_page = query.per_page.max(1);
    let page = query.page.max(1);
    let total_rows = matching.len();
    let total_pages = total_rows.div_ceil(per_page);

    let rows = matching
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .map(|r| ViewRow {
            record: r.clone(),
            latest: selector.is_latest(r),
        })
        .collect();

    Page {
        rows,
        page,
        per_page,
        total_rows,
        total_pages,
    }
}

fn matches_search(row: &Record, needle: &str) -> bool {
    row.values().any(|v| v.to_lowercase().contains(needle))
}

fn compare(a: &Record, b: &Record, key: &SortKey) -> Ordering {
    let ord = a.get(&key.column).cmp(&b.get(&key.column));
    match key.direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

/// Drop rows whose every field is empty. Returns how many were removed.
pub fn remove_blank_rows(rows: &mut Vec<Record>) -> usize {
    let before = rows.len();
    rows.retain(|r| !r.is_blank());
    before - rows.len()
}
