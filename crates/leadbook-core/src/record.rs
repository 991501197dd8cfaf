//! Records and tables of nullable string fields.
//!
//! Every table in Leadbook is string-typed: scraped snapshots arrive as CSV and
//! the annotation columns are free text. A missing field and a null field read
//! the same through [`Record::get`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// One row: field name → nullable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from `(field, value)` pairs. Empty strings are kept as-is.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), Some(v.into())))
            .collect();
        Self { fields }
    }

    /// Builder-style setter.
    pub fn with(mut self, field: &str, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Value of `field`, or `None` when the field is null or absent.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn set(&mut self, field: &str, value: Option<String>) {
        self.fields.insert(field.to_string(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Non-null values, in field-name order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.values().filter_map(|v| v.as_deref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every field is null or the empty string.
    pub fn is_blank(&self) -> bool {
        self.fields
            .values()
            .all(|v| v.as_deref().is_none_or(str::is_empty))
    }

    /// True when at least one of `columns` is null, empty, or missing.
    pub fn has_empty_field<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns
            .iter()
            .any(|c| self.get(c.as_ref()).is_none_or(str::is_empty))
    }

    /// Identity value under `field`, if present and not blank.
    pub fn identity(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.trim().is_empty())
    }
}

/// A named table with an ordered column list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new<S: Into<String>>(name: impl Into<String>, columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.rows = rows;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All non-blank identity values under `field`.
    pub fn identities(&self, field: &str) -> HashSet<String> {
        self.rows
            .iter()
            .filter_map(|r| r.identity(field))
            .map(str::to_string)
            .collect()
    }

    /// Index of the first row whose `field` equals `value`.
    pub fn position(&self, field: &str, value: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.get(field) == Some(value))
    }

    /// Append `column` to the column list unless already present.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_null_read_the_same() {
        let mut rec = Record::new().with("Name", "X");
        rec.set("Phone", None);
        assert_eq!(rec.get("Phone"), None);
        assert_eq!(rec.get("Lead"), None);
        assert!(rec.contains("Phone"));
        assert!(!rec.contains("Lead"));
    }

    #[test]
    fn blank_detection() {
        let mut rec = Record::from_pairs([("a", ""), ("b", "")]);
        assert!(rec.is_blank());
        rec.set("c", None);
        assert!(rec.is_blank());
        rec.set("d", Some("x".into()));
        assert!(!rec.is_blank());
    }

    #[test]
    fn empty_field_detection_covers_missing_columns() {
        let rec = Record::from_pairs([("a", "1"), ("b", "2")]);
        assert!(!rec.has_empty_field(&["a", "b"]));
        assert!(rec.has_empty_field(&["a", "b", "c"]));
        let rec = rec.with("b", "");
        assert!(rec.has_empty_field(&["a", "b"]));
    }

    #[test]
    fn blank_identity_is_no_identity() {
        let rec = Record::from_pairs([("Name", "  ")]);
        assert_eq!(rec.identity("Name"), None);
        assert_eq!(rec.with("Name", "X").identity("Name"), Some("X"));
    }

    #[test]
    fn table_identities_and_position() {
        let table = Table::new("T", ["Name"]).with_rows(vec![
            Record::from_pairs([("Name", "A")]),
            Record::from_pairs([("Name", "")]),
            Record::from_pairs([("Name", "B")]),
        ]);
        let ids = table.identities("Name");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("A") && ids.contains("B"));
        assert_eq!(table.position("Name", "B"), Some(2));
        assert_eq!(table.position("Name", "C"), None);
    }

    #[test]
    fn record_serializes_as_flat_object() {
        let mut rec = Record::new().with("Name", "X");
        rec.set("Lead", None);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"Lead":null,"Name":"X"}"#);
    }
}
