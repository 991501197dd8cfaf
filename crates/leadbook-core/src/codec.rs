//! CSV text ↔ records.
//!
//! Comma separated with a header row and standard quoting. Empty cells decode
//! as null, and null encodes as an empty cell, so a round trip through CSV does
//! not distinguish the two. Blank lines are skipped; a line holding a quoted
//! empty cell (`""`) is a row.

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::CoreError;
use crate::record::Record;

/// Result of parsing CSV text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

/// Parse CSV text.
///
/// With `has_header`, the first line names the columns. Otherwise columns are
/// named `column_1..column_n` after the widest row. Short rows get null
/// trailing fields; fields past the last column are dropped.
pub fn parse(text: &str, has_header: bool) -> Result<Parsed, CoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut columns: Vec<String> = if has_header {
        reader.headers()?.iter().map(str::to_string).collect()
    } else {
        Vec::new()
    };

    let raw = reader.records().collect::<Result<Vec<_>, _>>()?;

    if !has_header {
        let width = raw.iter().map(StringRecord::len).max().unwrap_or(0);
        columns = (1..=width).map(|i| format!("column_{i}")).collect();
    }

    let rows = raw.iter().map(|r| to_record(&columns, r)).collect();
    Ok(Parsed { columns, rows })
}

/// Parse headerless CSV onto a known column list.
pub fn parse_with_columns<S: AsRef<str>>(
    text: &str,
    columns: &[S],
) -> Result<Vec<Record>, CoreError> {
    let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        rows.push(to_record(&columns, &result?));
    }
    Ok(rows)
}

/// Serialize rows under `columns`, header first.
pub fn serialize<S: AsRef<str>>(columns: &[S], rows: &[Record]) -> Result<String, CoreError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.as_ref()))?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| row.get(c.as_ref()).unwrap_or("")))?;
    }
    finish(writer)
}

/// Serialize a projection of `rows`: `(field, header label)` pairs pick and
/// rename columns.
pub fn export<S: AsRef<str>>(rows: &[Record], columns: &[(S, String)]) -> Result<String, CoreError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns.iter().map(|(_, label)| label.as_str()))?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|(field, _)| row.get(field.as_ref()).unwrap_or("")),
        )?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, CoreError> {
    let bytes = writer
        .into_inner()
        .map_err(|e| CoreError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| CoreError::malformed(e.to_string()))
}

fn to_record(columns: &[String], raw: &StringRecord) -> Record {
    let mut record = Record::new();
    for (i, column) in columns.iter().enumerate() {
        let value = raw.get(i).filter(|v| !v.is_empty()).map(str::to_string);
        record.set(column, value);
    }
    record
}
