//! Terminal rendering for pages of rows and single entity records.

use arrow::util::pretty::pretty_format_batches;
use leadbook_core::schema::ANNOTATION_FIELDS;
use leadbook_core::{EntitySpec, Page, Record, batch};

const LATEST_COLUMN: &str = "Latest";
const MAX_CELL: usize = 48;

/// Print one page as a grid, flagging rows from the newest snapshot.
pub fn print_page(columns: &[String], page: &Page) -> anyhow::Result<()> {
    if page.rows.is_empty() {
        println!("(no rows)");
        return Ok(());
    }

    let mut header = Vec::with_capacity(columns.len() + 1);
    header.push(LATEST_COLUMN.to_string());
    header.extend(columns.iter().cloned());

    let rows: Vec<Record> = page
        .rows
        .iter()
        .map(|row| {
            let mut shown = Record::new();
            if row.latest {
                shown.set(LATEST_COLUMN, Some("*".to_string()));
            }
            for column in columns {
                shown.set(column, row.record.get(column).map(truncate));
            }
            shown
        })
        .collect();

    let batch = batch::to_record_batch(&header, &rows)?;
    println!("{}", pretty_format_batches(&[batch])?);
    println!(
        "page {}/{} ({} rows)",
        page.page,
        page.total_pages.max(1),
        page.total_rows
    );
    Ok(())
}

/// Print one entity row as a vertical card: scraped fields, then annotations.
pub fn print_entity_card(spec: &EntitySpec, record: &Record) {
    let name = record.get(spec.name).unwrap_or_default();
    println!("=== {name} ===");
    println!();
    print_section(record, spec.label, &spec.structural_fields());
    print_section(record, "Annotations", &ANNOTATION_FIELDS);
}

fn print_section(record: &Record, header: &str, fields: &[&str]) {
    if !fields.iter().any(|f| record.get(f).is_some()) {
        return;
    }
    println!("{header}");
    for &field in fields {
        if let Some(value) = record.get(field) {
            println!("  {:<26} {}", field, value);
        }
    }
    println!();
}

fn truncate(value: &str) -> String {
    if value.chars().count() > MAX_CELL {
        let head: String = value.chars().take(MAX_CELL - 3).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cells_are_shortened() {
        let long = "x".repeat(100);
        let short = truncate(&long);
        assert_eq!(short.chars().count(), MAX_CELL);
        assert!(short.ends_with("..."));
        assert_eq!(truncate("Acme"), "Acme");
    }

    #[test]
    fn multibyte_cells_truncate_on_char_boundaries() {
        let long = "é".repeat(60);
        assert!(truncate(&long).starts_with("éé"));
    }
}
