//! Records ↔ Arrow `RecordBatch`.
//!
//! Tables are string-typed, so a batch is a set of `Utf8` columns. Reading
//! casts any column type to `Utf8` first, which lets query engines hand back
//! integers or dates without special handling here.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::CoreError;
use crate::record::Record;
use crate::schema::utf8_schema;

/// Build a single batch holding `rows` under `columns`.
pub fn to_record_batch<S: AsRef<str>>(
    columns: &[S],
    rows: &[Record],
) -> Result<RecordBatch, CoreError> {
    let schema = utf8_schema(columns);
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|c| {
            let values: StringArray = rows.iter().map(|r| r.get(c.as_ref())).collect();
            Arc::new(values) as ArrayRef
        })
        .collect();
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Column names of a schema, in order.
pub fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Flatten batches into records. Arrow nulls become null fields.
pub fn from_record_batches(batches: &[RecordBatch]) -> Result<Vec<Record>, CoreError> {
    let mut rows = Vec::new();
    for batch in batches {
        let schema = batch.schema();
        let columns: Vec<StringArray> = batch
            .columns()
            .iter()
            .map(|col| {
                let utf8 = cast(col.as_ref(), &DataType::Utf8)?;
                utf8.as_any()
                    .downcast_ref::<StringArray>()
                    .cloned()
                    .ok_or_else(|| CoreError::malformed("column did not cast to Utf8"))
            })
            .collect::<Result<_, CoreError>>()?;

        for i in 0..batch.num_rows() {
            let mut record = Record::new();
            for (field, col) in schema.fields().iter().zip(&columns) {
                let value = (!col.is_null(i)).then(|| col.value(i).to_string());
                record.set(field.name(), value);
            }
            rows.push(record);
        }
    }
    Ok(rows)
}
