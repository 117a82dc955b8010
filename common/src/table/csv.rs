// CSV reader for enrichment tables

use super::Table;
use crate::errors::TableError;
use csv::ReaderBuilder;
use serde_json::Value;
use tracing::instrument;

/// Parse CSV bytes; the first record holds the headers
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn read_table(bytes: &[u8], delimiter: char) -> Result<Table, TableError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut table = Table::new(headers);

    for result in reader.records() {
        let record = result?;
        table.push_row(record.iter().map(field_value).collect());
    }

    Ok(table)
}

// Cells stay strings: ids like `00123` or 17-digit account numbers must
// reach the join untouched
fn field_value(field: &str) -> Value {
    if field.is_empty() {
        Value::Null
    } else {
        Value::String(field.to_string())
    }
}
