// Excel reader/writer for enrichment tables

use super::Table;
use crate::errors::TableError;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::{json, Value};
use std::io::Cursor;
use tracing::{debug, instrument};

/// Parse the first worksheet of a workbook; its first row holds the headers
#[instrument(skip(bytes), fields(size = bytes.len()))]
pub fn read_table(bytes: &[u8]) -> Result<Table, TableError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook: Sheets<_> = open_workbook_auto_from_rs(cursor)?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(TableError::NoWorksheet)?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let table = parse_range(&range);
    debug!(
        sheet = %sheet_name,
        rows = table.len(),
        columns = table.headers.len(),
        "Parsed worksheet"
    );
    Ok(table)
}

fn parse_range(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| match cell {
                Data::Empty => format!("Unnamed: {}", i),
                other => other.to_string(),
            })
            .collect(),
        None => return Table::default(),
    };

    let mut table = Table::new(headers);
    for row in rows {
        table.push_row(row.iter().map(cell_value).collect());
    }
    table
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => json!(i),
        Data::Float(f) => json!(f),
        Data::String(s) => json!(s),
        Data::Bool(b) => json!(b),
        Data::DateTime(dt) => json!(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => json!(s),
        Data::Error(e) => json!(format!("ERROR: {:?}", e)),
        _ => Value::Null,
    }
}

/// Serialize a table to an XLSX workbook with a bold header row
#[instrument(skip(table), fields(rows = table.len()))]
pub fn write_table(table: &Table) -> Result<Vec<u8>, TableError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Sheet1")?;

    let header_format = Format::new().set_bold();
    for (col_idx, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col_idx as u16, header, &header_format)?;
    }

    for (row_idx, row) in table.rows.iter().enumerate() {
        write_row(worksheet, row_idx as u32 + 1, row)?;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_row(worksheet: &mut Worksheet, row_num: u32, row: &[Value]) -> Result<(), TableError> {
    for (col_idx, cell) in row.iter().enumerate() {
        let col_num = col_idx as u16;
        match cell {
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    worksheet.write_number(row_num, col_num, f)?;
                }
            }
            Value::String(s) => {
                worksheet.write_string(row_num, col_num, s)?;
            }
            Value::Bool(b) => {
                worksheet.write_boolean(row_num, col_num, *b)?;
            }
            Value::Null => {}
            other => {
                worksheet.write_string(row_num, col_num, other.to_string())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(vec![
            "Client Id".to_string(),
            "Reason".to_string(),
            "Resubmitted".to_string(),
        ]);
        table.push_row(vec![json!("1001"), json!("Missing KYC"), json!(false)]);
        table.push_row(vec![json!(1002.0), Value::Null, json!(true)]);
        table
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let bytes = write_table(&sample()).unwrap();
        let table = read_table(&bytes).unwrap();

        assert_eq!(table.headers, vec!["Client Id", "Reason", "Resubmitted"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], json!("1001"));
        assert_eq!(table.rows[1][0], json!(1002.0));
        assert_eq!(table.rows[1][1], Value::Null);
        assert_eq!(table.rows[1][2], json!(true));
    }

    #[test]
    fn test_header_only_table() {
        let table = Table::new(vec!["Client Id".to_string()]);
        let bytes = write_table(&table).unwrap();
        let read = read_table(&bytes).unwrap();
        assert_eq!(read.headers, vec!["Client Id"]);
        assert!(read.is_empty());
    }

    #[test]
    fn test_garbage_bytes_fail_to_parse() {
        let result = read_table(b"definitely not a workbook");
        assert!(matches!(result, Err(TableError::ParseFailed(_))));
    }
}
