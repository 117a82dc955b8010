// In-memory tables for the enrichment job
// Spreadsheet rows are kept as JSON values so both calamine and csv input fit
// the same shape, and rust_xlsxwriter can write them back out.

mod csv;
mod excel;

use crate::errors::TableError;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub use self::csv::read_table as read_csv_table;
pub use excel::{read_table as read_excel_table, write_table as write_excel_table};

/// Spreadsheet formats the enrichment job accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    Excel,
    Csv,
}

impl SpreadsheetFormat {
    /// Detect the format from a file name's extension
    pub fn from_file_name(name: &str) -> Result<Self, TableError> {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SpreadsheetFormat::Excel),
            "csv" => Ok(SpreadsheetFormat::Csv),
            _ => Err(TableError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Parse a downloaded spreadsheet according to its file name
pub fn read_table(name: &str, bytes: &[u8], csv_delimiter: char) -> Result<Table, TableError> {
    match SpreadsheetFormat::from_file_name(name)? {
        SpreadsheetFormat::Excel => read_excel_table(bytes),
        SpreadsheetFormat::Csv => read_csv_table(bytes, csv_delimiter),
    }
}

/// Rectangular table with a header row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.headers.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Result<usize, TableError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| TableError::MissingColumn(column.to_string()))
    }

    /// Key values of a column, in row order
    pub fn key_values(&self, column: &str) -> Result<Vec<String>, TableError> {
        let idx = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).map(key_string).unwrap_or_default())
            .collect())
    }

    /// Distinct key values of a column, first occurrence order
    pub fn distinct_keys(&self, column: &str) -> Result<Vec<String>, TableError> {
        let mut seen = HashSet::new();
        Ok(self
            .key_values(column)?
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect())
    }

    /// Rewrite a column so every cell holds its key string
    pub fn normalize_key_column(&mut self, column: &str) -> Result<(), TableError> {
        let idx = self.column_index(column)?;
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(idx) {
                *cell = Value::String(key_string(cell));
            }
        }
        Ok(())
    }

    /// Keep only rows whose key matches `pattern`; returns how many were dropped
    pub fn retain_matching(&mut self, column: &str, pattern: &Regex) -> Result<usize, TableError> {
        let idx = self.column_index(column)?;
        let before = self.rows.len();
        self.rows.retain(|row| {
            row.get(idx)
                .map(|cell| pattern.is_match(&key_string(cell)))
                .unwrap_or(false)
        });
        Ok(before - self.rows.len())
    }

    /// Inner join on `left_key` = `right.right_key`
    ///
    /// Output columns are all left columns followed by all right columns;
    /// names present on both sides get `_x`/`_y` suffixes. Rows come out in
    /// left order, then right order for repeated keys.
    pub fn inner_join(
        &self,
        left_key: &str,
        right: &Table,
        right_key: &str,
    ) -> Result<Table, TableError> {
        let left_idx = self.column_index(left_key)?;
        let right_idx = right.column_index(right_key)?;

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in right.rows.iter().enumerate() {
            let key = row.get(right_idx).map(key_string).unwrap_or_default();
            index.entry(key).or_default().push(i);
        }

        let overlap: HashSet<&String> = self
            .headers
            .iter()
            .filter(|h| right.headers.contains(h))
            .collect();
        let suffixed = |name: &String, suffix: &str| {
            if overlap.contains(name) {
                format!("{}{}", name, suffix)
            } else {
                name.clone()
            }
        };

        let headers = self
            .headers
            .iter()
            .map(|h| suffixed(h, "_x"))
            .chain(right.headers.iter().map(|h| suffixed(h, "_y")))
            .collect();
        let mut joined = Table::new(headers);

        for left_row in &self.rows {
            let key = left_row.get(left_idx).map(key_string).unwrap_or_default();
            let Some(matches) = index.get(&key) else {
                continue;
            };
            for &i in matches {
                let mut row = left_row.clone();
                row.resize(self.headers.len(), Value::Null);
                row.extend(right.rows[i].iter().cloned());
                joined.push_row(row);
            }
        }

        Ok(joined)
    }
}

/// Render a cell as a join key
///
/// Spreadsheet ids often arrive as floats (`12345.0`); the integral part is
/// what the account table stores.
pub fn key_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => strip_integral_suffix(s.trim()).to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn strip_integral_suffix(s: &str) -> &str {
    match s.strip_suffix(".0") {
        Some(head) if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) => head,
        _ => s,
    }
}
