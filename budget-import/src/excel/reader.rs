//! Read the rows of an uploaded workbook

use std::collections::HashMap;
use std::io::Cursor;

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx};

/// One data row keyed by normalized column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetRecord {
    /// 1-based row number in the worksheet, header row included
    pub row_number: u32,
    cells: HashMap<String, String>,
}

impl SheetRecord {
    pub fn new(row_number: u32) -> Self {
        Self {
            row_number,
            cells: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(normalize_column_name(column), value.into());
    }

    /// Cell text for a column, looked up with the same normalization as the header
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(&normalize_column_name(column)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.values().all(|v| v.trim().is_empty())
    }
}

/// Header names are matched ignoring whitespace, underscores and case
/// ("Fiscal Year", "fiscal_year" and "FiscalYear" are the same column)
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse the data rows of the workbook's last worksheet.
///
/// The first row holds column names. Rows without any value are skipped.
pub fn read_sheet_records(content: &[u8]) -> Result<Vec<SheetRecord>> {
    let mut workbook = Xlsx::new(Cursor::new(content)).context("Failed to open Excel workbook")?;

    let sheet_name = workbook
        .sheet_names()
        .last()
        .context("Excel file has no sheets")?
        .clone();

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet: {}", sheet_name))?;

    // calamine ranges start at the first used cell, not necessarily A1
    let first_row = range.start().map(|(row, _)| row).unwrap_or(0);
    let mut rows = range.rows();

    let header: Vec<Option<String>> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| get_cell_string(cell).map(|name| normalize_column_name(&name)))
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut records = Vec::new();
    for (offset, row) in rows.enumerate() {
        // +1 for the header row, +1 for 1-based numbering
        let mut record = SheetRecord::new(first_row + offset as u32 + 2);
        for (col, cell) in row.iter().enumerate() {
            let Some(Some(column)) = header.get(col) else {
                continue;
            };
            if let Some(value) = get_cell_string(cell) {
                record.cells.insert(column.clone(), value);
            }
        }

        if record.is_empty() {
            continue;
        }
        records.push(record);
    }

    log::debug!("Read {} data rows from sheet '{}'", records.len(), sheet_name);
    Ok(records)
}

fn get_cell_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Some((*f as i64).to_string())
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::DateTime(dt) => Some(dt.as_f64().to_string()),
        _ => None,
    }
}
