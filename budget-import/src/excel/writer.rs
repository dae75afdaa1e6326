//! Write annotated rows back into a workbook

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

pub const ERROR_SHEET_NAME: &str = "Auto Generated";

/// Build a single-sheet workbook with a bold header row; `None` cells are left blank
pub fn build_workbook(columns: &[&str], rows: &[Vec<Option<String>>]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(ERROR_SHEET_NAME)?;

    let header_format = Format::new().set_bold();
    for (col, name) in columns.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &header_format)?;
    }

    for (row_idx, row) in rows.iter().enumerate() {
        let row_num = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            if let Some(value) = value {
                worksheet.write_string(row_num, col as u16, value)?;
            }
        }
    }

    workbook
        .save_to_buffer()
        .context("Failed to serialize Excel workbook")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::read_sheet_records;
    use calamine::{Reader, Xlsx};
    use std::io::Cursor;

    #[test]
    fn test_written_workbook_reads_back() {
        let rows = vec![
            vec![Some("true".to_string()), Some("Invalid department: X".to_string()), None],
            vec![Some("false".to_string()), None, Some("2024".to_string())],
        ];
        let bytes = build_workbook(&["IsError", "ErrorReason", "FiscalYear"], &rows).unwrap();

        let records = read_sheet_records(&bytes).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("IsError"), Some("true"));
        assert_eq!(records[0].get("ErrorReason"), Some("Invalid department: X"));
        assert_eq!(records[0].get("FiscalYear"), None);
        assert_eq!(records[1].get("FiscalYear"), Some("2024"));
    }

    #[test]
    fn test_sheet_name() {
        let bytes = build_workbook(&["IsError"], &[]).unwrap();
        let workbook = Xlsx::new(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec![ERROR_SHEET_NAME.to_string()]);
    }
}
