//! Excel import/export for budget workbooks

pub mod reader;
pub mod writer;

pub use reader::{SheetRecord, read_sheet_records};
pub use writer::build_workbook;
