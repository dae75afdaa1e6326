//! Budget spreadsheet layout
//!
//! A single column list drives both directions: reading uploaded rows into
//! [`RawRow`]s and writing the annotated error workbook.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::error::ImportError;
use super::models::RawRow;
use crate::excel::SheetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetColumn {
    IsError,
    ErrorReason,
    FiscalYear,
    ParentCorporation,
    Corporation,
    Department,
    BudgetCategory,
    BudgetHolder,
    BudgetedAmountQ1,
    BudgetedAmountQ2,
    BudgetedAmountQ3,
    BudgetedAmountQ4,
    TotalBudgetedAmount,
}

impl SheetColumn {
    /// Every column, in error workbook order
    pub const ALL: [SheetColumn; 13] = [
        SheetColumn::IsError,
        SheetColumn::ErrorReason,
        SheetColumn::FiscalYear,
        SheetColumn::ParentCorporation,
        SheetColumn::Corporation,
        SheetColumn::Department,
        SheetColumn::BudgetCategory,
        SheetColumn::BudgetHolder,
        SheetColumn::BudgetedAmountQ1,
        SheetColumn::BudgetedAmountQ2,
        SheetColumn::BudgetedAmountQ3,
        SheetColumn::BudgetedAmountQ4,
        SheetColumn::TotalBudgetedAmount,
    ];

    pub fn header(self) -> &'static str {
        match self {
            SheetColumn::IsError => "IsError",
            SheetColumn::ErrorReason => "ErrorReason",
            SheetColumn::FiscalYear => "FiscalYear",
            SheetColumn::ParentCorporation => "ParentCorporation",
            SheetColumn::Corporation => "Corporation",
            SheetColumn::Department => "Department",
            SheetColumn::BudgetCategory => "BudgetCategory",
            SheetColumn::BudgetHolder => "BudgetHolder",
            SheetColumn::BudgetedAmountQ1 => "BudgetedAmountQ1",
            SheetColumn::BudgetedAmountQ2 => "BudgetedAmountQ2",
            SheetColumn::BudgetedAmountQ3 => "BudgetedAmountQ3",
            SheetColumn::BudgetedAmountQ4 => "BudgetedAmountQ4",
            SheetColumn::TotalBudgetedAmount => "TotalBudgetedAmount",
        }
    }

    pub fn headers() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.header()).collect()
    }

    /// Cell text for this column in the error workbook
    pub fn cell(self, row: &RawRow, error: Option<&str>) -> Option<String> {
        let amount = |value: Option<Decimal>| value.map(|d| d.normalize().to_string());
        match self {
            SheetColumn::IsError => error.map(|_| "true".to_string()),
            SheetColumn::ErrorReason => error.map(str::to_string),
            SheetColumn::FiscalYear => row.fiscal_year.clone(),
            SheetColumn::ParentCorporation => row.parent_corporation.clone(),
            SheetColumn::Corporation => row.corporation.clone(),
            SheetColumn::Department => row.department.clone(),
            SheetColumn::BudgetCategory => row.budget_category.clone(),
            SheetColumn::BudgetHolder => row.budget_holder.clone(),
            SheetColumn::BudgetedAmountQ1 => amount(row.q1),
            SheetColumn::BudgetedAmountQ2 => amount(row.q2),
            SheetColumn::BudgetedAmountQ3 => amount(row.q3),
            SheetColumn::BudgetedAmountQ4 => amount(row.q4),
            SheetColumn::TotalBudgetedAmount => amount(row.total),
        }
    }
}

/// Error workbook row: every column of `row` plus the error flag and reason
pub fn error_sheet_row(row: &RawRow, error: Option<&str>) -> Vec<Option<String>> {
    SheetColumn::ALL.iter().map(|c| c.cell(row, error)).collect()
}

/// Parse an amount cell; blank cells are `None`
pub fn parse_amount(column: SheetColumn, record: &SheetRecord) -> Result<Option<Decimal>, ImportError> {
    let Some(text) = record.get(column.header()) else {
        return Ok(None);
    };
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(None);
    }

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map(Some)
        .map_err(|_| ImportError::InvalidSpreadsheet {
            reason: format!(
                "row {}: {} '{}' is not a number",
                record.row_number,
                column.header(),
                text
            ),
        })
}

impl RawRow {
    /// Map a spreadsheet record onto a row. An unreadable amount fails the whole file.
    pub fn from_sheet_record(record: &SheetRecord) -> Result<Self, ImportError> {
        let text = |column: SheetColumn| {
            record
                .get(column.header())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(RawRow {
            fiscal_year: text(SheetColumn::FiscalYear),
            parent_corporation: text(SheetColumn::ParentCorporation),
            corporation: text(SheetColumn::Corporation),
            department: text(SheetColumn::Department),
            budget_category: text(SheetColumn::BudgetCategory),
            budget_holder: text(SheetColumn::BudgetHolder),
            q1: parse_amount(SheetColumn::BudgetedAmountQ1, record)?,
            q2: parse_amount(SheetColumn::BudgetedAmountQ2, record)?,
            q3: parse_amount(SheetColumn::BudgetedAmountQ3, record)?,
            q4: parse_amount(SheetColumn::BudgetedAmountQ4, record)?,
            total: parse_amount(SheetColumn::TotalBudgetedAmount, record)?,
        })
    }
}
