//! Row validation against master data

use rust_decimal::Decimal;
use uuid::Uuid;

use super::error::{ImportError, ReferenceKind};
use super::models::{BudgetCategory, Corporation, Department, MasterDataEntry, RawRow};

/// First entry whose name equals `name` exactly; a missing or blank name never matches
fn find_by_name<'a, T: MasterDataEntry>(
    entries: &'a [T],
    name: Option<&str>,
    kind: ReferenceKind,
) -> Result<&'a T, ImportError> {
    let name = name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ImportError::not_found(kind, name));
    }
    entries
        .iter()
        .find(|entry| entry.name() == Some(name))
        .ok_or_else(|| ImportError::not_found(kind, name))
}

fn resolve<T: MasterDataEntry>(
    entries: &[T],
    name: Option<&str>,
    kind: ReferenceKind,
) -> Result<Uuid, ImportError> {
    find_by_name(entries, name, kind).map(|entry| entry.id())
}

pub fn validate_budget_category(
    categories: &[BudgetCategory],
    name: Option<&str>,
) -> Result<Uuid, ImportError> {
    resolve(categories, name, ReferenceKind::BudgetCategory)
}

pub fn validate_department(departments: &[Department], name: Option<&str>) -> Result<Uuid, ImportError> {
    resolve(departments, name, ReferenceKind::Department)
}

/// Resolve the corporation and check that its stored parent is the row's parent corporation
pub fn validate_corporation(
    corporations: &[Corporation],
    name: Option<&str>,
    parent_name: Option<&str>,
) -> Result<Uuid, ImportError> {
    let corporation = find_by_name(corporations, name, ReferenceKind::Corporation)?;
    let parent = find_by_name(corporations, parent_name, ReferenceKind::ParentCorporation)?;

    if corporation.parent_id != Some(parent.id) {
        return Err(ImportError::HierarchyMismatch {
            parent: parent_name.unwrap_or_default().to_string(),
            corporation: name.unwrap_or_default().to_string(),
        });
    }
    Ok(corporation.id)
}

/// The quarters must add up to the total exactly; blank cells count as zero
pub fn validate_total(row: &RawRow) -> Result<(), ImportError> {
    let quarters: Decimal = [row.q1, row.q2, row.q3, row.q4]
        .iter()
        .map(|q| q.unwrap_or(Decimal::ZERO))
        .sum();
    if quarters == row.total.unwrap_or(Decimal::ZERO) {
        Ok(())
    } else {
        Err(ImportError::SumMismatch)
    }
}

/// Keep only the digits of the fiscal year cell ("FY 2024" -> 2024)
pub fn parse_fiscal_year(value: Option<&str>) -> Result<i32, ImportError> {
    let text = value.unwrap_or_default();
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<i32>()
        .map_err(|_| ImportError::InvalidFiscalYear {
            value: text.to_string(),
        })
}
