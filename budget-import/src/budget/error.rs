//! Import errors
//!
//! Row-level variants (`NotFound`, `HierarchyMismatch`, `SumMismatch`,
//! `InvalidFiscalYear`) are recorded against the offending row and the import
//! continues. The remaining variants abort the whole job.

use uuid::Uuid;

/// Kind of reference a row failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    BudgetCategory,
    Corporation,
    ParentCorporation,
    Department,
    User,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReferenceKind::BudgetCategory => "budget category",
            ReferenceKind::Corporation => "corporation",
            ReferenceKind::ParentCorporation => "parent corporation",
            ReferenceKind::Department => "department",
            ReferenceKind::User => "user",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportError {
    /// A textual reference did not match any master data entry
    NotFound { kind: ReferenceKind, name: String },
    /// The corporation's stored parent is not the row's parent corporation
    HierarchyMismatch { parent: String, corporation: String },
    /// Q1..Q4 do not add up to the total
    SumMismatch,
    /// No digits could be read from the fiscal year cell
    InvalidFiscalYear { value: String },
    /// The spreadsheet has no data rows
    EmptyInput,
    /// No import job with this id
    MissingJob { id: Uuid },
    /// The import job has no spreadsheet attached
    MissingAttachment { id: Uuid },
    /// The attachment could not be read as a budget spreadsheet
    InvalidSpreadsheet { reason: String },
    /// A remote call failed outside of per-record error handling
    RemoteCallFailure { operation: String, message: String },
}

impl ImportError {
    pub fn not_found(kind: ReferenceKind, name: impl Into<String>) -> Self {
        ImportError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn remote(operation: impl Into<String>, error: &anyhow::Error) -> Self {
        ImportError::RemoteCallFailure {
            operation: operation.into(),
            message: format!("{:#}", error),
        }
    }
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::NotFound { kind, name } => write!(f, "Invalid {}: {}", kind, name),
            ImportError::HierarchyMismatch {
                parent,
                corporation,
            } => write!(
                f,
                "Invalid hierarchy of corporation {} -> {}",
                parent, corporation
            ),
            ImportError::SumMismatch => write!(
                f,
                "Total budget amount is not matching with sum of all Q's budget amount"
            ),
            ImportError::InvalidFiscalYear { value } => {
                write!(f, "Invalid fiscal year: {}", value)
            }
            ImportError::EmptyInput => write!(f, "Budget excel file uploaded is empty"),
            ImportError::MissingJob { id } => {
                write!(f, "No record found in budget import entity with id {}", id)
            }
            ImportError::MissingAttachment { id } => {
                write!(f, "No file attachment found on budget import {}", id)
            }
            ImportError::InvalidSpreadsheet { reason } => {
                write!(f, "Budget excel file could not be read: {}", reason)
            }
            ImportError::RemoteCallFailure { operation, message } => {
                write!(f, "{} failed: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for ImportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_messages() {
        assert_eq!(
            ImportError::not_found(ReferenceKind::BudgetCategory, "Travel").to_string(),
            "Invalid budget category: Travel"
        );
        assert_eq!(
            ImportError::not_found(ReferenceKind::ParentCorporation, "Contoso").to_string(),
            "Invalid parent corporation: Contoso"
        );
        assert_eq!(
            ImportError::not_found(ReferenceKind::User, "Jo Smith").to_string(),
            "Invalid user: Jo Smith"
        );
        assert_eq!(
            ImportError::HierarchyMismatch {
                parent: "Contoso".into(),
                corporation: "Fabrikam".into()
            }
            .to_string(),
            "Invalid hierarchy of corporation Contoso -> Fabrikam"
        );
        assert_eq!(
            ImportError::SumMismatch.to_string(),
            "Total budget amount is not matching with sum of all Q's budget amount"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = ImportError::EmptyInput.into();
        assert_eq!(err.to_string(), "Budget excel file uploaded is empty");
        assert_eq!(err.downcast_ref::<ImportError>(), Some(&ImportError::EmptyInput));
    }
}
