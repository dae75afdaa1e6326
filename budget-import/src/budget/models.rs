//! Budget records as read from the spreadsheet and as stored in Dataverse

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::api::constants::{bind_reference, columns, entities, import_status};

/// Lifecycle of a budget import job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
}

impl ImportStatus {
    /// `statuscode` option value
    pub fn code(self) -> i32 {
        match self {
            ImportStatus::NotStarted => import_status::NOT_STARTED,
            ImportStatus::InProgress => import_status::IN_PROGRESS,
            ImportStatus::Succeeded => import_status::SUCCEEDED,
            ImportStatus::Failed => import_status::FAILED,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            import_status::NOT_STARTED => Some(ImportStatus::NotStarted),
            import_status::IN_PROGRESS => Some(ImportStatus::InProgress),
            import_status::SUCCEEDED => Some(ImportStatus::Succeeded),
            import_status::FAILED => Some(ImportStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ImportStatus::NotStarted => "Not Started",
            ImportStatus::InProgress => "In Progress",
            ImportStatus::Succeeded => "Succeeded",
            ImportStatus::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// A `contoso_budgetimport` record
#[derive(Debug, Clone, Deserialize)]
pub struct ImportJob {
    #[serde(rename = "contoso_budgetimportid")]
    pub id: Uuid,
    #[serde(rename = "contoso_name", default)]
    pub name: Option<String>,
    #[serde(rename = "statuscode", default)]
    pub status_code: Option<i32>,
    #[serde(rename = "contoso_errorsummary", default)]
    pub error_summary: Option<String>,
}

impl ImportJob {
    pub fn status(&self) -> Option<ImportStatus> {
        self.status_code.and_then(ImportStatus::from_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetCategory {
    #[serde(rename = "contoso_budgetcategoryid")]
    pub id: Uuid,
    #[serde(rename = "contoso_budgetcategorycode", default)]
    pub code: Option<String>,
    #[serde(rename = "contoso_budgetcategoryname", default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corporation {
    #[serde(rename = "contoso_corporationid")]
    pub id: Uuid,
    #[serde(rename = "contoso_corporationcode", default)]
    pub code: Option<String>,
    #[serde(rename = "contoso_corporationname", default)]
    pub name: Option<String>,
    #[serde(rename = "_contoso_parentcorporation_value", default)]
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    #[serde(rename = "contoso_departmentid")]
    pub id: Uuid,
    #[serde(rename = "contoso_departmentcode", default)]
    pub code: Option<String>,
    #[serde(rename = "contoso_departmentname", default)]
    pub name: Option<String>,
}

/// Master data entries are looked up by their display name
pub trait MasterDataEntry {
    fn id(&self) -> Uuid;
    fn name(&self) -> Option<&str>;
}

macro_rules! impl_master_data_entry {
    ($($ty:ty),*) => {
        $(impl MasterDataEntry for $ty {
            fn id(&self) -> Uuid {
                self.id
            }

            fn name(&self) -> Option<&str> {
                self.name.as_deref()
            }
        })*
    };
}

impl_master_data_entry!(BudgetCategory, Corporation, Department);

/// The three reference lists a run validates against
#[derive(Debug, Clone, Default)]
pub struct MasterData {
    pub categories: Vec<BudgetCategory>,
    pub corporations: Vec<Corporation>,
    pub departments: Vec<Department>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemUser {
    #[serde(rename = "systemuserid")]
    pub id: Uuid,
    #[serde(rename = "fullname", default)]
    pub full_name: Option<String>,
}

/// Budget header as listed from Dataverse
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingHeader {
    #[serde(rename = "contoso_budgetheaderid")]
    pub id: Uuid,
    #[serde(rename = "contoso_fiscalyear", default)]
    pub fiscal_year: Option<i32>,
    #[serde(rename = "_contoso_corporation_value", default)]
    pub corporation_id: Option<Uuid>,
    #[serde(rename = "_contoso_department_value", default)]
    pub department_id: Option<Uuid>,
}

impl ExistingHeader {
    pub fn key(&self) -> Option<HeaderKey> {
        Some(HeaderKey {
            fiscal_year: self.fiscal_year?,
            corporation_id: self.corporation_id?,
            department_id: self.department_id?,
        })
    }
}

/// Budget line as listed from Dataverse
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingLine {
    #[serde(rename = "contoso_budgetlineid", default)]
    pub id: Option<Uuid>,
    #[serde(rename = "_contoso_budgetcategory_value", default)]
    pub category_id: Option<Uuid>,
    #[serde(rename = "_contoso_budgetheader_value", default)]
    pub header_id: Option<Uuid>,
    #[serde(rename = "contoso_totalbudgetedamount", default)]
    pub total_amount: Option<Decimal>,
}

/// One spreadsheet row before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub fiscal_year: Option<String>,
    pub parent_corporation: Option<String>,
    pub corporation: Option<String>,
    pub department: Option<String>,
    pub budget_category: Option<String>,
    pub budget_holder: Option<String>,
    pub q1: Option<Decimal>,
    pub q2: Option<Decimal>,
    pub q3: Option<Decimal>,
    pub q4: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl RawRow {
    fn text(value: &Option<String>) -> &str {
        value.as_deref().unwrap_or_default()
    }

    /// "{fiscal year} {corporation} {department}"
    pub fn header_name(&self) -> String {
        format!(
            "{} {} {}",
            Self::text(&self.fiscal_year),
            Self::text(&self.corporation),
            Self::text(&self.department)
        )
    }

    /// "{fiscal year} {corporation} {department} {category}"
    pub fn line_name(&self) -> String {
        format!("{} {}", self.header_name(), Self::text(&self.budget_category))
    }
}

/// Logical identity of a budget header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderKey {
    pub fiscal_year: i32,
    pub corporation_id: Uuid,
    pub department_id: Uuid,
}

/// Budget header to create when no header with the same key exists
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRecord {
    pub key: HeaderKey,
    pub name: String,
    pub budget_amount: Option<Decimal>,
}

impl HeaderRecord {
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("contoso_budgetheadername".into(), json!(self.name));
        body.insert("contoso_fiscalyear".into(), json!(self.key.fiscal_year));
        body.insert(
            "contoso_corporation@odata.bind".into(),
            json!(bind_reference(entities::CORPORATIONS, self.key.corporation_id)),
        );
        body.insert(
            "contoso_department@odata.bind".into(),
            json!(bind_reference(entities::DEPARTMENTS, self.key.department_id)),
        );
        if let Some(amount) = self.budget_amount {
            body.insert(columns::HEADER_BUDGET_AMOUNT.into(), decimal_value(amount));
        }
        Value::Object(body)
    }
}

/// Budget line to create or update
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    /// Known once headers are resolved
    pub header_id: Option<Uuid>,
    pub category_id: Uuid,
    pub holder_id: Uuid,
    pub name: String,
    pub q1: Option<Decimal>,
    pub q2: Option<Decimal>,
    pub q3: Option<Decimal>,
    pub q4: Option<Decimal>,
    pub total: Option<Decimal>,
    /// Present when a line with the same header and category already exists
    pub existing_id: Option<Uuid>,
}

impl LineRecord {
    pub fn to_body(&self, header_id: Uuid) -> Value {
        let mut body = Map::new();
        body.insert("contoso_budgetlinename".into(), json!(self.name));
        body.insert(
            "contoso_budgetheader@odata.bind".into(),
            json!(bind_reference(entities::BUDGET_HEADERS, header_id)),
        );
        body.insert(
            "contoso_budgetcategory@odata.bind".into(),
            json!(bind_reference(entities::BUDGET_CATEGORIES, self.category_id)),
        );
        body.insert(
            "contoso_budgetholder@odata.bind".into(),
            json!(bind_reference(entities::USERS, self.holder_id)),
        );

        let amounts = [
            ("contoso_budgetedamountq1", self.q1),
            ("contoso_budgetedamountq2", self.q2),
            ("contoso_budgetedamountq3", self.q3),
            ("contoso_budgetedamountq4", self.q4),
            ("contoso_totalbudgetedamount", self.total),
        ];
        // Blank amounts are sent as null so an update clears the stored value
        for (column, amount) in amounts {
            body.insert(column.into(), amount.map(decimal_value).unwrap_or(Value::Null));
        }
        Value::Object(body)
    }
}

/// A row that passed validation, with every reference resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    /// Zero-based index into the spreadsheet's data rows
    pub position: usize,
    pub header: HeaderRecord,
    pub line: LineRecord,
}

impl ResolvedRow {
    pub fn key(&self) -> HeaderKey {
        self.header.key
    }
}

/// Decimal as a JSON number, the representation Dataverse expects for decimal and money columns
pub fn decimal_value(amount: Decimal) -> Value {
    amount
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
