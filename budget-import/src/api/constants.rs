//! Dataverse entity set, column and option-set constants for the budget solution

/// Entity set names
pub mod entities {
    pub const BUDGET_CATEGORIES: &str = "contoso_budgetcategories";
    pub const BUDGET_HEADERS: &str = "contoso_budgetheaders";
    pub const BUDGET_LINES: &str = "contoso_budgetlines";
    pub const BUDGET_IMPORTS: &str = "contoso_budgetimports";
    pub const CORPORATIONS: &str = "contoso_corporations";
    pub const DEPARTMENTS: &str = "contoso_departments";
    pub const USERS: &str = "systemusers";
}

/// Column names that the pipeline filters or writes on directly
pub mod columns {
    pub const LINE_HEADER_LOOKUP: &str = "_contoso_budgetheader_value";
    pub const HEADER_BUDGET_AMOUNT: &str = "contoso_budgetamount";
    pub const IMPORT_ATTACHMENT: &str = "contoso_attachment";
    pub const IMPORT_ERROR_FILE: &str = "contoso_errorfile";
    pub const IMPORT_ERROR_SUMMARY: &str = "contoso_errorsummary";
    pub const STATUS_CODE: &str = "statuscode";
    pub const USER_FULL_NAME: &str = "fullname";
}

/// `statuscode` option values of the budget import entity
pub mod import_status {
    pub const NOT_STARTED: i32 = 1;
    pub const IN_PROGRESS: i32 = 330650002;
    pub const SUCCEEDED: i32 = 330650003;
    pub const FAILED: i32 = 330650004;
}

/// File name given to the generated error workbook
pub const ERROR_FILE_NAME: &str = "errors.xlsx";

/// Derive the singular logical name from an entity set name
/// e.g., "contoso_budgetcategories" -> "contoso_budgetcategory", "systemusers" -> "systemuser"
pub fn entity_singular(entity_set: &str) -> String {
    if let Some(stem) = entity_set.strip_suffix("ies") {
        format!("{}y", stem)
    } else if entity_set.ends_with("ses")
        || entity_set.ends_with("xes")
        || entity_set.ends_with("ches")
        || entity_set.ends_with("shes")
    {
        entity_set[..entity_set.len() - 2].to_string()
    } else if let Some(stem) = entity_set.strip_suffix('s') {
        stem.to_string()
    } else {
        entity_set.to_string()
    }
}

/// Primary key column of an entity set, e.g. "contoso_budgetlines" -> "contoso_budgetlineid"
pub fn primary_id_field(entity_set: &str) -> String {
    format!("{}id", entity_singular(entity_set))
}

/// `@odata.bind` value pointing at a record of an entity set
pub fn bind_reference(entity_set: &str, id: uuid::Uuid) -> String {
    format!("/{}({})", entity_set, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_singular() {
        assert_eq!(entity_singular("contoso_budgetcategories"), "contoso_budgetcategory");
        assert_eq!(entity_singular("contoso_budgetlines"), "contoso_budgetline");
        assert_eq!(entity_singular("systemusers"), "systemuser");
        assert_eq!(entity_singular("addresses"), "address");
        assert_eq!(entity_singular("contoso_role"), "contoso_role");
    }

    #[test]
    fn test_primary_id_field() {
        assert_eq!(primary_id_field(entities::BUDGET_HEADERS), "contoso_budgetheaderid");
        assert_eq!(primary_id_field(entities::CORPORATIONS), "contoso_corporationid");
        assert_eq!(primary_id_field(entities::USERS), "systemuserid");
        assert_eq!(primary_id_field(entities::BUDGET_IMPORTS), "contoso_budgetimportid");
    }
}
