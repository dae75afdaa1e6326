//! OData `$filter` expressions

#[cfg(test)]
use serde_json::Value;
use uuid::Uuid;

/// A value compared against a column in a filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Guid(Uuid),
}

/// Filter expression supported by the import pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field eq value`
    Eq(String, FilterValue),
    /// `contains(field, 'value')`
    Contains(String, String),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        Self::Eq(field.into(), value)
    }

    pub fn contains(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains(field.into(), value.into())
    }

    /// Render as an OData `$filter` expression
    pub fn to_odata(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{} eq {}", field, value.to_odata()),
            Filter::Contains(field, value) => {
                format!("contains({}, '{}')", field, escape_literal(value))
            }
        }
    }

    /// Evaluate against a JSON record, mirroring the server-side semantics
    #[cfg(test)]
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => value.matches(&record[field.as_str()]),
            Filter::Contains(field, value) => record[field.as_str()]
                .as_str()
                .map(|s| s.to_lowercase().contains(&value.to_lowercase()))
                .unwrap_or(false),
        }
    }
}

impl FilterValue {
    fn to_odata(&self) -> String {
        match self {
            FilterValue::Guid(g) => g.to_string(),
        }
    }

    #[cfg(test)]
    fn matches(&self, value: &Value) -> bool {
        match self {
            FilterValue::Guid(g) => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(|v| v == *g)
                .unwrap_or(false),
        }
    }
}

/// OData string literals escape a single quote by doubling it
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
