//! List queries and pages

use serde_json::Value;

use super::filters::Filter;

/// Opaque continuation token (the `@odata.nextLink` URL for Dataverse)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of listed records
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<PageToken>,
}

/// Options for listing records of one entity set
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filter: Option<Filter>,
    pub select: Vec<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Query string parameters for the Web API (`$filter`, `$select`)
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &self.filter {
            params.push(("$filter", filter.to_odata()));
        }
        if !self.select.is_empty() {
            params.push(("$select", self.select.join(",")));
        }
        params
    }
}
