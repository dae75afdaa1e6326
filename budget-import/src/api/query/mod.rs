//! OData Query Module
//!
//! Provides the filter and paging types used when listing Dataverse records.

pub mod filters;
pub mod query;

pub use filters::{Filter, FilterValue};
pub use query::{ListQuery, Page, PageToken};
