//! Dataverse Web API access
//!
//! The import pipeline talks to Dataverse only through the [`RemoteStore`]
//! trait. [`DataverseClient`] implements it over HTTPS with OAuth2 client
//! credentials, OData list queries, `$batch` requests and file columns.

pub mod auth;
pub mod client;
pub mod constants;
pub mod operations;
pub mod query;
pub mod resilience;
pub mod store;

pub use client::DataverseClient;
pub use store::RemoteStore;
