//! Abstraction over the remote data store
//!
//! The pipeline only depends on this trait. `DataverseClient` implements it over the
//! Web API and tests use an in-memory implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::operations::{BatchOperation, BatchOperationResult};
use super::query::{ListQuery, Page, PageToken};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List one page of records; pass the previous page's token to continue
    async fn list(&self, entity: &str, query: &ListQuery, page: Option<&PageToken>) -> Result<Page>;

    /// Retrieve a single record by id, `None` if it does not exist
    async fn retrieve(&self, entity: &str, id: Uuid) -> Result<Option<Value>>;

    /// Create a record and return its representation
    async fn create(&self, entity: &str, body: Value) -> Result<Value>;

    /// Patch a record by id and return its representation
    async fn update(&self, entity: &str, id: Uuid, body: Value) -> Result<Value>;

    /// Submit a batch of mixed creates/updates; one result per operation, ordered by index
    async fn process_batch(&self, batch: BatchOperation) -> Result<Vec<BatchOperationResult>>;

    /// Download a file column, `None` if the column is empty
    async fn download_file(&self, entity: &str, id: Uuid, column: &str) -> Result<Option<Vec<u8>>>;

    /// Upload content into a file column
    async fn upload_file(
        &self,
        entity: &str,
        id: Uuid,
        column: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> Result<()>;

    /// Start a new batch operation
    fn create_batch_operation(&self) -> BatchOperation {
        BatchOperation::new()
    }
}

/// List every record matching `query`, following continuation tokens until none is returned
pub async fn list_all(store: &dyn RemoteStore, entity: &str, query: &ListQuery) -> Result<Vec<Value>> {
    let mut records = Vec::new();
    let mut token: Option<PageToken> = None;

    loop {
        let page = store.list(entity, query, token.as_ref()).await?;
        records.extend(page.records);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }

    log::debug!("Listed {} records from {}", records.len(), entity);
    Ok(records)
}

/// List every record and deserialize into `T`
pub async fn list_all_as<T: serde::de::DeserializeOwned>(
    store: &dyn RemoteStore,
    entity: &str,
    query: &ListQuery,
) -> Result<Vec<T>> {
    list_all(store, entity, query)
        .await?
        .into_iter()
        .map(|record| {
            serde_json::from_value(record)
                .map_err(|e| anyhow::anyhow!("Failed to deserialize {} record: {}", entity, e))
        })
        .collect()
}
