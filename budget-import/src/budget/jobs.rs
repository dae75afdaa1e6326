//! Budget import job records

use anyhow::Result;
use log::info;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ImportError;
use super::models::{ImportJob, ImportStatus};
use crate::api::constants::{ERROR_FILE_NAME, columns, entities};
use crate::api::store::RemoteStore;

pub struct ImportJobRepository {
    store: Arc<dyn RemoteStore>,
}

impl ImportJobRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// The job record; `MissingJob` if there is none
    pub async fn get(&self, id: Uuid) -> Result<ImportJob> {
        let record = self
            .store
            .retrieve(entities::BUDGET_IMPORTS, id)
            .await
            .map_err(|e| ImportError::remote(format!("Retrieving budget import {}", id), &e))?
            .ok_or(ImportError::MissingJob { id })?;
        Ok(serde_json::from_value(record)?)
    }

    /// The uploaded spreadsheet; `MissingAttachment` when absent or empty
    pub async fn attachment(&self, id: Uuid) -> Result<Vec<u8>> {
        let content = self
            .store
            .download_file(entities::BUDGET_IMPORTS, id, columns::IMPORT_ATTACHMENT)
            .await
            .map_err(|e| ImportError::remote(format!("Downloading attachment of budget import {}", id), &e))?;
        match content {
            Some(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => Err(ImportError::MissingAttachment { id }.into()),
        }
    }

    pub async fn set_status(&self, id: Uuid, status: ImportStatus) -> Result<()> {
        self.store
            .update(
                entities::BUDGET_IMPORTS,
                id,
                json!({ (columns::STATUS_CODE): status.code() }),
            )
            .await
            .map_err(|e| ImportError::remote(format!("Setting status of budget import {}", id), &e))?;
        info!("Budget import {} is now {}", id, status);
        Ok(())
    }

    pub async fn set_error_summary(&self, id: Uuid, summary: &str) -> Result<()> {
        self.store
            .update(
                entities::BUDGET_IMPORTS,
                id,
                json!({ (columns::IMPORT_ERROR_SUMMARY): summary }),
            )
            .await
            .map_err(|e| ImportError::remote(format!("Setting error summary of budget import {}", id), &e))?;
        Ok(())
    }

    /// Attach the annotated workbook as `errors.xlsx`
    pub async fn upload_error_file(&self, id: Uuid, content: Vec<u8>) -> Result<()> {
        self.store
            .upload_file(
                entities::BUDGET_IMPORTS,
                id,
                columns::IMPORT_ERROR_FILE,
                ERROR_FILE_NAME,
                content,
            )
            .await
            .map_err(|e| ImportError::remote(format!("Uploading error file of budget import {}", id), &e))?;
        info!("Uploaded {} to budget import {}", ERROR_FILE_NAME, id);
        Ok(())
    }
}
