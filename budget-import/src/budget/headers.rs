//! Budget header resolution
//!
//! Rows are grouped by (fiscal year, corporation, department). Each group reuses
//! an existing header with the same key or gets exactly one new header.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::error::ImportError;
use super::models::{ExistingHeader, HeaderKey, HeaderRecord, ResolvedRow};
use crate::api::constants::{entities, primary_id_field};
use crate::api::query::ListQuery;
use crate::api::store::{RemoteStore, list_all_as};

/// Outcome of resolving headers for one run
#[derive(Debug, Default)]
pub struct HeaderResolution {
    pub header_ids: HashMap<HeaderKey, Uuid>,
    pub reused: usize,
    pub created: usize,
}

/// List every budget header in Dataverse
pub async fn fetch_existing_headers(store: &dyn RemoteStore) -> Result<Vec<ExistingHeader>> {
    let query = ListQuery::new().select([
        "contoso_budgetheaderid",
        "contoso_fiscalyear",
        "_contoso_corporation_value",
        "_contoso_department_value",
    ]);
    list_all_as(store, entities::BUDGET_HEADERS, &query)
        .await
        .map_err(|e| ImportError::remote("Listing budget headers", &e).into())
}

/// Distinct header drafts in first-seen order
pub fn distinct_headers(rows: &[ResolvedRow]) -> Vec<&HeaderRecord> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    for row in rows {
        if seen.insert(row.key()) {
            headers.push(&row.header);
        }
    }
    headers
}

pub struct HeaderResolver<'a> {
    store: &'a dyn RemoteStore,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self { store }
    }

    async fn create(&self, header: &HeaderRecord) -> Result<Uuid> {
        let created = self
            .store
            .create(entities::BUDGET_HEADERS, header.to_body())
            .await
            .map_err(|e| ImportError::remote(format!("Creating budget header '{}'", header.name), &e))?;

        let id_field = primary_id_field(entities::BUDGET_HEADERS);
        created[id_field.as_str()]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .with_context(|| format!("Created budget header '{}' has no id", header.name))
    }

    /// Assign a header id to every row, creating headers that do not exist yet
    pub async fn resolve(
        &self,
        rows: &mut [ResolvedRow],
        existing: &[ExistingHeader],
    ) -> Result<HeaderResolution> {
        let existing_ids: HashMap<HeaderKey, Uuid> = existing
            .iter()
            .rev()
            .filter_map(|h| h.key().map(|key| (key, h.id)))
            .collect();

        let mut resolution = HeaderResolution::default();
        let drafts: Vec<HeaderRecord> = distinct_headers(rows).into_iter().cloned().collect();

        for header in &drafts {
            let id = match existing_ids.get(&header.key) {
                Some(id) => {
                    debug!("Reusing budget header {} for '{}'", id, header.name);
                    resolution.reused += 1;
                    *id
                }
                None => {
                    let id = self.create(header).await?;
                    debug!("Created budget header {} for '{}'", id, header.name);
                    resolution.created += 1;
                    id
                }
            };
            resolution.header_ids.insert(header.key, id);
        }

        for row in rows.iter_mut() {
            row.line.header_id = resolution.header_ids.get(&row.key()).copied();
        }

        info!(
            "Budget headers: {} reused, {} created",
            resolution.reused, resolution.created
        );
        Ok(resolution)
    }
}
