//! Cached reference ("master") data

use anyhow::Result;
use log::info;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::models::{BudgetCategory, Corporation, Department, MasterData};
use crate::api::constants::entities;
use crate::api::query::ListQuery;
use crate::api::store::{RemoteStore, list_all_as};
use crate::cache::{Cache, get_or_populate};

/// Full entity listings cached under the entity set name
pub struct ReferenceDataCache {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ReferenceDataCache {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    /// Every record of `entity`, from the cache when warm.
    ///
    /// A cold key lists the entity with paging and stores the result; errors are
    /// returned without caching anything.
    pub async fn get_all<T>(&self, entity: &str) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        let store = self.store.as_ref();
        get_or_populate(self.cache.as_ref(), entity, self.ttl, || async move {
            let records: Vec<T> = list_all_as(store, entity, &ListQuery::new()).await?;
            info!("Fetched {} records from {}", records.len(), entity);
            Ok(records)
        })
        .await
    }

    /// Categories, corporations and departments
    pub async fn load(&self) -> Result<MasterData> {
        let categories: Vec<BudgetCategory> = self.get_all(entities::BUDGET_CATEGORIES).await?;
        let corporations: Vec<Corporation> = self.get_all(entities::CORPORATIONS).await?;
        let departments: Vec<Department> = self.get_all(entities::DEPARTMENTS).await?;

        info!(
            "Master data: {} budget categories, {} corporations, {} departments",
            categories.len(),
            corporations.len(),
            departments.len()
        );
        Ok(MasterData {
            categories,
            corporations,
            departments,
        })
    }
}
