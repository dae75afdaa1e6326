//! Budget holder lookup against `systemusers`

use anyhow::Result;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::error::{ImportError, ReferenceKind};
use super::models::SystemUser;
use crate::api::constants::{columns, entities};
use crate::api::query::{Filter, ListQuery};
use crate::api::store::RemoteStore;

/// Resolves budget holder names to user ids, remembering answers for the
/// lifetime of one import
pub struct UserDirectory {
    store: Arc<dyn RemoteStore>,
    resolved: Mutex<HashMap<String, Option<Uuid>>>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// First user whose full name contains `name`.
    ///
    /// `Ok(Err(_))` is a row-level failure (blank name or no match); the outer
    /// error is a failed remote call.
    pub async fn resolve(&self, name: Option<&str>) -> Result<Result<Uuid, ImportError>> {
        let name = name.map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Ok(Err(ImportError::not_found(ReferenceKind::User, name)));
        }

        if let Some(cached) = self.resolved.lock().await.get(name) {
            return Ok(cached.ok_or_else(|| ImportError::not_found(ReferenceKind::User, name)));
        }

        let query = ListQuery::new()
            .filter(Filter::contains(columns::USER_FULL_NAME, name))
            .select(["systemuserid", columns::USER_FULL_NAME]);
        let page = self.store.list(entities::USERS, &query, None).await?;
        let user = page
            .records
            .into_iter()
            .next()
            .map(serde_json::from_value::<SystemUser>)
            .transpose()?;

        if let Some(user) = &user {
            debug!(
                "Budget holder '{}' resolved to {} ({})",
                name,
                user.full_name.as_deref().unwrap_or_default(),
                user.id
            );
        } else {
            debug!("Budget holder '{}' matched no user", name);
        }
        let id = user.map(|u| u.id);
        self.resolved.lock().await.insert(name.to_string(), id);
        Ok(id.ok_or_else(|| ImportError::not_found(ReferenceKind::User, name)))
    }
}
