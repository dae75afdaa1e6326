//! Core Operation types for Dataverse write operations

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Represents a single write operation that can be executed individually or inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new record
    Create {
        /// Entity set name (e.g., "contoso_budgetlines")
        entity: String,
        /// Record data as JSON
        data: Value,
    },
    /// Update an existing record
    Update {
        /// Entity set name
        entity: String,
        /// Record ID (GUID)
        id: Uuid,
        /// Updated field data as JSON
        data: Value,
    },
}

/// Reference to a record created or updated by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub id: Uuid,
}

/// Outcome of one item of a processed batch
///
/// `index` is the zero-based position of the operation inside the batch it was
/// submitted with, so callers can map results back after the remote reorders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperationResult {
    pub index: usize,
    pub outcome: Result<EntityReference, String>,
}

impl Operation {
    /// Create a new Create operation
    pub fn create(entity: impl Into<String>, data: Value) -> Self {
        Self::Create {
            entity: entity.into(),
            data,
        }
    }

    /// Create a new Update operation
    pub fn update(entity: impl Into<String>, id: Uuid, data: Value) -> Self {
        Self::Update {
            entity: entity.into(),
            id,
            data,
        }
    }

    /// Get the entity set name for this operation
    pub fn entity(&self) -> &str {
        match self {
            Self::Create { entity, .. } => entity,
            Self::Update { entity, .. } => entity,
        }
    }

    /// Get the request body for this operation
    pub fn data(&self) -> &Value {
        match self {
            Self::Create { data, .. } => data,
            Self::Update { data, .. } => data,
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Create { .. } => "POST",
            Self::Update { .. } => "PATCH",
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
        }
    }

    /// Relative resource path addressed by this operation
    pub fn resource_path(&self) -> String {
        match self {
            Self::Create { entity, .. } => entity.clone(),
            Self::Update { entity, id, .. } => format!("{}({})", entity, id),
        }
    }
}

impl BatchOperationResult {
    /// Create a new successful result
    pub fn success(index: usize, id: Uuid) -> Self {
        Self {
            index,
            outcome: Ok(EntityReference { id }),
        }
    }

    /// Create a new error result
    pub fn error(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            outcome: Err(error.into()),
        }
    }

    /// Check if this result represents a successful operation
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Id of the created/updated record, if the operation succeeded
    pub fn entity_id(&self) -> Option<Uuid> {
        self.outcome.as_ref().ok().map(|r| r.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_paths() {
        let id = Uuid::new_v4();
        let create = Operation::create("contoso_budgetlines", json!({}));
        let update = Operation::update("contoso_budgetlines", id, json!({}));

        assert_eq!(create.http_method(), "POST");
        assert_eq!(create.resource_path(), "contoso_budgetlines");
        assert_eq!(update.http_method(), "PATCH");
        assert_eq!(update.resource_path(), format!("contoso_budgetlines({})", id));
        assert_eq!(update.operation_type(), "update");
    }

    #[test]
    fn test_batch_result_accessors() {
        let id = Uuid::new_v4();
        assert_eq!(BatchOperationResult::success(3, id).entity_id(), Some(id));

        let failed = BatchOperationResult::error(1, "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.entity_id(), None);
        assert_eq!(failed.index, 1);
    }
}
