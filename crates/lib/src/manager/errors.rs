//! Error types for entity lifecycle operations.

use thiserror::Error;

/// Structured errors for [`CrdtManager`](super::CrdtManager) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Create was called for an entity that already has live state.
    #[error("entity already exists: {entity_id}")]
    EntityAlreadyExists { entity_id: String },

    /// Update/delete was called for an entity with no live state.
    #[error("entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },
}

impl ManagerError {
    /// Check if this error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::EntityNotFound { .. })
    }

    /// Check if this error reports a create conflict.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ManagerError::EntityAlreadyExists { .. })
    }
}

impl From<ManagerError> for crate::Error {
    fn from(err: ManagerError) -> Self {
        crate::Error::Manager(err)
    }
}
