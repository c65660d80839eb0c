//! Error types for the durable store.

use thiserror::Error;

/// Structured errors for event store operations.
///
/// Every variant is fatal to the operation that raised it: the caller either
/// retries the whole operation or surfaces the failure. Nothing in the store
/// degrades silently.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend failed an I/O operation.
    #[error("storage backend error during {context}: {reason}")]
    Backend { context: &'static str, reason: String },

    /// A record could not be serialized for persistence.
    #[error("failed to serialize {what}: {source}")]
    SerializationFailed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted record could not be deserialized.
    #[error("failed to deserialize {what}: {source}")]
    DeserializationFailed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A persisted timestamp was not valid RFC 3339.
    #[error("invalid stored timestamp {value:?}")]
    InvalidTimestamp { value: String },
}

impl StoreError {
    /// Check if this error came from the storage backend itself.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, StoreError::Backend { .. })
    }

    /// Check if this error is a (de)serialization failure.
    pub fn is_serialization_error(&self) -> bool {
        matches!(
            self,
            StoreError::SerializationFailed { .. } | StoreError::DeserializationFailed { .. }
        )
    }
}

impl From<StoreError> for crate::Error {
    fn from(err: StoreError) -> Self {
        crate::Error::Store(err)
    }
}

#[cfg(feature = "sqlite")]
impl StoreError {
    /// Wrap an sqlx error with the operation it interrupted.
    pub(crate) fn sql(context: &'static str, err: sqlx::Error) -> Self {
        StoreError::Backend {
            context,
            reason: err.to_string(),
        }
    }
}
