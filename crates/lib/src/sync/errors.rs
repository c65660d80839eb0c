//! Error types for the synchronization engine.

use thiserror::Error;

/// Errors raised by sync rounds.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote node could not be reached, or the exchange timed out.
    ///
    /// Recoverable: the caller retries on its next scheduled round. A failed
    /// round never advances watermarks and never touches entity state, so
    /// retrying re-sends the same batch and the idempotent merge absorbs
    /// any duplicates.
    #[error("transport error talking to {remote}: {reason}")]
    Transport { remote: String, reason: String },

    /// The remote acknowledged fewer events than were sent.
    #[error("remote {remote} acknowledged {acknowledged} of {sent} events")]
    PartialDelivery {
        remote: String,
        sent: u64,
        acknowledged: u64,
    },
}

impl SyncError {
    /// Convenience constructor for transport implementations.
    pub fn transport(remote: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Transport {
            remote: remote.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a (retryable) transport failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::PartialDelivery { .. }
        )
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
