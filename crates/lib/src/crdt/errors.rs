//! Error types for CRDT operations.

use thiserror::Error;

/// Structured errors for CRDT operations.
///
/// Merges themselves cannot fail; these cover the mutating operations with
/// preconditions, currently only two-phase-set removal.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CrdtError {
    /// Removal was requested for an element that is not currently a member.
    #[error("element is not a member of the set: {element}")]
    NotAMember { element: String },
}

impl CrdtError {
    /// Check if this error is a failed membership precondition.
    pub fn is_not_a_member(&self) -> bool {
        matches!(self, CrdtError::NotAMember { .. })
    }
}

impl From<CrdtError> for crate::Error {
    fn from(err: CrdtError) -> Self {
        crate::Error::Crdt(err)
    }
}
