//!
//! Concord: a conflict-free replication core for mutable entity state.
//!
//! Concord keeps independently edited state convergent across nodes that may
//! be offline, partitioned, or writing concurrently, with no coordinator.
//! Merges are commutative, associative, and idempotent, so any two nodes
//! that exchange their event logs - in any order, with any duplication -
//! settle on the same state.
//!
//! ## Core Concepts
//!
//! * **Vector clocks (`vector_clock`)**: per-node counters that establish
//!   causal order between writes. Causality decides conflicts first;
//!   wall-clock time is only the tie-break for truly concurrent writes.
//! * **CRDT primitives (`crdt`)**: grow-only counter and set, two-phase set,
//!   and the last-write-wins register that backs every replicated entity.
//! * **Events (`event`)**: an append-only log of immutable mutation records.
//!   The log is the source of truth; registers and snapshots are derived.
//! * **Event store (`store`)**: durable persistence for events, snapshots,
//!   and the sync audit log, in memory or in SQLite (`sqlite` feature).
//! * **Manager (`manager`)**: the entity lifecycle API - create, update,
//!   delete (tombstone), read - plus the merge path for remote events, with
//!   per-entity serialization and write-ahead persistence.
//! * **Sync (`sync`)**: pull/push/bidirectional exchange with remote nodes
//!   over an abstract transport, with per-remote watermarks derived from the
//!   audit log, and optional periodic background rounds.

pub mod clock;
pub mod crdt;
pub mod event;
pub mod manager;
pub mod store;
pub mod sync;
pub mod vector_clock;

pub use clock::{Clock, FixedClock, SystemClock};
pub use event::{EntityValue, Event, EventKind};
pub use manager::CrdtManager;
pub use sync::{RemoteNode, SyncEngine, SyncTransport};
pub use vector_clock::{CausalOrder, VectorClock};

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Structured CRDT errors from the crdt module
    #[error(transparent)]
    Crdt(crdt::CrdtError),

    /// Structured storage errors from the store module
    #[error(transparent)]
    Store(store::StoreError),

    /// Structured entity lifecycle errors from the manager module
    #[error(transparent)]
    Manager(manager::ManagerError),

    /// Structured synchronization errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Crdt(_) => "crdt",
            Error::Store(_) => "store",
            Error::Manager(_) => "manager",
            Error::Sync(_) => "sync",
        }
    }

    /// Check if this error indicates a missing entity.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Manager(err) => err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a create conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Manager(err) => err.is_already_exists(),
            _ => false,
        }
    }

    /// Check if this error is a fatal durable-storage failure.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    /// Check if this error is a recoverable transport failure.
    pub fn is_transport_error(&self) -> bool {
        match self {
            Error::Sync(err) => err.is_transport_error(),
            _ => false,
        }
    }

    /// Check if this error is a failed two-phase-set membership precondition.
    pub fn is_not_a_member(&self) -> bool {
        match self {
            Error::Crdt(err) => err.is_not_a_member(),
            _ => false,
        }
    }
}
