//! Replication events.
//!
//! Every accepted mutation - local or merged-remote - produces exactly one
//! immutable [`Event`]. Events are the durable source of truth: the live
//! register cache and the per-entity snapshots are both derivable from the
//! event log alone. Deletion is a value (a tombstone event), never a removal
//! from the log.
//!
//! The serialized form doubles as the node-to-node wire format:
//!
//! ```json
//! {
//!   "event_id": "6e5c...",
//!   "entity_id": "file-42",
//!   "event_type": "updated",
//!   "data": { "kind": "doc", "fields": { "name": "report.txt" } },
//!   "timestamp": "2024-01-01T00:00:00.000000+00:00",
//!   "node_id": "n1",
//!   "vector_clock": { "n1": 2 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crdt::LwwRegister;
use crate::vector_clock::VectorClock;

/// What kind of mutation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First write for an entity (or re-creation over a tombstone).
    Created,
    /// A subsequent write to a live entity.
    Updated,
    /// A tombstone write.
    Deleted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// The replicated state of one entity.
///
/// A closed sum so the merge path handles every variant exhaustively: either
/// a live JSON document, or a tombstone. The tombstone is an ordinary value -
/// it merges under the same LWW rule as any document, which is what lets a
/// causally concurrent update win against a delete (and vice versa).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityValue {
    /// A live entity with an arbitrary structured payload.
    Doc {
        fields: serde_json::Value,
    },
    /// The entity has been deleted.
    Tombstone {
        deleted_at: DateTime<Utc>,
    },
}

impl EntityValue {
    /// Wrap a JSON payload as a live document.
    pub fn doc(fields: serde_json::Value) -> Self {
        EntityValue::Doc { fields }
    }

    /// Build a tombstone recorded at `deleted_at`.
    pub fn tombstone(deleted_at: DateTime<Utc>) -> Self {
        EntityValue::Tombstone { deleted_at }
    }

    /// The live payload, if this value is not a tombstone.
    pub fn as_doc(&self) -> Option<&serde_json::Value> {
        match self {
            EntityValue::Doc { fields } => Some(fields),
            EntityValue::Tombstone { .. } => None,
        }
    }

    /// True if this value marks a deletion.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, EntityValue::Tombstone { .. })
    }
}

/// One immutable entry in the replication log.
///
/// An event is a faithful serialization of the register state immediately
/// after the operation it records: `node_id` and `timestamp` are the
/// register's last writer and last write time (for a merge event that is the
/// *winning* write, not the node that happened to apply the merge), and
/// `vector_clock` is the register's clock. [`Event::to_register`] is
/// therefore lossless, which is what makes event replay an exact oracle for
/// incrementally maintained state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique id, assigned once at creation.
    pub event_id: String,
    /// The entity this event mutates.
    pub entity_id: String,
    /// Mutation kind.
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    /// Entity state after the mutation.
    #[serde(rename = "data")]
    pub payload: EntityValue,
    /// Wall clock time of the winning write. Tie-break only; causal order
    /// comes from `vector_clock`.
    pub timestamp: DateTime<Utc>,
    /// Node that performed the winning write.
    pub node_id: String,
    /// Vector clock of the register at emission time.
    pub vector_clock: VectorClock,
}

impl Event {
    /// Create a new event with a fresh unique id.
    pub fn new(
        entity_id: impl Into<String>,
        kind: EventKind,
        payload: EntityValue,
        node_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        vector_clock: VectorClock,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            kind,
            payload,
            timestamp,
            node_id: node_id.into(),
            vector_clock,
        }
    }

    /// Build an event that records a register's current state.
    pub fn from_register(
        entity_id: impl Into<String>,
        kind: EventKind,
        register: &LwwRegister<EntityValue>,
    ) -> Self {
        Self::new(
            entity_id,
            kind,
            register.value().clone(),
            register.writer().to_string(),
            register.written_at(),
            register.vector_clock().clone(),
        )
    }

    /// Reconstruct the register state this event implies.
    pub fn to_register(&self) -> LwwRegister<EntityValue> {
        LwwRegister::new(
            self.payload.clone(),
            self.node_id.clone(),
            self.timestamp,
            self.vector_clock.clone(),
        )
    }
}
