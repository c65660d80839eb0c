//! Durable event storage.
//!
//! The [`EventStore`] trait owns everything that persists: the append-only
//! event log, the per-entity snapshots, and the sync audit log. The log is
//! the source of truth; snapshots are a rebuildable cache and the register
//! cache in [`CrdtManager`](crate::manager::CrdtManager) is disposable.
//!
//! Two implementations ship: [`InMemoryStore`] (always available; tests and
//! embedding) and [`SqliteStore`](crate::store::sql::SqliteStore) behind the
//! `sqlite` feature.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::crdt::{Crdt, LwwRegister};
use crate::event::{EntityValue, Event};
use crate::vector_clock::VectorClock;

pub mod errors;
pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sql;

pub use errors::StoreError;
pub use in_memory::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use sql::SqliteStore;

/// Materialized state for one entity.
///
/// Purely a performance cache: replaying the entity's events always produces
/// the same state. Beyond the state and clock it carries the winning writer
/// and write time, so a register loaded from a snapshot tie-breaks exactly
/// like one rebuilt by replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entity_id: String,
    pub state: EntityValue,
    pub vector_clock: VectorClock,
    pub last_writer: String,
    pub written_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Capture a register's current state.
    pub fn from_register(
        entity_id: impl Into<String>,
        register: &LwwRegister<EntityValue>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: register.value().clone(),
            vector_clock: register.vector_clock().clone(),
            last_writer: register.writer().to_string(),
            written_at: register.written_at(),
            updated_at,
        }
    }

    /// Reconstruct the register this snapshot captured.
    pub fn to_register(&self) -> LwwRegister<EntityValue> {
        LwwRegister::new(
            self.state.clone(),
            self.last_writer.clone(),
            self.written_at,
            self.vector_clock.clone(),
        )
    }
}

/// Which way a sync round moved events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Pull,
    Push,
    Bidirectional,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncDirection::Pull => "pull",
            SyncDirection::Push => "push",
            SyncDirection::Bidirectional => "bidirectional",
        };
        f.write_str(s)
    }
}

/// Audit record of one completed sync round.
///
/// Append-only; the merge algorithm never reads it. The sync engine derives
/// its per-remote watermarks from the latest entry per direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub remote_node_id: String,
    pub direction: SyncDirection,
    /// High-water mark of event timestamps covered by this round. For pull
    /// rounds these are remote event timestamps; for push and bidirectional
    /// rounds, local ones.
    pub watermark: DateTime<Utc>,
    pub events_synced: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Contract for durable persistence of events, snapshots, and the sync log.
///
/// Storage failures always surface as [`StoreError`] - an append that cannot
/// be made durable fails the whole operation, never silently drops.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably append one event to the log.
    async fn append(&self, event: &Event) -> Result<()>;

    /// Append an event and upsert the entity's snapshot in one atomic
    /// transaction, so the log and cache can never commit half a mutation.
    async fn append_with_snapshot(&self, event: &Event, snapshot: &Snapshot) -> Result<()>;

    /// All events for one entity, in append order.
    ///
    /// Append order, not timestamp order: remote events arrive out of
    /// timestamp order and replay must see them the way they were applied.
    async fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>>;

    /// All events with a timestamp strictly after `since`, across entities,
    /// in timestamp order. Restartable and side-effect free; this is the
    /// sync export query.
    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Number of events with a timestamp strictly after `since`.
    async fn count_events_since(&self, since: DateTime<Utc>) -> Result<u64>;

    /// Distinct entity ids with events strictly after `since`.
    async fn entities_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Idempotent snapshot upsert.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// The entity's snapshot, if one has been written.
    async fn snapshot(&self, entity_id: &str) -> Result<Option<Snapshot>>;

    /// Append one sync audit record.
    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()>;

    /// The most recent sync record for a remote in the given direction.
    async fn last_sync(
        &self,
        remote_node_id: &str,
        direction: SyncDirection,
    ) -> Result<Option<SyncLogEntry>>;

    /// Full audit trail for a remote, oldest first.
    async fn sync_log(&self, remote_node_id: &str) -> Result<Vec<SyncLogEntry>>;

    /// Every remote node id that appears in the sync log.
    async fn known_remotes(&self) -> Result<Vec<String>>;

    /// Rebuild an entity's register by replaying its full event history.
    ///
    /// The canonical recovery path, and the correctness oracle tests hold
    /// the incremental path against. Returns `None` for an entity with no
    /// events.
    async fn rebuild_register(&self, entity_id: &str) -> Result<Option<LwwRegister<EntityValue>>> {
        let events = self.events_for_entity(entity_id).await?;
        Ok(replay(&events))
    }
}

/// Fold a sequence of events into the register state they imply.
///
/// Deliberately independent of the incremental apply-on-write path in the
/// manager: the first event seeds the register and every later event is
/// merged in via the ordinary two-stage LWW rule. Because merge is
/// commutative, associative, and idempotent, the fold converges to the same
/// state for any arrival order of the same events.
pub fn replay(events: &[Event]) -> Option<LwwRegister<EntityValue>> {
    let mut events = events.iter();
    let first = events.next()?;
    let mut register = first.to_register();
    for event in events {
        register = register.merge(&event.to_register());
    }
    Some(register)
}
