//! Entity lifecycle and merge coordination.
//!
//! [`CrdtManager`] owns the live register cache: one
//! [`LwwRegister`](crate::crdt::LwwRegister) per entity, keyed by entity id
//! and guarded by a per-entity async mutex so a local write and an incoming
//! remote merge for the same entity serialize while unrelated entities
//! proceed in parallel. The cache is disposable - every register is
//! recoverable from the snapshot table or, failing that, by replaying the
//! event log.
//!
//! Every mutation follows write-ahead ordering: the event (plus the updated
//! snapshot) is durably appended first, and only then does the cached
//! register change. A crash between the two leaves a cache that is merely
//! stale, never a log that is missing data.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::clock::{Clock, SystemClock};
use crate::crdt::{Crdt, LwwRegister};
use crate::event::{EntityValue, Event, EventKind};
use crate::store::{EventStore, Snapshot};

pub mod errors;

pub use errors::ManagerError;

/// Remote timestamps further than this from the local clock trigger a
/// clock-skew warning. The merge itself is unaffected: causal comparison is
/// primary and the timestamp is only a tie-break.
const CLOCK_SKEW_TOLERANCE_SECS: i64 = 300;

#[derive(Default)]
struct EntitySlot {
    register: Option<LwwRegister<EntityValue>>,
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    pub node_id: String,
    pub live_registers: usize,
}

/// Coordinates all mutations of replicated entity state on one node.
///
/// Local mutations ([`create_entity`](Self::create_entity),
/// [`update_entity`](Self::update_entity),
/// [`delete_entity`](Self::delete_entity)) stamp the entity's clock
/// incremented for this node, so they causally dominate everything the node
/// has seen for that entity. Remote state arrives through
/// [`apply_remote_events`](Self::apply_remote_events) and goes through the
/// two-stage LWW merge.
pub struct CrdtManager {
    node_id: String,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    entities: Mutex<HashMap<String, Arc<AsyncMutex<EntitySlot>>>>,
}

impl CrdtManager {
    /// Create a manager for `node_id` using the system clock.
    pub fn new(node_id: impl Into<String>, store: Arc<dyn EventStore>) -> Self {
        Self::with_clock(node_id, store, Arc::new(SystemClock))
    }

    /// Create a manager with an explicit time source.
    pub fn with_clock(
        node_id: impl Into<String>,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let node_id = node_id.into();
        info!(node_id = %node_id, "crdt manager initialized");
        Self {
            node_id,
            store,
            clock,
            entities: Mutex::new(HashMap::new()),
        }
    }

    /// This node's identifier.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The backing event store.
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The manager's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Create a new entity with an initial payload.
    ///
    /// Fails with [`ManagerError::EntityAlreadyExists`] when a live
    /// (non-tombstoned) register exists. Creating over a tombstone is
    /// allowed: the new write increments the tombstone's clock and so
    /// causally dominates it.
    pub async fn create_entity(&self, entity_id: &str, initial: serde_json::Value) -> Result<()> {
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;
        self.load(entity_id, &mut slot).await?;

        let prior_clock = match &slot.register {
            Some(register) if !register.value().is_tombstone() => {
                return Err(ManagerError::EntityAlreadyExists {
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
            Some(register) => register.vector_clock().clone(),
            None => Default::default(),
        };

        let now = self.clock.now_utc();
        let register = LwwRegister::new(
            EntityValue::doc(initial),
            self.node_id.clone(),
            now,
            prior_clock.increment(&self.node_id),
        );
        self.persist(entity_id, EventKind::Created, &register).await?;
        slot.register = Some(register);
        info!(entity_id, "entity created");
        Ok(())
    }

    /// Apply a patch to an entity's payload.
    ///
    /// JSON-object patches are shallow-merged into the current document
    /// (patch keys win); any other patch replaces the document. Fails with
    /// [`ManagerError::EntityNotFound`] for unknown or tombstoned entities.
    pub async fn update_entity(&self, entity_id: &str, patch: serde_json::Value) -> Result<()> {
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;
        self.load(entity_id, &mut slot).await?;

        let register = match &slot.register {
            Some(register) if !register.value().is_tombstone() => register,
            _ => {
                return Err(ManagerError::EntityNotFound {
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
        };

        let current = register
            .value()
            .as_doc()
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let mut updated = register.clone();
        updated.set(
            EntityValue::doc(merge_patch(current, patch)),
            &self.node_id,
            self.clock.now_utc(),
        );
        self.persist(entity_id, EventKind::Updated, &updated).await?;
        slot.register = Some(updated);
        debug!(entity_id, "entity updated");
        Ok(())
    }

    /// Delete an entity by writing a tombstone value.
    ///
    /// The tombstone goes through the ordinary LWW path, so it participates
    /// in causal merges against concurrent remote updates - and can lose
    /// them, resurrecting the entity. Fails with
    /// [`ManagerError::EntityNotFound`] for unknown or already tombstoned
    /// entities.
    pub async fn delete_entity(&self, entity_id: &str) -> Result<()> {
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;
        self.load(entity_id, &mut slot).await?;

        let register = match &slot.register {
            Some(register) if !register.value().is_tombstone() => register,
            _ => {
                return Err(ManagerError::EntityNotFound {
                    entity_id: entity_id.to_string(),
                }
                .into());
            }
        };

        let now = self.clock.now_utc();
        let mut deleted = register.clone();
        deleted.set(EntityValue::tombstone(now), &self.node_id, now);
        self.persist(entity_id, EventKind::Deleted, &deleted).await?;
        slot.register = Some(deleted);
        info!(entity_id, "entity tombstoned");
        Ok(())
    }

    /// The entity's current payload, or `None` for unknown or tombstoned
    /// entities.
    ///
    /// Reads from the live cache, falling back to the snapshot and finally
    /// to a full event replay.
    pub async fn entity_state(&self, entity_id: &str) -> Result<Option<serde_json::Value>> {
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;
        self.load(entity_id, &mut slot).await?;
        Ok(slot
            .register
            .as_ref()
            .and_then(|r| r.value().as_doc().cloned()))
    }

    /// Merge a batch of remote events into local state.
    ///
    /// Each event's implied register is merged against the local register
    /// under the two-stage rule. When the merge changes local state, a new
    /// local event recording the merge outcome is persisted - the raw remote
    /// event is never re-appended, so exported streams only ever carry
    /// merged, monotonically consistent state. Returns the number of events
    /// that changed local state; re-delivering an already-merged batch is a
    /// counted no-op.
    pub async fn apply_remote_events(&self, events: &[Event]) -> Result<u64> {
        let mut merged_count = 0;
        for event in events {
            self.check_clock_skew(event);
            if self.apply_remote_event(event).await? {
                merged_count += 1;
            }
        }
        debug!(
            received = events.len(),
            merged = merged_count,
            "remote batch applied"
        );
        Ok(merged_count)
    }

    /// Rebuild an entity's register by replaying its full event history.
    ///
    /// Forces the canonical replay path regardless of cache or snapshot
    /// state; used by repair tooling and as a correctness oracle in tests.
    pub async fn rebuild_state_from_events(
        &self,
        entity_id: &str,
    ) -> Result<Option<LwwRegister<EntityValue>>> {
        self.store.rebuild_register(entity_id).await
    }

    /// Repair cache/snapshot drift for one entity.
    ///
    /// Replays the event log and, if the result differs from the snapshot or
    /// the cached register, re-persists and re-caches it. Returns `true` if
    /// anything was repaired; a consistent entity is a no-op.
    pub async fn resolve_conflicts(&self, entity_id: &str) -> Result<bool> {
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;

        let Some(rebuilt) = self.store.rebuild_register(entity_id).await? else {
            return Ok(false);
        };

        let snapshot_consistent = self
            .store
            .snapshot(entity_id)
            .await?
            .is_some_and(|s| s.to_register() == rebuilt);
        let cache_consistent = slot
            .register
            .as_ref()
            .is_none_or(|cached| *cached == rebuilt);
        if snapshot_consistent && cache_consistent {
            return Ok(false);
        }

        let snapshot = Snapshot::from_register(entity_id, &rebuilt, self.clock.now_utc());
        self.store.write_snapshot(&snapshot).await?;
        slot.register = Some(rebuilt);
        info!(entity_id, "entity state repaired from event log");
        Ok(true)
    }

    /// Drop an entity's cached register.
    ///
    /// The next access reloads it from the snapshot or the event log; no
    /// information is lost.
    pub async fn evict(&self, entity_id: &str) {
        let slot = { self.entities.lock().unwrap().get(entity_id).cloned() };
        if let Some(slot) = slot {
            slot.lock().await.register = None;
        }
    }

    /// Node id and live-register count.
    pub async fn statistics(&self) -> Statistics {
        let slots: Vec<_> = self.entities.lock().unwrap().values().cloned().collect();
        let mut live_registers = 0;
        for slot in slots {
            if slot.lock().await.register.is_some() {
                live_registers += 1;
            }
        }
        Statistics {
            node_id: self.node_id.clone(),
            live_registers,
        }
    }

    async fn apply_remote_event(&self, remote_event: &Event) -> Result<bool> {
        let entity_id = &remote_event.entity_id;
        let slot = self.slot(entity_id);
        let mut slot = slot.lock().await;
        self.load(entity_id, &mut slot).await?;

        let remote = remote_event.to_register();
        let (merged, kind) = match &slot.register {
            None => {
                let kind = if remote.value().is_tombstone() {
                    EventKind::Deleted
                } else {
                    EventKind::Created
                };
                (remote, kind)
            }
            Some(local) => {
                let merged = local.merge(&remote);
                if merged == *local {
                    debug!(entity_id, event_id = %remote_event.event_id, "remote event was a no-op");
                    return Ok(false);
                }
                let kind = if merged.value().is_tombstone() {
                    EventKind::Deleted
                } else {
                    EventKind::Updated
                };
                (merged, kind)
            }
        };

        self.persist(entity_id, kind, &merged).await?;
        slot.register = Some(merged);
        debug!(entity_id, event_id = %remote_event.event_id, "remote event merged");
        Ok(true)
    }

    /// Durably record a register's state: one event plus the refreshed
    /// snapshot, committed atomically, before the cache may change.
    async fn persist(
        &self,
        entity_id: &str,
        kind: EventKind,
        register: &LwwRegister<EntityValue>,
    ) -> Result<()> {
        let event = Event::from_register(entity_id, kind, register);
        let snapshot = Snapshot::from_register(entity_id, register, self.clock.now_utc());
        self.store.append_with_snapshot(&event, &snapshot).await
    }

    fn check_clock_skew(&self, event: &Event) {
        let skew = (event.timestamp - self.clock.now_utc()).num_seconds();
        if skew.abs() > CLOCK_SKEW_TOLERANCE_SECS {
            warn!(
                event_id = %event.event_id,
                origin = %event.node_id,
                skew_secs = skew,
                "remote event timestamp far outside tolerance"
            );
        }
    }

    fn slot(&self, entity_id: &str) -> Arc<AsyncMutex<EntitySlot>> {
        self.entities
            .lock()
            .unwrap()
            .entry(entity_id.to_string())
            .or_default()
            .clone()
    }

    async fn load(&self, entity_id: &str, slot: &mut EntitySlot) -> Result<()> {
        if slot.register.is_some() {
            return Ok(());
        }
        if let Some(snapshot) = self.store.snapshot(entity_id).await? {
            slot.register = Some(snapshot.to_register());
            return Ok(());
        }
        slot.register = self.store.rebuild_register(entity_id).await?;
        Ok(())
    }
}

/// Shallow-merge `patch` into `current` when both are JSON objects; any
/// other combination replaces the document outright.
fn merge_patch(current: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (current, patch) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(updates)) => {
            for (key, value) in updates {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, patch) => patch,
    }
}
