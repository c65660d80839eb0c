//! In-memory event store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EventStore, Snapshot, SyncDirection, SyncLogEntry};
use crate::Result;
use crate::event::Event;

/// An [`EventStore`] backed by process memory.
///
/// Suitable for tests and for embedders that handle durability themselves.
/// Events are held in a single vector so append order is trivially
/// preserved; snapshots and the sync log live in their own lock so readers
/// of one never contend with writers of another.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    events: RwLock<Vec<Event>>,
    snapshots: RwLock<HashMap<String, Snapshot>>,
    sync_log: RwLock<Vec<SyncLogEntry>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events appended so far.
    pub fn event_count(&self) -> usize {
        self.events.read().unwrap().len()
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append(&self, event: &Event) -> Result<()> {
        self.events.write().unwrap().push(event.clone());
        Ok(())
    }

    async fn append_with_snapshot(&self, event: &Event, snapshot: &Snapshot) -> Result<()> {
        // Take both locks before mutating either, so concurrent readers see
        // the event and snapshot land together.
        let mut events = self.events.write().unwrap();
        let mut snapshots = self.snapshots.write().unwrap();
        events.push(event.clone());
        snapshots.insert(snapshot.entity_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp > since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn count_events_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp > since)
            .count() as u64)
    }

    async fn entities_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp > since)
            .map(|e| e.entity_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.entity_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn snapshot(&self, entity_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().unwrap().get(entity_id).cloned())
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        self.sync_log.write().unwrap().push(entry.clone());
        Ok(())
    }

    async fn last_sync(
        &self,
        remote_node_id: &str,
        direction: SyncDirection,
    ) -> Result<Option<SyncLogEntry>> {
        Ok(self
            .sync_log
            .read()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.remote_node_id == remote_node_id && e.direction == direction)
            .cloned())
    }

    async fn sync_log(&self, remote_node_id: &str) -> Result<Vec<SyncLogEntry>> {
        Ok(self
            .sync_log
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.remote_node_id == remote_node_id)
            .cloned()
            .collect())
    }

    async fn known_remotes(&self) -> Result<Vec<String>> {
        let mut remotes: Vec<String> = self
            .sync_log
            .read()
            .unwrap()
            .iter()
            .map(|e| e.remote_node_id.clone())
            .collect();
        remotes.sort();
        remotes.dedup();
        Ok(remotes)
    }
}
