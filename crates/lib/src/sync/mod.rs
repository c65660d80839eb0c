//! Synchronization engine.
//!
//! [`SyncEngine`] orchestrates event exchange with remote nodes: it exports
//! local events past a per-remote watermark, hands them to the
//! [`SyncTransport`] collaborator, feeds received events through
//! [`CrdtManager::apply_remote_events`], and records every completed round
//! in the sync audit log. It never touches entity state directly.
//!
//! Failure semantics: transport errors surface to the caller as a failed
//! round - nothing is retried internally, no watermark moves, and local
//! reads and writes on unrelated entities are never blocked. The next
//! scheduled round covers the same events again; idempotent merge makes the
//! re-delivery harmless.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::Result;
use crate::clock::Clock;
use crate::event::Event;
use crate::manager::CrdtManager;
use crate::store::{EventStore, SyncDirection, SyncLogEntry};

pub mod background;
pub mod errors;
pub mod state;
pub mod transport;

pub use background::SyncScheduler;
pub use errors::SyncError;
pub use state::{ExchangeOutcome, PullOutcome, PushOutcome, SyncOutcome, SyncStatus};
pub use transport::{RemoteNode, SyncTransport};

use chrono::{DateTime, Utc};
use state::{batch_watermark, export_watermark, pull_watermark};

/// Exchanges events with remote nodes and tracks per-remote progress.
///
/// Rounds for different remotes are independent and may run concurrently;
/// the only serialization in the system is per-entity, inside the manager,
/// and the engine holds no entity lock across a network operation.
pub struct SyncEngine {
    manager: Arc<CrdtManager>,
    store: Arc<dyn EventStore>,
    transport: Arc<dyn SyncTransport>,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    /// Create an engine over a manager and a transport.
    pub fn new(manager: Arc<CrdtManager>, transport: Arc<dyn SyncTransport>) -> Self {
        let store = manager.store().clone();
        let clock = manager.clock().clone();
        Self {
            manager,
            store,
            transport,
            clock,
        }
    }

    /// The node id this engine syncs on behalf of.
    pub fn node_id(&self) -> &str {
        self.manager.node_id()
    }

    /// Deliver local events to a remote node.
    ///
    /// Exports events strictly after the push watermark (or the explicit
    /// `since`), sends them through the transport, and - only after the
    /// transport confirms the whole batch - appends the audit entry that
    /// advances the watermark. At-least-once: an aborted round re-sends the
    /// same events next time.
    pub async fn push_sync(
        &self,
        remote: &RemoteNode,
        since: Option<DateTime<Utc>>,
    ) -> Result<PushOutcome> {
        let cursor = export_watermark(self.store.as_ref(), &remote.node_id).await?;
        let watermark = since.unwrap_or(cursor);
        let events = self.store.events_since(watermark).await?;

        if events.is_empty() {
            self.record_round(remote, SyncDirection::Push, cursor, 0)
                .await?;
            return Ok(PushOutcome { sent: 0 });
        }

        let sent = self.transport.send_events(remote, &events).await?;
        if sent < events.len() as u64 {
            return Err(SyncError::PartialDelivery {
                remote: remote.node_id.clone(),
                sent: events.len() as u64,
                acknowledged: sent,
            }
            .into());
        }

        // An explicit `since` may re-send already-covered events; the
        // derived cursor still never moves backwards.
        let advanced = batch_watermark(&events, watermark).max(cursor);
        self.record_round(remote, SyncDirection::Push, advanced, sent)
            .await?;
        info!(remote = %remote.node_id, sent, "push sync completed");
        Ok(PushOutcome { sent })
    }

    /// Fetch and merge a remote node's events.
    ///
    /// Requests events strictly after the pull watermark, merges them
    /// through the manager, and records the round. The watermark only
    /// advances after every event has been applied.
    pub async fn pull_sync(&self, remote: &RemoteNode) -> Result<PullOutcome> {
        let watermark = pull_watermark(self.store.as_ref(), &remote.node_id).await?;
        let events = self.transport.fetch_events(remote, watermark).await?;
        let merged = self.manager.apply_remote_events(&events).await?;

        let advanced = batch_watermark(&events, watermark);
        self.record_round(remote, SyncDirection::Pull, advanced, events.len() as u64)
            .await?;
        info!(
            remote = %remote.node_id,
            received = events.len(),
            merged,
            "pull sync completed"
        );
        Ok(PullOutcome {
            received: events.len() as u64,
            merged,
        })
    }

    /// Full exchange with a remote: pull, then push.
    ///
    /// Pull runs first so that merge events generated by applying remote
    /// state are included in the push, leaving both sides fully informed
    /// after one round.
    pub async fn bidirectional_sync(&self, remote: &RemoteNode) -> Result<SyncOutcome> {
        let pull = self.pull_sync(remote).await?;
        let push = self.push_sync(remote, None).await?;
        Ok(SyncOutcome {
            sent: push.sent,
            received: pull.received,
            merged: pull.merged,
        })
    }

    /// Application-driven exchange for externally transported batches.
    ///
    /// For deployments where the application layer moves the bytes (the
    /// engine's transport is bypassed): applies the inbound batch and
    /// returns the outbound events the caller must deliver back to the
    /// remote. The returned batch is the caller's responsibility; a caller
    /// that fails to deliver it should fall back to
    /// [`push_sync`](Self::push_sync) with an explicit `since`.
    pub async fn sync_with_remote(
        &self,
        remote_node_id: &str,
        events: &[Event],
    ) -> Result<ExchangeOutcome> {
        let synced = self.manager.apply_remote_events(events).await?;

        let watermark = export_watermark(self.store.as_ref(), remote_node_id).await?;
        let outbound = self.store.events_since(watermark).await?;
        let advanced = batch_watermark(&outbound, watermark);

        self.store
            .append_sync_log(&SyncLogEntry {
                remote_node_id: remote_node_id.to_string(),
                direction: SyncDirection::Bidirectional,
                watermark: advanced,
                events_synced: synced + outbound.len() as u64,
                recorded_at: self.clock.now_utc(),
            })
            .await?;
        debug!(
            remote = %remote_node_id,
            synced,
            outbound = outbound.len(),
            "exchange completed"
        );
        Ok(ExchangeOutcome { synced, outbound })
    }

    /// Local events with timestamps strictly after `since`. Read-only,
    /// restartable; does not move any watermark.
    pub async fn get_local_changes_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
        self.store.events_since(since).await
    }

    /// Per-remote sync state: last round and pending local event count.
    /// Read-only, no side effects.
    pub async fn get_sync_status(&self) -> Result<BTreeMap<String, SyncStatus>> {
        let mut status = BTreeMap::new();
        for remote in self.store.known_remotes().await? {
            let log = self.store.sync_log(&remote).await?;
            let last = log.last();
            let watermark = export_watermark(self.store.as_ref(), &remote).await?;
            let pending = self.store.count_events_since(watermark).await?;
            status.insert(
                remote,
                SyncStatus {
                    last_sync: last.map(|entry| entry.recorded_at),
                    last_direction: last.map(|entry| entry.direction),
                    pending_local_events: pending,
                },
            );
        }
        Ok(status)
    }

    /// Entity ids with events not yet exported to `remote`.
    pub async fn pending_entities(&self, remote_node_id: &str) -> Result<Vec<String>> {
        let watermark = export_watermark(self.store.as_ref(), remote_node_id).await?;
        self.store.entities_changed_since(watermark).await
    }

    /// Repair cache/snapshot drift for one entity from the event log.
    ///
    /// Administrative escape hatch; idempotent. Returns `true` if state was
    /// actually repaired.
    pub async fn resolve_conflicts(&self, entity_id: &str) -> Result<bool> {
        self.manager.resolve_conflicts(entity_id).await
    }

    async fn record_round(
        &self,
        remote: &RemoteNode,
        direction: SyncDirection,
        watermark: DateTime<Utc>,
        events_synced: u64,
    ) -> Result<()> {
        self.store
            .append_sync_log(&SyncLogEntry {
                remote_node_id: remote.node_id.clone(),
                direction,
                watermark,
                events_synced,
                recorded_at: self.clock.now_utc(),
            })
            .await
    }
}
