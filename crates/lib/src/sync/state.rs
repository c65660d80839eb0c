//! Sync progress tracking: watermarks, round outcomes, and status reporting.
//!
//! Watermarks are not stored on their own - they are derived from the sync
//! audit log, which is only ever appended after a round fully succeeds. That
//! makes watermark advancement the final, atomic step of a round: an aborted
//! or failed round leaves the log untouched and the next round simply covers
//! the same events again.

use chrono::{DateTime, Utc};

use crate::Result;
use crate::event::Event;
use crate::store::{EventStore, SyncDirection};

/// Outcome of a push round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// Events delivered to the remote.
    pub sent: u64,
}

/// Outcome of a pull round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullOutcome {
    /// Events received from the remote.
    pub received: u64,
    /// Received events that changed local state.
    pub merged: u64,
}

/// Outcome of a bidirectional round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub sent: u64,
    pub received: u64,
    pub merged: u64,
}

/// Outcome of an application-driven exchange
/// ([`SyncEngine::sync_with_remote`](super::SyncEngine::sync_with_remote)).
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// Inbound events that changed local state.
    pub synced: u64,
    /// Local events the caller should deliver back to the remote.
    pub outbound: Vec<Event>,
}

/// Read-only sync state for one remote node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// When the last round with this remote completed, in any direction.
    pub last_sync: Option<DateTime<Utc>>,
    /// Direction of that round.
    pub last_direction: Option<SyncDirection>,
    /// Local events not yet covered by the export watermark.
    pub pending_local_events: u64,
}

/// The epoch: the watermark of a remote we have never synced with.
pub(super) fn initial_watermark() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The ingest cursor for `remote`: everything at or before it has been
/// fetched and merged.
pub(super) async fn pull_watermark(
    store: &dyn EventStore,
    remote_node_id: &str,
) -> Result<DateTime<Utc>> {
    Ok(store
        .last_sync(remote_node_id, SyncDirection::Pull)
        .await?
        .map(|entry| entry.watermark)
        .unwrap_or_else(initial_watermark))
}

/// The export cursor for `remote`: everything at or before it has been
/// delivered. Push rounds and application-driven bidirectional exchanges
/// both advance it.
pub(super) async fn export_watermark(
    store: &dyn EventStore,
    remote_node_id: &str,
) -> Result<DateTime<Utc>> {
    let push = store
        .last_sync(remote_node_id, SyncDirection::Push)
        .await?
        .map(|entry| entry.watermark);
    let exchange = store
        .last_sync(remote_node_id, SyncDirection::Bidirectional)
        .await?
        .map(|entry| entry.watermark);
    Ok(push.max(exchange).unwrap_or_else(initial_watermark))
}

/// High-water mark of a batch: the latest event timestamp, or `fallback`
/// when the batch is empty (an empty round does not move the cursor).
pub(super) fn batch_watermark(events: &[Event], fallback: DateTime<Utc>) -> DateTime<Utc> {
    events
        .iter()
        .map(|event| event.timestamp)
        .max()
        .unwrap_or(fallback)
}
