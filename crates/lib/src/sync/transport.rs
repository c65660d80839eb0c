//! Transport abstraction for node-to-node event exchange.
//!
//! The engine never moves bytes itself. A [`SyncTransport`] implementation
//! (HTTP, file drop, message queue - whatever the deployment uses) carries
//! serialized event batches between nodes; the engine only relies on this
//! narrow contract. Address resolution is likewise external: the engine
//! receives already-resolved [`RemoteNode`] handles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::event::Event;

/// A resolved handle for one sync target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    /// The remote node's identifier, as it appears in vector clocks.
    pub node_id: String,
    /// Transport-specific address (URL, path, queue name...). Opaque to the
    /// engine.
    pub address: String,
}

impl RemoteNode {
    pub fn new(node_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
        }
    }
}

/// Moves event batches to and from one remote node.
///
/// Delivery is at-least-once: implementations confirm delivery by returning
/// the number of events the remote accepted, and the engine only advances
/// its watermark after that confirmation. Duplicated deliveries on retry are
/// safe because remote merges are idempotent. Failures surface as
/// [`SyncError::Transport`](super::SyncError::Transport); implementations
/// must not partially apply a batch and report success.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Deliver a batch of local events to the remote node.
    ///
    /// Returns the number of events the remote confirmed. Must not return
    /// `Ok` unless the whole batch was handed over.
    async fn send_events(&self, remote: &RemoteNode, events: &[Event]) -> Result<u64>;

    /// Fetch the remote node's events with timestamps strictly after
    /// `since`.
    async fn fetch_events(&self, remote: &RemoteNode, since: DateTime<Utc>) -> Result<Vec<Event>>;
}
