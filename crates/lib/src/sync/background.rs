//! Periodic background synchronization.
//!
//! Each configured remote gets its own tokio task running bidirectional
//! rounds on an independent interval. A failed round is logged and retried
//! on the next tick; shutdown aborts between rounds, which is safe because
//! watermark advancement is the final atomic step of a round - an
//! interrupted round simply re-sends the same events next time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{RemoteNode, SyncEngine};

/// Runs periodic sync rounds against a set of remotes.
pub struct SyncScheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Create a scheduler with no remotes.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Start a periodic bidirectional sync task for one remote.
    ///
    /// The first round runs immediately, then every `interval`. Rounds for
    /// different remotes run concurrently.
    pub fn spawn(&mut self, engine: Arc<SyncEngine>, remote: RemoteNode, interval: Duration) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.bidirectional_sync(&remote).await {
                            Ok(outcome) => debug!(
                                remote = %remote.node_id,
                                sent = outcome.sent,
                                received = outcome.received,
                                merged = outcome.merged,
                                "background sync round completed"
                            ),
                            Err(err) => warn!(
                                remote = %remote.node_id,
                                error = %err,
                                "background sync round failed"
                            ),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });
        self.handles.push(handle);
    }

    /// Stop all sync tasks and wait for them to exit.
    ///
    /// In-flight rounds finish their current step; no state is corrupted by
    /// stopping between rounds.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}
