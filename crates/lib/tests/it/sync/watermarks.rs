//! Watermark semantics: advancement only on confirmed delivery, no loss on
//! failed or aborted rounds, no re-sending after success.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use concord::store::{EventStore, SyncDirection};
use concord::sync::SyncEngine;

use crate::helpers::{FailingTransport, Network, T0, test_node};

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

#[tokio::test]
async fn failed_push_leaves_watermark_untouched() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0);

    n1.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();

    let broken = SyncEngine::new(n1.manager.clone(), Arc::new(FailingTransport));
    let err = broken.push_sync(&n2.remote(), None).await.unwrap_err();
    assert!(err.is_transport_error());

    // No audit entry, no watermark movement, local state untouched.
    assert!(n1.store.last_sync("n2", SyncDirection::Push).await.unwrap().is_none());
    assert_eq!(
        n1.manager.entity_state("f1").await.unwrap().unwrap(),
        serde_json::json!({"v": 1})
    );

    // The next (working) round picks up the exact same events.
    let outcome = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert_eq!(outcome.sent, 1);
    assert_eq!(
        n2.manager.entity_state("f1").await.unwrap().unwrap(),
        serde_json::json!({"v": 1})
    );
}

#[tokio::test]
async fn failed_pull_leaves_watermark_untouched() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0);

    n2.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();

    let broken = SyncEngine::new(n1.manager.clone(), Arc::new(FailingTransport));
    assert!(broken.pull_sync(&n2.remote()).await.unwrap_err().is_transport_error());
    assert!(n1.store.last_sync("n2", SyncDirection::Pull).await.unwrap().is_none());

    let outcome = n1.engine.pull_sync(&n2.remote()).await.unwrap();
    assert_eq!(outcome.received, 1);
    assert_eq!(outcome.merged, 1);
}

#[tokio::test]
async fn successful_push_is_not_resent() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0);

    n1.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();

    let first = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert_eq!(first.sent, 1);

    // Nothing new: the watermark covers the batch, so nothing goes out.
    let second = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert_eq!(second.sent, 0);

    // A new write moves past the watermark and is exported alone.
    n1.manager
        .update_entity("f1", serde_json::json!({"v": 2}))
        .await
        .unwrap();
    let third = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert_eq!(third.sent, 1);
}

#[tokio::test]
async fn explicit_since_overrides_the_watermark() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0);

    n1.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();
    n1.engine.push_sync(&n2.remote(), None).await.unwrap();

    // Re-send everything from the epoch: duplicate delivery is safe.
    let resend = n1.engine.push_sync(&n2.remote(), Some(epoch())).await.unwrap();
    assert_eq!(resend.sent, 1);
    assert_eq!(
        n2.manager.entity_state("f1").await.unwrap().unwrap(),
        serde_json::json!({"v": 1})
    );
}

#[tokio::test]
async fn empty_round_is_recorded_but_does_not_advance() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0);

    let outcome = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert_eq!(outcome.sent, 0);

    let entry = n1
        .store
        .last_sync("n2", SyncDirection::Push)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.watermark, epoch());
    assert_eq!(entry.events_synced, 0);

    // A write made after the empty round is still exported.
    n1.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();
    assert_eq!(n1.engine.push_sync(&n2.remote(), None).await.unwrap().sent, 1);
}

#[tokio::test]
async fn pull_and_push_watermarks_are_independent() {
    let network = Network::new();
    let n1 = test_node(&network, "n1", T0);
    let n2 = test_node(&network, "n2", T0 + 1_000);

    n1.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();
    n2.manager
        .create_entity("f2", serde_json::json!({"v": 2}))
        .await
        .unwrap();

    n1.engine.pull_sync(&n2.remote()).await.unwrap();
    let pull = n1.store.last_sync("n2", SyncDirection::Pull).await.unwrap().unwrap();
    assert!(pull.watermark > epoch());
    // The pull did not move the push cursor.
    assert!(n1.store.last_sync("n2", SyncDirection::Push).await.unwrap().is_none());

    let push = n1.engine.push_sync(&n2.remote(), None).await.unwrap();
    assert!(push.sent >= 1);
}
