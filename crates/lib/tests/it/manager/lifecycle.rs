//! Local entity lifecycle: create, update, delete, read, evict.

use concord::store::EventStore;

use crate::helpers::standalone_node;

#[tokio::test]
async fn create_then_read() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({"name": "a.txt"}))
        .await
        .unwrap();

    let state = node.manager.entity_state("f1").await.unwrap().unwrap();
    assert_eq!(state, serde_json::json!({"name": "a.txt"}));

    // One created event, clock at {n1: 1}.
    let events = node.store.events_for_entity("f1").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].vector_clock.get("n1"), 1);
}

#[tokio::test]
async fn create_of_existing_entity_conflicts() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({}))
        .await
        .unwrap();

    let err = node
        .manager
        .create_entity("f1", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn update_patches_and_advances_clock() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({"name": "a.txt", "size": 1}))
        .await
        .unwrap();
    node.manager
        .update_entity("f1", serde_json::json!({"size": 2, "owner": "alice"}))
        .await
        .unwrap();

    let state = node.manager.entity_state("f1").await.unwrap().unwrap();
    assert_eq!(
        state,
        serde_json::json!({"name": "a.txt", "size": 2, "owner": "alice"})
    );

    let events = node.store.events_for_entity("f1").await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].vector_clock.get("n1"), 2);
}

#[tokio::test]
async fn update_of_unknown_entity_fails() {
    let node = standalone_node("n1");
    let err = node
        .manager
        .update_entity("ghost", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_tombstones_and_hides_entity() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({"name": "a.txt"}))
        .await
        .unwrap();
    node.manager.delete_entity("f1").await.unwrap();

    assert_eq!(node.manager.entity_state("f1").await.unwrap(), None);

    // The tombstone is an event, not a log removal.
    let events = node.store.events_for_entity("f1").await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[1].payload.is_tombstone());

    // Tombstoned entities reject further local mutation.
    assert!(node
        .manager
        .update_entity("f1", serde_json::json!({}))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(node.manager.delete_entity("f1").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn create_over_tombstone_dominates_it() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();
    node.manager.delete_entity("f1").await.unwrap();
    node.manager
        .create_entity("f1", serde_json::json!({"v": 2}))
        .await
        .unwrap();

    let state = node.manager.entity_state("f1").await.unwrap().unwrap();
    assert_eq!(state, serde_json::json!({"v": 2}));

    // The re-creation continues the entity's clock rather than restarting
    // it, so it causally dominates the tombstone everywhere.
    let events = node.store.events_for_entity("f1").await.unwrap();
    assert_eq!(events[2].vector_clock.get("n1"), 3);
}

#[tokio::test]
async fn evicted_register_reloads_from_durable_state() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({"v": 1}))
        .await
        .unwrap();

    node.manager.evict("f1").await;
    assert_eq!(node.manager.statistics().await.live_registers, 0);

    // Reads fall back to the snapshot; nothing was lost.
    let state = node.manager.entity_state("f1").await.unwrap().unwrap();
    assert_eq!(state, serde_json::json!({"v": 1}));
    assert_eq!(node.manager.statistics().await.live_registers, 1);
}

#[tokio::test]
async fn statistics_report_node_and_cache_size() {
    let node = standalone_node("n1");
    node.manager
        .create_entity("f1", serde_json::json!({}))
        .await
        .unwrap();
    node.manager
        .create_entity("f2", serde_json::json!({}))
        .await
        .unwrap();

    let stats = node.manager.statistics().await;
    assert_eq!(stats.node_id, "n1");
    assert_eq!(stats.live_registers, 2);
}
