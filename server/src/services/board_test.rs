use super::*;
use crate::state::test_helpers::{seed_board, test_app_state};
use events::EventBody;
use tokio::time::{Duration, timeout};

#[tokio::test]
async fn get_board_reads_store_once_within_ttl() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);

    let first = get_board(&state, board_id).await.expect("board");
    let second = get_board(&state, board_id).await.expect("board");
    assert_eq!(first, second);
    assert_eq!(store.reads(), 1);
}

#[tokio::test]
async fn get_board_does_not_cache_not_found() {
    let (state, store) = test_app_state();
    let missing = Uuid::new_v4();

    assert!(matches!(get_board(&state, missing).await, Err(StoreError::BoardNotFound(_))));
    assert!(matches!(get_board(&state, missing).await, Err(StoreError::BoardNotFound(_))));
    assert_eq!(store.reads(), 2);
}

#[tokio::test]
async fn update_board_invalidates_then_broadcasts_full_state() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let mut sub = state.hub.subscribe(board_id);
    get_board(&state, board_id).await.expect("warm cache");

    let update = BoardUpdate { name: Some("Atrium".into()), configuration: None };
    let board = update_board(&state, board_id, update).await.expect("update");
    assert_eq!(board.name, "Atrium");

    let event = timeout(Duration::from_secs(1), sub.rx.recv()).await.expect("event").expect("open");
    assert_eq!(event.body, EventBody::BoardUpdated { data: Some(board.clone()) });

    // A read after the broadcast sees the new value.
    let reread = get_board(&state, board_id).await.expect("board");
    assert_eq!(reread.name, "Atrium");
    assert_eq!(store.reads(), 2);
}

#[tokio::test]
async fn update_board_rejects_blank_name_without_broadcast() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let mut sub = state.hub.subscribe(board_id);

    let update = BoardUpdate { name: Some("   ".into()), configuration: None };
    assert!(matches!(update_board(&state, board_id, update).await, Err(ServiceError::Invalid(_))));
    assert!(sub.rx.try_recv().is_err());
}

#[tokio::test]
async fn failed_store_write_does_not_broadcast() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let mut sub = state.hub.subscribe(board_id);
    store.set_failing(true);

    let update = BoardUpdate { name: Some("Atrium".into()), configuration: None };
    assert!(matches!(update_board(&state, board_id, update).await, Err(ServiceError::Store(_))));
    assert!(sub.rx.try_recv().is_err());
}

#[tokio::test]
async fn notify_board_changed_sends_invalidate_to_board_streams() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let mut sub = state.hub.subscribe(board_id);

    assert_eq!(notify_board_changed(&state, board_id), 1);
    let event = sub.rx.recv().await.expect("event");
    assert_eq!(event.delivery(), events::Delivery::Invalidate);
}
