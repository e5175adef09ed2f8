use super::*;
use crate::state::test_helpers::{seed_board, test_app_state};
use events::{EventBody, decode_line};
use futures::StreamExt;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

async fn next_line<S>(lines: &mut S) -> BroadcastEvent
where
    S: Stream<Item = Result<String, Infallible>> + Unpin,
{
    let line = timeout(Duration::from_secs(1), lines.next())
        .await
        .expect("line receive timed out")
        .expect("stream ended")
        .expect("infallible");
    assert!(line.ends_with('\n'));
    decode_line(&line).expect("valid event line")
}

#[tokio::test]
async fn stream_starts_with_connected_then_relays_broadcasts() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);

    let Subscription { rx, guard } = state.hub.subscribe(board_id);
    let connection_id = guard.connection_id();
    let mut lines = Box::pin(event_lines(BroadcastEvent::connected(board_id, connection_id), rx, guard));

    // Queued before the body is polled; still arrives after `connected`.
    state.hub.broadcast(board_id, BroadcastEvent::board_invalidated(board_id));

    let first = next_line(&mut lines).await;
    assert_eq!(first.body, EventBody::Connected { connection_id });
    let second = next_line(&mut lines).await;
    assert_eq!(second.body, EventBody::BoardUpdated { data: None });
}

#[tokio::test]
async fn dropping_body_unregisters_connection() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);

    let Subscription { rx, guard } = state.hub.subscribe(board_id);
    let lines = event_lines(BroadcastEvent::connected(board_id, guard.connection_id()), rx, guard);
    assert_eq!(state.hub.connection_count(board_id), 1);

    drop(lines);
    assert_eq!(state.hub.connection_count(board_id), 0);
}

#[tokio::test]
async fn stream_ends_when_hub_drops_connection() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);

    let Subscription { rx, guard } = state.hub.subscribe(board_id);
    let connection_id = guard.connection_id();
    let mut lines = Box::pin(event_lines(BroadcastEvent::connected(board_id, connection_id), rx, guard));
    next_line(&mut lines).await;

    state.hub.unregister(board_id, connection_id);
    let end = timeout(Duration::from_secs(1), lines.next()).await.expect("stream should end");
    assert!(end.is_none());
}

#[tokio::test]
async fn stream_rejects_missing_and_unknown_board() {
    let (state, _store) = test_app_state();

    let missing = stream(State(state.clone()), Query(BoardQuery::default())).await;
    assert_eq!(missing.err(), Some(StatusCode::BAD_REQUEST));

    let unknown = stream(State(state.clone()), Query(BoardQuery { board_id: Some(Uuid::new_v4()) })).await;
    assert_eq!(unknown.err(), Some(StatusCode::NOT_FOUND));
    assert_eq!(state.hub.stats().total_connections, 0);
}

#[tokio::test]
async fn stream_response_is_ndjson_and_registers() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);

    let response = stream(State(state.clone()), Query(BoardQuery { board_id: Some(board_id) }))
        .await
        .expect("stream opens");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()), Some(NDJSON));
    assert_eq!(state.hub.connection_count(board_id), 1);

    drop(response);
    assert_eq!(state.hub.connection_count(board_id), 0);
}

#[tokio::test]
async fn stream_opens_while_store_is_down() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    store.set_failing(true);

    let response = stream(State(state.clone()), Query(BoardQuery { board_id: Some(board_id) })).await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn debug_stats_reports_connections_and_caches() {
    let (state, store) = test_app_state();
    let board_id = seed_board(&store);
    let _sub = state.hub.subscribe(board_id);

    let Json(stats) = debug_stats(State(state)).await;
    assert_eq!(stats.connections.total_connections, 1);
    assert_eq!(stats.caches.len(), 4);
}
