use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use events::{AdvertisementSettings, ChangeType, encode_line};
use futures_util::stream;
use tokio::time::{Instant, timeout};

use super::*;

// =============================================================================
// FAKE TRANSPORT
// =============================================================================

enum Script {
    Fail,
    /// Deliver these chunks, then either stay open or close.
    Open { chunks: Vec<Vec<u8>>, hold: bool },
}

#[derive(Default)]
struct FakeInner {
    script: Mutex<VecDeque<Script>>,
    opens: Mutex<Vec<Instant>>,
}

#[derive(Clone, Default)]
struct FakeTransport(Arc<FakeInner>);

impl FakeTransport {
    fn push(&self, script: Script) {
        self.0.script.lock().expect("script lock").push_back(script);
    }

    fn opens(&self) -> Vec<Instant> {
        self.0.opens.lock().expect("opens lock").clone()
    }
}

#[async_trait]
impl StreamTransport for FakeTransport {
    async fn open(&self, _board_id: Uuid) -> Result<ChunkStream, TransportError> {
        self.0.opens.lock().expect("opens lock").push(Instant::now());
        let next = self.0.script.lock().expect("script lock").pop_front();
        match next.unwrap_or(Script::Fail) {
            Script::Fail => Err(TransportError::Status(503)),
            Script::Open { chunks, hold } => {
                let items = stream::iter(chunks.into_iter().map(Ok));
                if hold { Ok(items.chain(stream::pending()).boxed()) } else { Ok(items.boxed()) }
            }
        }
    }
}

fn line(event: &BroadcastEvent) -> Vec<u8> {
    encode_line(event).into_bytes()
}

fn hello(board_id: Uuid) -> Vec<u8> {
    line(&BroadcastEvent::connected(board_id, Uuid::new_v4()))
}

async fn wait_for_state(handle: &SubscriberHandle, want: SubscriberState) {
    let mut status = handle.status();
    let reached = timeout(Duration::from_secs(600), status.wait_for(|s| *s == want)).await.is_ok_and(|r| r.is_ok());
    assert!(reached, "never reached {want:?}");
}

// =============================================================================
// POLICY
// =============================================================================

#[test]
fn reconnect_delays_double_then_stop() {
    let policy = ReconnectPolicy::default();
    let delays: Vec<Option<Duration>> = (1..=6).map(|n| policy.delay(n)).collect();
    assert_eq!(
        delays,
        vec![
            Some(Duration::from_secs(1)),
            Some(Duration::from_secs(2)),
            Some(Duration::from_secs(4)),
            Some(Duration::from_secs(8)),
            Some(Duration::from_secs(16)),
            None,
        ]
    );
    assert_eq!(policy.delay(0), None);
}

#[test]
fn idle_timeout_is_three_ping_intervals() {
    let config = SubscriberConfig::new(Uuid::new_v4());
    assert_eq!(config.idle_timeout(), Duration::from_secs(90));
}

// =============================================================================
// ROUTING
// =============================================================================

#[test]
fn state_events_carry_payload_and_invalidate_events_refetch() {
    let board_id = Uuid::new_v4();
    let settings = AdvertisementSettings::defaults_for(board_id);

    assert_eq!(
        route_event(board_id, BroadcastEvent::settings_state(settings.clone())),
        Some(StreamUpdate::Settings(settings))
    );
    assert_eq!(
        route_event(board_id, BroadcastEvent::board_invalidated(board_id)),
        Some(StreamUpdate::Refetch(Refetch::Board))
    );
    assert_eq!(
        route_event(
            board_id,
            BroadcastEvent::advertisements_invalidated(board_id, None, ChangeType::AdvertisementDeleted)
        ),
        Some(StreamUpdate::Refetch(Refetch::Advertisements))
    );
    assert_eq!(route_event(board_id, BroadcastEvent::ping(board_id)), None);
    assert_eq!(route_event(board_id, BroadcastEvent::connected(board_id, Uuid::new_v4())), None);
}

#[test]
fn malformed_line_triggers_full_refetch() {
    let board_id = Uuid::new_v4();
    assert_eq!(route_line(board_id, r#"{"type":"mystery"}"#), Some(StreamUpdate::Refetch(Refetch::All)));
    assert_eq!(route_line(board_id, "not json"), Some(StreamUpdate::Refetch(Refetch::All)));
}

#[test]
fn queued_refetch_scopes_merge() {
    assert_eq!(Refetch::Board.union(Refetch::Board), Refetch::Board);
    assert_eq!(Refetch::Advertisements.union(Refetch::Advertisements), Refetch::Advertisements);
    assert_eq!(Refetch::Board.union(Refetch::Advertisements), Refetch::All);
    assert_eq!(Refetch::All.union(Refetch::Board), Refetch::All);
}

#[test]
fn event_for_another_board_is_dropped() {
    let board_id = Uuid::new_v4();
    let other = BroadcastEvent::board_invalidated(Uuid::new_v4());
    assert_eq!(route_event(board_id, other), None);
}

// =============================================================================
// TASK
// =============================================================================

#[tokio::test(start_paused = true)]
async fn gives_up_after_five_backed_off_attempts() {
    let transport = FakeTransport::default();
    let (tx, _rx) = mpsc::channel(8);
    let handle = spawn_subscriber(transport.clone(), SubscriberConfig::new(Uuid::new_v4()), tx);

    wait_for_state(&handle, SubscriberState::Disconnected).await;
    let opens = transport.opens();
    let gaps: Vec<u64> = opens.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![1, 2, 4, 8, 16]);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.opens().len(), 6);
    assert_eq!(handle.state(), SubscriberState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn resume_reconnects_after_giving_up() {
    let board_id = Uuid::new_v4();
    let transport = FakeTransport::default();
    let (tx, _rx) = mpsc::channel(8);
    let handle = spawn_subscriber(transport.clone(), SubscriberConfig::new(board_id), tx);
    wait_for_state(&handle, SubscriberState::Disconnected).await;

    transport.push(Script::Open { chunks: vec![hello(board_id)], hold: true });
    handle.resume();
    wait_for_state(&handle, SubscriberState::Connected).await;
    assert_eq!(transport.opens().len(), 7);
}

#[tokio::test(start_paused = true)]
async fn routes_lines_split_across_chunks() {
    let board_id = Uuid::new_v4();
    let settings = AdvertisementSettings::defaults_for(board_id);
    let mut body = hello(board_id);
    body.extend(line(&BroadcastEvent::ping(board_id)));
    body.extend(line(&BroadcastEvent::settings_state(settings.clone())));
    body.extend(b"garbage\n");
    body.extend(line(&BroadcastEvent::advertisements_invalidated(board_id, None, ChangeType::ContentUpdate)));
    let (first, second) = body.split_at(body.len() / 2);

    let transport = FakeTransport::default();
    transport.push(Script::Open { chunks: vec![first.to_vec(), second.to_vec()], hold: true });
    let (tx, mut rx) = mpsc::channel(8);
    let _handle = spawn_subscriber(transport, SubscriberConfig::new(board_id), tx);

    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(timeout(Duration::from_secs(5), rx.recv()).await.expect("update in time").expect("update"));
    }
    assert_eq!(
        got,
        vec![
            StreamUpdate::Settings(settings),
            StreamUpdate::Refetch(Refetch::All),
            StreamUpdate::Refetch(Refetch::Advertisements),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn silent_stream_is_dropped_after_idle_timeout() {
    let board_id = Uuid::new_v4();
    let transport = FakeTransport::default();
    transport.push(Script::Open { chunks: vec![hello(board_id)], hold: true });
    transport.push(Script::Open { chunks: vec![hello(board_id)], hold: true });
    let (tx, mut rx) = mpsc::channel(8);
    let _handle = spawn_subscriber(transport.clone(), SubscriberConfig::new(board_id), tx);

    let update = timeout(Duration::from_secs(600), rx.recv()).await.expect("reconnected in time");
    assert_eq!(update, Some(StreamUpdate::Refetch(Refetch::All)));
    let opens = transport.opens();
    assert_eq!(opens.len(), 2);
    assert_eq!((opens[1] - opens[0]).as_secs(), 91);
}

#[tokio::test(start_paused = true)]
async fn server_close_reconnects_and_resets_attempts() {
    let board_id = Uuid::new_v4();
    let transport = FakeTransport::default();
    transport.push(Script::Fail);
    transport.push(Script::Open { chunks: vec![hello(board_id)], hold: false });
    transport.push(Script::Open { chunks: vec![hello(board_id)], hold: true });
    let (tx, mut rx) = mpsc::channel(8);
    let handle = spawn_subscriber(transport.clone(), SubscriberConfig::new(board_id), tx);

    let update = timeout(Duration::from_secs(600), rx.recv()).await.expect("reconnected in time");
    assert_eq!(update, Some(StreamUpdate::Refetch(Refetch::All)));
    assert_eq!(handle.state(), SubscriberState::Connected);

    // Fail, connect, close, then a first-attempt delay again.
    let gaps: Vec<u64> = transport.opens().windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![1, 1]);
}
