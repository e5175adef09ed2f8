//! Resilient board stream subscriber.
//!
//! DESIGN
//! ======
//! One task per display owns the stream connection and walks the state
//! machine `Disconnected → Connecting → Connected → (Error → Connecting |
//! Disconnected)`. The current state is published on a `watch` channel so the
//! runtime can show an offline indicator without polling.
//!
//! Reconnects back off as `base × 2^(n-1)` with no jitter. Once the attempt
//! budget is spent the task settles in `Disconnected` and waits for
//! [`SubscriberHandle::resume`]. A successful open resets the counter.
//!
//! The stream is NDJSON. Any traffic proves the connection alive; if nothing
//! (not even a `ping`) arrives for `max_missed_pings` ping intervals the
//! connection is treated as dead and the reconnect path runs.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures stay inside this module; the runtime only ever sees
//! [`StreamUpdate`]s and state changes. A malformed line is logged, dropped,
//! and answered with a defensive full refetch.

use std::time::Duration;

use async_trait::async_trait;
use events::{AdvertisementSettings, Board, BroadcastEvent, EventBody, LineBuffer, decode_line};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::ACCEPT;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::api::normalize_base_url;

// =============================================================================
// STATE AND POLICY
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Exponential reconnect schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base: Duration::from_secs(1), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// budget is spent.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1_u32.checked_shl(attempt - 1)?;
        self.base.checked_mul(factor)
    }
}

#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    pub board_id: Uuid,
    pub ping_interval: Duration,
    pub max_missed_pings: u32,
    pub reconnect: ReconnectPolicy,
}

impl SubscriberConfig {
    #[must_use]
    pub fn new(board_id: Uuid) -> Self {
        Self {
            board_id,
            ping_interval: Duration::from_secs(30),
            max_missed_pings: 3,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Silence longer than this ends the connection.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.ping_interval.saturating_mul(self.max_missed_pings.max(1))
    }
}

// =============================================================================
// UPDATES
// =============================================================================

/// What the runtime should re-read after an INVALIDATE event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refetch {
    Board,
    Advertisements,
    All,
}

impl Refetch {
    /// Smallest scope covering both.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        if self == other { self } else { Self::All }
    }
}

/// Business output of the subscriber.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamUpdate {
    Board(Board),
    Settings(AdvertisementSettings),
    Refetch(Refetch),
}

/// Map one stream line to the update it implies, if any.
#[must_use]
pub fn route_line(board_id: Uuid, line: &str) -> Option<StreamUpdate> {
    let event = match decode_line(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed stream event, refetching");
            return Some(StreamUpdate::Refetch(Refetch::All));
        }
    };
    route_event(board_id, event)
}

#[must_use]
pub fn route_event(board_id: Uuid, event: BroadcastEvent) -> Option<StreamUpdate> {
    if event.board_id != board_id {
        warn!(%board_id, event_board = %event.board_id, kind = event.kind(), "event for another board dropped");
        return None;
    }
    match event.body {
        EventBody::Connected { connection_id } => {
            debug!(%connection_id, "stream acknowledged");
            None
        }
        EventBody::Ping => {
            trace!("ping");
            None
        }
        EventBody::BoardUpdated { data: Some(board) } => Some(StreamUpdate::Board(board)),
        EventBody::BoardUpdated { data: None } => Some(StreamUpdate::Refetch(Refetch::Board)),
        EventBody::AdvertisementsUpdated { change_type, priority, .. } => {
            debug!(?change_type, ?priority, "advertisements changed");
            Some(StreamUpdate::Refetch(Refetch::Advertisements))
        }
        EventBody::SettingsUpdated { data } => Some(StreamUpdate::Settings(data)),
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream endpoint returned HTTP {0}")]
    Status(u16),
    #[error("stream closed by server")]
    Closed,
    #[error("no stream traffic for {0:?}")]
    IdleTimeout(Duration),
}

pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Opens the long-lived event stream for a board.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, board_id: Uuid) -> Result<ChunkStream, TransportError>;
}

/// `GET /api/stream?boardId=` over reqwest.
#[derive(Clone, Debug)]
pub struct HttpStreamTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStreamTransport {
    /// # Errors
    ///
    /// Returns [`crate::api::ApiError::InvalidBaseUrl`] unless `base_url` is http(s).
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, crate::api::ApiError> {
        Ok(Self { client, base_url: normalize_base_url(base_url)? })
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    async fn open(&self, board_id: Uuid) -> Result<ChunkStream, TransportError> {
        let url = format!("{}/api/stream?boardId={board_id}", self.base_url);
        let response = self.client.get(url).header(ACCEPT, "application/x-ndjson").send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
            .boxed())
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Control surface for a running subscriber. Dropping it stops the task.
#[derive(Debug)]
pub struct SubscriberHandle {
    status: watch::Receiver<SubscriberState>,
    resume: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        *self.status.borrow()
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<SubscriberState> {
        self.status.clone()
    }

    /// Restart a subscriber that gave up. The attempt counter starts over.
    /// No effect while it is still connecting or connected.
    pub fn resume(&self) {
        let _ = self.resume.try_send(());
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the subscriber task. Updates flow into `updates`; the task stops
/// when that receiver is dropped or the handle is dropped.
pub fn spawn_subscriber<T>(transport: T, config: SubscriberConfig, updates: mpsc::Sender<StreamUpdate>) -> SubscriberHandle
where
    T: StreamTransport + 'static,
{
    let (status_tx, status_rx) = watch::channel(SubscriberState::Connecting);
    let (resume_tx, resume_rx) = mpsc::channel(1);
    let task = tokio::spawn(run(transport, config, updates, status_tx, resume_rx));
    SubscriberHandle { status: status_rx, resume: resume_tx, task }
}

async fn run<T: StreamTransport>(
    transport: T,
    config: SubscriberConfig,
    updates: mpsc::Sender<StreamUpdate>,
    status: watch::Sender<SubscriberState>,
    mut resume: mpsc::Receiver<()>,
) {
    let board_id = config.board_id;
    let mut attempts: u32 = 0;
    let mut connected_before = false;

    loop {
        status.send_replace(SubscriberState::Connecting);
        match transport.open(board_id).await {
            Ok(stream) => {
                attempts = 0;
                status.send_replace(SubscriberState::Connected);
                info!(%board_id, "board stream connected");
                // Events published while we were away are lost; reload everything.
                if connected_before && updates.send(StreamUpdate::Refetch(Refetch::All)).await.is_err() {
                    return;
                }
                connected_before = true;
                match pump(board_id, stream, config.idle_timeout(), &updates).await {
                    Some(err) => warn!(%board_id, error = %err, "board stream lost"),
                    None => return,
                }
            }
            Err(err) => warn!(%board_id, error = %err, attempt = attempts, "board stream open failed"),
        }

        if updates.is_closed() {
            return;
        }
        status.send_replace(SubscriberState::Error);
        attempts += 1;
        if let Some(delay) = config.reconnect.delay(attempts) {
            debug!(%board_id, attempt = attempts, delay_ms = delay.as_millis(), "reconnecting");
            tokio::time::sleep(delay).await;
            continue;
        }

        warn!(%board_id, attempts = attempts - 1, "reconnect attempts exhausted, stream offline");
        status.send_replace(SubscriberState::Disconnected);
        while resume.try_recv().is_ok() {}
        if resume.recv().await.is_none() {
            return;
        }
        info!(%board_id, "resuming board stream");
        attempts = 0;
    }
}

/// Read the stream until it fails. Returns `None` when the update receiver
/// is gone and the task should stop.
async fn pump(
    board_id: Uuid,
    mut stream: ChunkStream,
    idle_timeout: Duration,
    updates: &mpsc::Sender<StreamUpdate>,
) -> Option<TransportError> {
    let mut buffer = LineBuffer::new();
    loop {
        let chunk = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Err(_) => return Some(TransportError::IdleTimeout(idle_timeout)),
            Ok(None) => return Some(TransportError::Closed),
            Ok(Some(Err(err))) => return Some(err),
            Ok(Some(Ok(chunk))) => chunk,
        };
        for line in buffer.push(&chunk) {
            let update = match line {
                Ok(line) => route_line(board_id, &line),
                Err(e) => {
                    warn!(error = %e, "undecodable stream line, refetching");
                    Some(StreamUpdate::Refetch(Refetch::All))
                }
            };
            if let Some(update) = update {
                if updates.send(update).await.is_err() {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "subscriber_test.rs"]
mod tests;
