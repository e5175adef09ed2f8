//! Broadcast hub: fans board events out to every open stream on that board.
//!
//! DESIGN
//! ======
//! Each stream owns a bounded `mpsc` queue. Broadcasts use `try_send`, so a
//! write path never waits on a slow display. A handle whose queue is full or
//! closed during a broadcast is removed on the spot; dropping its sender
//! ends the HTTP body and the display reconnects and re-fetches.
//!
//! Heartbeats are one hub-wide sweep per ping interval. A closed queue is
//! removed immediately. A full queue counts as a missed ping and the
//! connection is dropped after `max_missed_pings` in a row.
//!
//! Delivery is at-most-once. There is no replay buffer; a display that was
//! offline catches up by pulling current state after reconnecting.

pub mod registry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use events::BroadcastEvent;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use registry::{ConnectionRegistry, EventSender};

/// Stream transport tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubConfig {
    pub ping_interval: Duration,
    pub max_missed_pings: u32,
    pub channel_capacity: usize,
}

/// Outcome of one heartbeat sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub pinged: usize,
    pub missed: usize,
    pub removed: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    pub board_id: Uuid,
    pub connections: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub total_connections: usize,
    pub boards: Vec<BoardStats>,
}

// =============================================================================
// HUB
// =============================================================================

#[derive(Clone)]
pub struct BroadcastHub {
    registry: Arc<ConnectionRegistry>,
    config: HubConfig,
}

impl BroadcastHub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self { registry: Arc::new(ConnectionRegistry::new()), config }
    }

    #[must_use]
    pub fn config(&self) -> HubConfig {
        self.config
    }

    /// Open a new stream for `board_id`: register a queue and hand back its
    /// receiving end plus a guard that unregisters on drop.
    #[must_use]
    pub fn subscribe(&self, board_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let connection_id = self.register(board_id, tx);
        Subscription {
            rx,
            guard: ConnectionGuard { registry: Arc::clone(&self.registry), board_id, connection_id },
        }
    }

    pub fn register(&self, board_id: Uuid, tx: EventSender) -> Uuid {
        let connection_id = self.registry.register(board_id, tx);
        info!(%board_id, %connection_id, "stream registered");
        connection_id
    }

    pub fn unregister(&self, board_id: Uuid, connection_id: Uuid) -> bool {
        let removed = self.registry.unregister(board_id, connection_id);
        if removed {
            info!(%board_id, %connection_id, "stream unregistered");
        }
        removed
    }

    /// Queue `event` on every live stream of `board_id` and return how many
    /// accepted it. Handles that fail are removed. Never errors.
    pub fn broadcast(&self, board_id: Uuid, event: BroadcastEvent) -> usize {
        if event.board_id != board_id {
            warn!(%board_id, event_board_id = %event.board_id, kind = event.kind(), "refusing cross-board broadcast");
            return 0;
        }
        let kind = event.kind();
        let event = Arc::new(event);
        let sent = self
            .registry
            .with_board(board_id, |conns| {
                let mut sent = 0;
                let mut failed = Vec::new();
                for conn in conns.iter() {
                    match conn.tx.try_send(Arc::clone(&event)) {
                        Ok(()) => sent += 1,
                        Err(e) => failed.push((conn.id, matches!(e, TrySendError::Full(_)))),
                    }
                }
                for (connection_id, full) in failed {
                    conns.remove(connection_id);
                    warn!(%board_id, %connection_id, full, kind, "dropping stream after failed delivery");
                }
                sent
            })
            .unwrap_or(0);
        debug!(%board_id, kind, sent, "broadcast");
        sent
    }

    pub fn heartbeat(&self) -> HeartbeatReport {
        self.heartbeat_at(Instant::now())
    }

    /// Ping every stream on every board once, as of `now`.
    pub fn heartbeat_at(&self, now: Instant) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        let max_missed = self.config.max_missed_pings;
        for board_id in self.registry.board_ids() {
            let ping = Arc::new(BroadcastEvent::ping(board_id));
            self.registry.with_board(board_id, |conns| {
                let mut dead = Vec::new();
                for conn in conns.iter_mut() {
                    match conn.tx.try_send(Arc::clone(&ping)) {
                        Ok(()) => {
                            conn.missed_pings = 0;
                            conn.last_ping_at = Some(now);
                            report.pinged += 1;
                        }
                        Err(TrySendError::Full(_)) => {
                            conn.missed_pings += 1;
                            report.missed += 1;
                            if conn.missed_pings >= max_missed {
                                dead.push(conn.id);
                            }
                        }
                        Err(TrySendError::Closed(_)) => dead.push(conn.id),
                    }
                }
                for connection_id in dead {
                    conns.remove(connection_id);
                    report.removed += 1;
                    warn!(%board_id, %connection_id, "dropping stream after failed heartbeat");
                }
            });
        }
        report
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        let mut boards: Vec<BoardStats> = self
            .registry
            .board_ids()
            .into_iter()
            .map(|board_id| BoardStats { board_id, connections: self.registry.connection_count(board_id) })
            .filter(|stats| stats.connections > 0)
            .collect();
        boards.sort_by_key(|stats| stats.board_id);
        HubStats { total_connections: boards.iter().map(|b| b.connections).sum(), boards }
    }

    #[must_use]
    pub fn connection_count(&self, board_id: Uuid) -> usize {
        self.registry.connection_count(board_id)
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Receiving half of a registered stream.
pub struct Subscription {
    pub rx: mpsc::Receiver<Arc<BroadcastEvent>>,
    pub guard: ConnectionGuard,
}

/// Unregisters its connection when dropped.
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    board_id: Uuid,
    connection_id: Uuid,
}

impl ConnectionGuard {
    #[must_use]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.registry.unregister(self.board_id, self.connection_id) {
            info!(board_id = %self.board_id, connection_id = %self.connection_id, "stream closed");
        }
    }
}

/// Spawn the heartbeat loop. Returns a handle for shutdown.
pub fn spawn_heartbeat_task(hub: BroadcastHub) -> JoinHandle<()> {
    let interval = hub.config.ping_interval;
    info!(interval_secs = interval.as_secs(), "stream heartbeat configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = hub.heartbeat();
            if report.removed > 0 || report.missed > 0 {
                info!(pinged = report.pinged, missed = report.missed, removed = report.removed, "heartbeat sweep");
            }
        }
    })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
