//! Per-board connection bookkeeping.
//!
//! DESIGN
//! ======
//! `boards: RwLock<HashMap<board_id, Arc<Mutex<BoardConnections>>>>`. The
//! outer lock is held only long enough to find or create a board's entry;
//! all work on a board's connection set happens under that board's own
//! mutex, so a slow or poisoned board never blocks another.
//!
//! Lock order is always outer then inner. Nothing acquires the outer lock
//! while holding an inner one.
//!
//! An entry whose set drops to empty is removed from the map and marked
//! `retired` under both locks. A register that raced with the removal sees
//! the flag and retries against a fresh entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use events::BroadcastEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending half of one subscriber's outbound queue.
pub type EventSender = mpsc::Sender<Arc<BroadcastEvent>>;

/// One open stream.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub board_id: Uuid,
    pub tx: EventSender,
    pub created_at: Instant,
    pub last_ping_at: Option<Instant>,
    /// Consecutive heartbeat pings that could not be queued.
    pub missed_pings: u32,
}

/// Live connections for one board.
#[derive(Debug, Default)]
pub struct BoardConnections {
    connections: HashMap<Uuid, Connection>,
    retired: bool,
}

impl BoardConnections {
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    pub fn remove(&mut self, connection_id: Uuid) -> Option<Connection> {
        self.connections.remove(&connection_id)
    }
}

type BoardEntry = Arc<Mutex<BoardConnections>>;

fn lock_board(entry: &BoardEntry) -> MutexGuard<'_, BoardConnections> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    boards: RwLock<HashMap<Uuid, BoardEntry>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for `board_id` and return its fresh id.
    pub fn register(&self, board_id: Uuid, tx: EventSender) -> Uuid {
        self.register_at(board_id, tx, Instant::now())
    }

    pub fn register_at(&self, board_id: Uuid, tx: EventSender, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        loop {
            let entry = self.entry_or_insert(board_id);
            let mut conns = lock_board(&entry);
            if conns.retired {
                continue;
            }
            conns.connections.insert(
                id,
                Connection { id, board_id, tx: tx.clone(), created_at: now, last_ping_at: None, missed_pings: 0 },
            );
            return id;
        }
    }

    /// Remove a connection. Idempotent: returns `false` if it was already
    /// gone.
    pub fn unregister(&self, board_id: Uuid, connection_id: Uuid) -> bool {
        let Some(entry) = self.entry(board_id) else {
            return false;
        };
        let (removed, now_empty) = {
            let mut conns = lock_board(&entry);
            let removed = conns.remove(connection_id).is_some();
            (removed, conns.is_empty())
        };
        if now_empty {
            self.prune(board_id, &entry);
        }
        removed
    }

    /// Run `f` on `board_id`'s connection set under that board's lock.
    /// Returns `None` when the board has no connections. Empties the entry
    /// from the map afterwards if `f` removed the last connection.
    pub fn with_board<R>(&self, board_id: Uuid, f: impl FnOnce(&mut BoardConnections) -> R) -> Option<R> {
        let entry = self.entry(board_id)?;
        let (result, now_empty) = {
            let mut conns = lock_board(&entry);
            if conns.retired {
                return None;
            }
            let result = f(&mut conns);
            (result, conns.is_empty())
        };
        if now_empty {
            self.prune(board_id, &entry);
        }
        Some(result)
    }

    /// Snapshot of board ids that currently have an entry.
    #[must_use]
    pub fn board_ids(&self) -> Vec<Uuid> {
        self.boards.read().unwrap_or_else(PoisonError::into_inner).keys().copied().collect()
    }

    #[must_use]
    pub fn connection_count(&self, board_id: Uuid) -> usize {
        self.entry(board_id).map_or(0, |entry| lock_board(&entry).len())
    }

    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.board_ids().into_iter().map(|board_id| self.connection_count(board_id)).sum()
    }

    fn entry(&self, board_id: Uuid) -> Option<BoardEntry> {
        self.boards.read().unwrap_or_else(PoisonError::into_inner).get(&board_id).cloned()
    }

    fn entry_or_insert(&self, board_id: Uuid) -> BoardEntry {
        if let Some(entry) = self.entry(board_id) {
            return entry;
        }
        let mut boards = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(boards.entry(board_id).or_default())
    }

    fn prune(&self, board_id: Uuid, entry: &BoardEntry) {
        let mut boards = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = boards.get(&board_id) else {
            return;
        };
        if !Arc::ptr_eq(current, entry) {
            return;
        }
        let mut conns = lock_board(entry);
        if conns.is_empty() {
            conns.retired = true;
            drop(conns);
            boards.remove(&board_id);
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
