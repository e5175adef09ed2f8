//! Board reads and edits.
//!
//! Reads go through the board cache. An edit persists, drops the cached
//! copy, and pushes the new board to every display as a STATE event.

use std::sync::Arc;

use events::{Board, BroadcastEvent};
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use super::store::{BoardUpdate, StoreError};
use crate::cache::board_key;
use crate::state::AppState;

/// Fetch a board through the cache.
///
/// # Errors
///
/// Returns [`StoreError::BoardNotFound`] for unknown ids, or the store's
/// failure.
pub async fn get_board(state: &AppState, board_id: Uuid) -> Result<Board, StoreError> {
    let store = Arc::clone(&state.store);
    state
        .caches
        .boards
        .with_cache(&board_key(board_id), None, || async move { store.board(board_id).await })
        .await
}

/// Apply a partial edit and broadcast the result.
///
/// # Errors
///
/// Returns [`ServiceError::Invalid`] for a blank name, or the store's failure.
pub async fn update_board(state: &AppState, board_id: Uuid, update: BoardUpdate) -> Result<Board, ServiceError> {
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ServiceError::Invalid("board name must not be blank".into()));
    }

    let board = state.store.update_board(board_id, update).await?;
    state.caches.boards.invalidate(&board_key(board_id));
    let notified = state.hub.broadcast(board_id, BroadcastEvent::board_state(board.clone()));
    info!(%board_id, notified, "board updated");
    Ok(board)
}

/// Announce a board change made outside this server. Displays re-fetch.
pub fn notify_board_changed(state: &AppState, board_id: Uuid) -> usize {
    state.caches.boards.invalidate(&board_key(board_id));
    let notified = state.hub.broadcast(board_id, BroadcastEvent::board_invalidated(board_id));
    info!(%board_id, notified, "board change announced");
    notified
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
