//! Board event stream endpoint.
//!
//! DESIGN
//! ======
//! `GET /api/stream?boardId=` answers with a long-lived
//! `application/x-ndjson` body. The first line is always `connected`; after
//! that each line is whatever the hub queued for this connection, pings
//! included. The body owns the connection guard, so when the client goes
//! away and Axum drops the body, the connection is unregistered.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderName};
use axum::response::{IntoResponse, Response};
use events::{BroadcastEvent, encode_line, now_ms};
use futures::Stream;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use super::BoardQuery;
use crate::cache::CacheStats;
use crate::hub::{ConnectionGuard, HubStats, Subscription};
use crate::services::board;
use crate::services::store::StoreError;
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

/// `GET /api/stream?boardId=` — open a board event stream.
pub async fn stream(State(state): State<AppState>, Query(query): Query<BoardQuery>) -> Result<Response, StatusCode> {
    let board_id = query.require()?;

    match board::get_board(&state, board_id).await {
        Ok(_) => {}
        Err(StoreError::BoardNotFound(_)) => return Err(StatusCode::NOT_FOUND),
        // The stream does not depend on the store; let displays connect and
        // pull once it recovers.
        Err(e) => warn!(%board_id, error = %e, "board lookup failed; opening stream anyway"),
    }

    let Subscription { rx, guard } = state.hub.subscribe(board_id);
    let hello = BroadcastEvent::connected(board_id, guard.connection_id());
    let body = Body::from_stream(event_lines(hello, rx, guard));

    Ok((
        [
            (CONTENT_TYPE, NDJSON),
            (CACHE_CONTROL, "no-cache, no-transform"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response())
}

/// NDJSON lines for one connection: `hello`, then everything queued on `rx`.
/// Ends when the hub drops the connection's sender.
pub(crate) fn event_lines(
    hello: BroadcastEvent,
    rx: mpsc::Receiver<Arc<BroadcastEvent>>,
    guard: ConnectionGuard,
) -> impl Stream<Item = Result<String, Infallible>> + Send + 'static {
    let first = futures::stream::once(async move { Ok(encode_line(&hello)) });
    let rest = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        Some((Ok(encode_line(&event)), (rx, guard)))
    });
    first.chain(rest)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugStats {
    pub connections: HubStats,
    pub caches: Vec<CacheStats>,
    pub timestamp: i64,
}

/// `GET /api/stream/debug` — connection and cache counters.
pub async fn debug_stats(State(state): State<AppState>) -> Json<DebugStats> {
    Json(DebugStats { connections: state.hub.stats(), caches: state.caches.stats(), timestamp: now_ms() })
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
