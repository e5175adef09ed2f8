//! Shared event model and newline-delimited JSON codec for the board stream.
//!
//! This crate owns the wire representation used by both `server` and
//! `display`. Every line on the stream is one [`BroadcastEvent`] encoded as a
//! JSON object `{type, boardId, timestamp, ...payload}` followed by `\n`.
//!
//! DESIGN
//! ======
//! Events come in two flavors (see [`Delivery`]): STATE events embed the full
//! replacement payload so the display can apply them without a round trip;
//! INVALIDATE events only name what changed and force a re-fetch. Both are
//! kept on purpose. Control events (`connected`, `ping`) carry no business
//! data.

mod model;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use model::*;

// =============================================================================
// EVENT TYPES
// =============================================================================

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_PING: &str = "ping";
pub const EVENT_BOARD_UPDATED: &str = "board_updated";
pub const EVENT_ADVERTISEMENTS_UPDATED: &str = "advertisements_updated";
pub const EVENT_SETTINGS_UPDATED: &str = "advertisement_settings_updated";

/// Error returned by [`decode_line`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The line is not a well-formed event object.
    #[error("failed to decode event: {0}")]
    Json(#[from] serde_json::Error),
    /// The line was blank after trimming.
    #[error("empty event line")]
    Empty,
    /// The raw bytes were not valid UTF-8.
    #[error("event line is not valid utf-8")]
    Utf8,
}

/// How a subscriber should treat an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Transport bookkeeping, no business payload.
    Control,
    /// Full replacement payload, apply directly.
    State,
    /// Identity only, re-fetch through the read path.
    Invalidate,
}

/// What kind of write produced an `advertisements_updated` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    AdvertisementCreated,
    ContentUpdate,
    ActiveStatusChange,
    AdvertisementDeleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Normal,
}

impl ChangeType {
    /// Content-only edits are normal priority; anything that changes which
    /// ads are eligible to play is high.
    #[must_use]
    pub fn priority(self) -> Priority {
        match self {
            Self::ContentUpdate => Priority::Normal,
            _ => Priority::High,
        }
    }
}

/// Type-tagged payload of a [`BroadcastEvent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventBody {
    /// First line on every stream.
    Connected { connection_id: Uuid },
    /// Keepalive. Resets the subscriber's idle watchdog.
    Ping,
    /// Board metadata changed. STATE when `data` is present, INVALIDATE otherwise.
    BoardUpdated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Board>,
    },
    /// Playlist membership or content changed. Always INVALIDATE.
    AdvertisementsUpdated {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        advertisement_id: Option<Uuid>,
        change_type: ChangeType,
        priority: Priority,
    },
    /// New settings snapshot. Always STATE.
    #[serde(rename = "advertisement_settings_updated")]
    SettingsUpdated { data: AdvertisementSettings },
}

/// One event on a board stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastEvent {
    pub board_id: Uuid,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub timestamp: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl BroadcastEvent {
    #[must_use]
    pub fn new(board_id: Uuid, body: EventBody) -> Self {
        Self { board_id, timestamp: now_ms(), body }
    }

    #[must_use]
    pub fn connected(board_id: Uuid, connection_id: Uuid) -> Self {
        Self::new(board_id, EventBody::Connected { connection_id })
    }

    #[must_use]
    pub fn ping(board_id: Uuid) -> Self {
        Self::new(board_id, EventBody::Ping)
    }

    /// STATE event carrying the full board.
    #[must_use]
    pub fn board_state(board: Board) -> Self {
        Self::new(board.id, EventBody::BoardUpdated { data: Some(board) })
    }

    /// INVALIDATE event asking displays to re-fetch the board.
    #[must_use]
    pub fn board_invalidated(board_id: Uuid) -> Self {
        Self::new(board_id, EventBody::BoardUpdated { data: None })
    }

    #[must_use]
    pub fn advertisements_invalidated(board_id: Uuid, advertisement_id: Option<Uuid>, change_type: ChangeType) -> Self {
        Self::new(
            board_id,
            EventBody::AdvertisementsUpdated { advertisement_id, change_type, priority: change_type.priority() },
        )
    }

    #[must_use]
    pub fn settings_state(settings: AdvertisementSettings) -> Self {
        Self::new(settings.board_id, EventBody::SettingsUpdated { data: settings })
    }

    /// Wire name of the event type.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.body {
            EventBody::Connected { .. } => EVENT_CONNECTED,
            EventBody::Ping => EVENT_PING,
            EventBody::BoardUpdated { .. } => EVENT_BOARD_UPDATED,
            EventBody::AdvertisementsUpdated { .. } => EVENT_ADVERTISEMENTS_UPDATED,
            EventBody::SettingsUpdated { .. } => EVENT_SETTINGS_UPDATED,
        }
    }

    #[must_use]
    pub fn delivery(&self) -> Delivery {
        match &self.body {
            EventBody::Connected { .. } | EventBody::Ping => Delivery::Control,
            EventBody::BoardUpdated { data: Some(_) } | EventBody::SettingsUpdated { .. } => Delivery::State,
            EventBody::BoardUpdated { data: None } | EventBody::AdvertisementsUpdated { .. } => {
                Delivery::Invalidate
            }
        }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode an event as one NDJSON line, trailing newline included.
#[must_use]
pub fn encode_line(event: &BroadcastEvent) -> String {
    // Serializing this type cannot fail: every field is a plain value or a
    // string-keyed map.
    let mut line = serde_json::to_string(event).unwrap_or_default();
    line.push('\n');
    line
}

/// Decode one NDJSON line. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`CodecError::Empty`] for blank lines and [`CodecError::Json`] for
/// anything that is not a known event.
pub fn decode_line(line: &str) -> Result<BroadcastEvent, CodecError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}

/// Reassembles NDJSON lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// newline. Blank lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Utf8`] if a completed line is not UTF-8. The
    /// offending line is discarded; later lines are unaffected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, CodecError>> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let raw = &raw[..raw.len() - 1];
            match std::str::from_utf8(raw) {
                Ok(text) if text.trim().is_empty() => {}
                Ok(text) => lines.push(Ok(text.trim_end_matches('\r').to_owned())),
                Err(_) => lines.push(Err(CodecError::Utf8)),
            }
        }
        lines
    }

    /// Bytes received after the last newline.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
