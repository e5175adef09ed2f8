//! Store change webhooks.
//!
//! DESIGN
//! ======
//! The database can notify the server of row changes made outside the
//! admin API (`{type, table, record, old_record}` with snake_case row
//! columns). Handlers only need the affected board id; they invalidate the
//! board's caches and broadcast INVALIDATE events so displays re-fetch
//! through the normal read path.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use events::ChangeType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::services::{advertisement, board};
use crate::state::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowChange {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Deserialize)]
pub struct StoreChange {
    #[serde(rename = "type")]
    pub kind: RowChange,
    pub table: String,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub old_record: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReply {
    pub success: bool,
    pub board_id: Uuid,
    pub clients_notified: usize,
}

impl StoreChange {
    /// Read a uuid column from the new row, falling back to the old one.
    fn uuid_field(&self, column: &str) -> Option<Uuid> {
        [self.record.as_ref(), self.old_record.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|row| row.get(column).and_then(Value::as_str).and_then(|raw| Uuid::parse_str(raw).ok()))
    }

    fn is_active_changed(&self) -> bool {
        let flag = |row: Option<&Value>| row.and_then(|r| r.get("is_active")).and_then(Value::as_bool);
        match (flag(self.record.as_ref()), flag(self.old_record.as_ref())) {
            (Some(new), Some(old)) => new != old,
            _ => false,
        }
    }

    /// Map a row change on `advertisements` to the event's change type.
    #[must_use]
    pub fn advertisement_change(&self) -> ChangeType {
        match self.kind {
            RowChange::Insert => ChangeType::AdvertisementCreated,
            RowChange::Delete => ChangeType::AdvertisementDeleted,
            RowChange::Update if self.is_active_changed() => ChangeType::ActiveStatusChange,
            RowChange::Update => ChangeType::ContentUpdate,
        }
    }
}

/// `POST /api/webhooks/boards` — a board row changed.
pub async fn boards(State(state): State<AppState>, Json(change): Json<StoreChange>) -> Result<Json<WebhookReply>, StatusCode> {
    if change.table != "boards" {
        warn!(table = %change.table, "board webhook for unexpected table");
        return Err(StatusCode::BAD_REQUEST);
    }
    let board_id = change.uuid_field("id").ok_or(StatusCode::BAD_REQUEST)?;
    let clients_notified = board::notify_board_changed(&state, board_id);
    Ok(Json(WebhookReply { success: true, board_id, clients_notified }))
}

/// `POST /api/webhooks/advertisements` — an advertisement row changed.
pub async fn advertisements(
    State(state): State<AppState>,
    Json(change): Json<StoreChange>,
) -> Result<Json<WebhookReply>, StatusCode> {
    if change.table != "advertisements" {
        warn!(table = %change.table, "advertisement webhook for unexpected table");
        return Err(StatusCode::BAD_REQUEST);
    }
    let board_id = change.uuid_field("board_id").ok_or(StatusCode::BAD_REQUEST)?;
    let clients_notified = advertisement::notify_advertisements_changed(
        &state,
        board_id,
        change.uuid_field("id"),
        change.advertisement_change(),
    );
    Ok(Json(WebhookReply { success: true, board_id, clients_notified }))
}

#[cfg(test)]
#[path = "webhooks_test.rs"]
mod tests;
