//! Board read and edit routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use events::Board;
use serde::Deserialize;
use uuid::Uuid;

use super::{service_error_to_status, store_error_to_status};
use crate::services::board;
use crate::services::store::BoardUpdate;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBoardBody {
    pub name: Option<String>,
    pub configuration: Option<serde_json::Value>,
}

impl From<UpdateBoardBody> for BoardUpdate {
    fn from(body: UpdateBoardBody) -> Self {
        Self { name: body.name.map(|name| name.trim().to_owned()), configuration: body.configuration }
    }
}

/// `GET /api/boards/{id}` — fetch a board.
pub async fn get_board(State(state): State<AppState>, Path(board_id): Path<Uuid>) -> Result<Json<Board>, StatusCode> {
    let board = board::get_board(&state, board_id).await.map_err(store_error_to_status)?;
    Ok(Json(board))
}

/// `PATCH /api/boards/{id}` — rename or reconfigure a board.
pub async fn update_board(
    State(state): State<AppState>,
    Path(board_id): Path<Uuid>,
    Json(body): Json<UpdateBoardBody>,
) -> Result<Json<Board>, StatusCode> {
    let board = board::update_board(&state, board_id, body.into())
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(board))
}

#[cfg(test)]
#[path = "boards_test.rs"]
mod tests;
