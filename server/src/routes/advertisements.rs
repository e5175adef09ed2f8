//! Advertisement admin, public playlist, settings, and analytics routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use events::{Advertisement, AdvertisementSettings, now_ms};
use serde::Deserialize;
use uuid::Uuid;

use super::{BoardQuery, service_error_to_status, store_error_to_status};
use crate::services::advertisement::{self, AdvertisementReplace, NewAdvertisement};
use crate::services::settings::{self, SettingsInput};
use crate::services::store::AdvertisementViews;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewBody {
    pub advertisement_id: Uuid,
}

// =============================================================================
// ADMIN
// =============================================================================

/// `GET /api/advertisements?boardId=` — every ad for a board.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<Advertisement>>, StatusCode> {
    let board_id = query.require()?;
    let ads = advertisement::list_advertisements(&state, board_id)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(ads))
}

/// `POST /api/advertisements` — create an ad.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NewAdvertisement>,
) -> Result<(StatusCode, Json<Advertisement>), StatusCode> {
    let ad = advertisement::create_advertisement(&state, body)
        .await
        .map_err(service_error_to_status)?;
    Ok((StatusCode::CREATED, Json(ad)))
}

/// `PUT /api/advertisements` — replace an ad's mutable fields.
pub async fn replace(
    State(state): State<AppState>,
    Json(body): Json<AdvertisementReplace>,
) -> Result<Json<Advertisement>, StatusCode> {
    let ad = advertisement::replace_advertisement(&state, body)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(ad))
}

/// `DELETE /api/advertisements?id=` — delete an ad.
pub async fn delete(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let id = query.id.ok_or(StatusCode::BAD_REQUEST)?;
    let deleted = advertisement::delete_advertisement(&state, id)
        .await
        .map_err(service_error_to_status)?;
    Ok(Json(serde_json::json!({ "success": true, "id": deleted.id, "boardId": deleted.board_id })))
}

// =============================================================================
// PUBLIC PLAYLIST
// =============================================================================

/// `GET /api/advertisements/public?boardId=` — ads eligible to play now.
pub async fn public(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<Advertisement>>, StatusCode> {
    let board_id = query.require()?;
    let ads = advertisement::public_playlist(&state, board_id, now_ms())
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(ads))
}

// =============================================================================
// SETTINGS
// =============================================================================

/// `GET /api/advertisements/settings?boardId=`
pub async fn get_settings(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<AdvertisementSettings>, StatusCode> {
    let board_id = query.require()?;
    let settings = settings::get_settings(&state, board_id).await.map_err(store_error_to_status)?;
    Ok(Json(settings))
}

/// `POST /api/advertisements/settings` — save a new snapshot.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<SettingsInput>,
) -> Result<Json<AdvertisementSettings>, StatusCode> {
    let saved = settings::update_settings(&state, body).await.map_err(service_error_to_status)?;
    Ok(Json(saved))
}

// =============================================================================
// ANALYTICS
// =============================================================================

/// `POST /api/advertisements/analytics` — count one showing.
pub async fn record_view(State(state): State<AppState>, Json(body): Json<ViewBody>) -> Result<StatusCode, StatusCode> {
    advertisement::record_view(&state, body.advertisement_id)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/advertisements/analytics?boardId=` — view totals.
pub async fn analytics(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<AdvertisementViews>>, StatusCode> {
    let board_id = query.require()?;
    let views = advertisement::view_counts(&state, board_id).await.map_err(store_error_to_status)?;
    Ok(Json(views))
}

#[cfg(test)]
#[path = "advertisements_test.rs"]
mod tests;
