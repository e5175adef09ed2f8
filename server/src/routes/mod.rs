//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the board event stream, the admin REST API, the public playlist,
//! and the store webhooks under a single Axum router.

pub mod advertisements;
pub mod boards;
pub mod stream;
pub mod webhooks;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use uuid::Uuid;

use crate::services::ServiceError;
use crate::services::store::StoreError;
use crate::state::AppState;

/// `?boardId=` query shared by the board-scoped endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    #[serde(rename = "boardId")]
    pub board_id: Option<Uuid>,
}

impl BoardQuery {
    /// # Errors
    ///
    /// Returns `400` when `boardId` is missing.
    pub fn require(&self) -> Result<Uuid, StatusCode> {
        self.board_id.ok_or(StatusCode::BAD_REQUEST)
    }
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/stream", get(stream::stream))
        .route("/api/stream/debug", get(stream::debug_stats))
        .route("/api/boards/{id}", get(boards::get_board).patch(boards::update_board))
        .route(
            "/api/advertisements",
            get(advertisements::list)
                .post(advertisements::create)
                .put(advertisements::replace)
                .delete(advertisements::delete),
        )
        .route("/api/advertisements/public", get(advertisements::public))
        .route(
            "/api/advertisements/settings",
            get(advertisements::get_settings).post(advertisements::update_settings),
        )
        .route(
            "/api/advertisements/analytics",
            get(advertisements::analytics).post(advertisements::record_view),
        )
        .route("/api/webhooks/boards", post(webhooks::boards))
        .route("/api/webhooks/advertisements", post(webhooks::advertisements))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub(crate) fn store_error_to_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::BoardNotFound(_) | StoreError::AdvertisementNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Malformed(reason) => {
            error!(%reason, "malformed row in store");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        StoreError::Database(e) => {
            warn!(error = %e, "store unavailable");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub(crate) fn service_error_to_status(err: ServiceError) -> StatusCode {
    match err {
        ServiceError::Store(e) => store_error_to_status(e),
        ServiceError::Settings(_) | ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
