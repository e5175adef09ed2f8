//! Advertisement settings per board.
//!
//! A board that never saved settings is served the defaults. Every save
//! builds a whole new snapshot (omitted fields take their defaults),
//! validates it, persists it, and broadcasts it as a STATE event.

use std::sync::Arc;

use events::{AdvertisementSettings, BroadcastEvent};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::ServiceError;
use super::board::get_board;
use super::store::StoreError;
use crate::cache::settings_key;
use crate::state::AppState;

/// Settings as submitted by the admin API.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    pub board_id: Uuid,
    pub time_between_ads: Option<u32>,
    pub initial_delay_seconds: Option<u32>,
    #[serde(rename = "adDisplayDurationOverride")]
    pub ad_display_duration_override_ms: Option<u64>,
    #[serde(rename = "enableAI")]
    pub enable_ai: Option<bool>,
    pub person_threshold: Option<u32>,
    pub detection_duration_seconds: Option<u32>,
}

impl SettingsInput {
    #[must_use]
    pub fn into_snapshot(self) -> AdvertisementSettings {
        let defaults = AdvertisementSettings::defaults_for(self.board_id);
        AdvertisementSettings {
            board_id: self.board_id,
            time_between_ads: self.time_between_ads.unwrap_or(defaults.time_between_ads),
            initial_delay_seconds: self.initial_delay_seconds.unwrap_or(defaults.initial_delay_seconds),
            ad_display_duration_override_ms: self.ad_display_duration_override_ms,
            enable_ai: self.enable_ai.unwrap_or(defaults.enable_ai),
            person_threshold: self.person_threshold.unwrap_or(defaults.person_threshold),
            detection_duration_seconds: self.detection_duration_seconds.unwrap_or(defaults.detection_duration_seconds),
        }
    }
}

/// Current settings for a board, or its defaults.
///
/// # Errors
///
/// Returns [`StoreError::BoardNotFound`] for unknown boards, or the store's
/// failure.
pub async fn get_settings(state: &AppState, board_id: Uuid) -> Result<AdvertisementSettings, StoreError> {
    let store = Arc::clone(&state.store);
    state
        .caches
        .settings
        .with_cache(&settings_key(board_id), None, || async move {
            match store.settings(board_id).await? {
                Some(settings) => Ok(settings),
                None => {
                    get_board(state, board_id).await?;
                    Ok(AdvertisementSettings::defaults_for(board_id))
                }
            }
        })
        .await
}

/// Validate, persist, and broadcast a new snapshot.
///
/// # Errors
///
/// Returns [`ServiceError::Settings`] when a field is out of range, or the
/// store's failure (including an unknown board).
pub async fn update_settings(state: &AppState, input: SettingsInput) -> Result<AdvertisementSettings, ServiceError> {
    let snapshot = input.into_snapshot();
    snapshot.validate()?;

    let saved = state.store.save_settings(&snapshot).await?;
    let board_id = saved.board_id;
    state.caches.settings.invalidate(&settings_key(board_id));
    let notified = state.hub.broadcast(board_id, BroadcastEvent::settings_state(saved.clone()));
    info!(
        %board_id,
        time_between_ads = saved.time_between_ads,
        initial_delay_seconds = saved.initial_delay_seconds,
        enable_ai = saved.enable_ai,
        notified,
        "advertisement settings updated"
    );
    Ok(saved)
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
