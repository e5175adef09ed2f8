//! Advertisement CRUD, the public playlist, and view analytics.
//!
//! DESIGN
//! ======
//! The cached unit is a board's full advertisement list in display order
//! (oldest first). The public playlist is that list filtered by the active
//! flag and schedule at request time, so scheduling windows open and close
//! without a write.
//!
//! Writes broadcast INVALIDATE events tagged with a [`ChangeType`]; displays
//! re-fetch the playlist rather than receiving it inline.

use std::sync::Arc;

use events::{Advertisement, BroadcastEvent, ChangeType, DEFAULT_IMAGE_DURATION_MS, MediaType, now_ms};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::ServiceError;
use super::store::{AdvertisementViews, StoreError};
use crate::cache::{ANALYTICS_TTL, advertisements_key, analytics_key};
use crate::state::AppState;

// =============================================================================
// INPUT
// =============================================================================

/// Mutable advertisement fields as submitted by the admin API.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementFields {
    pub title: String,
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(default, rename = "displayDuration")]
    pub display_duration_ms: Option<u64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub start_date: Option<i64>,
    #[serde(default)]
    pub end_date: Option<i64>,
}

impl AdvertisementFields {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.title.trim().is_empty() {
            return Err(ServiceError::Invalid("title is required".into()));
        }
        if self.media_url.trim().is_empty() {
            return Err(ServiceError::Invalid("mediaUrl is required".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && start > end
        {
            return Err(ServiceError::Invalid("startDate must not be after endDate".into()));
        }
        Ok(())
    }

    /// Images default to [`DEFAULT_IMAGE_DURATION_MS`]; videos play to their
    /// natural end and carry no duration.
    fn effective_duration(&self) -> Option<u64> {
        match self.media_type {
            MediaType::Image => Some(self.display_duration_ms.unwrap_or(DEFAULT_IMAGE_DURATION_MS)),
            MediaType::Video => None,
        }
    }

    fn apply(self, ad: &mut Advertisement) {
        ad.display_duration_ms = self.effective_duration();
        ad.title = self.title.trim().to_owned();
        ad.media_url = self.media_url.trim().to_owned();
        ad.media_type = self.media_type;
        ad.is_active = self.is_active.unwrap_or(true);
        ad.start_date = self.start_date;
        ad.end_date = self.end_date;
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAdvertisement {
    pub board_id: Uuid,
    #[serde(flatten)]
    pub fields: AdvertisementFields,
}

/// Full replacement of an existing advertisement's mutable fields.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementReplace {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: AdvertisementFields,
}

// =============================================================================
// READS
// =============================================================================

/// Every advertisement for a board, active or not, in display order.
///
/// # Errors
///
/// Returns the store's failure.
pub async fn list_advertisements(state: &AppState, board_id: Uuid) -> Result<Vec<Advertisement>, StoreError> {
    let store = Arc::clone(&state.store);
    state
        .caches
        .advertisements
        .with_cache(&advertisements_key(board_id), None, || async move { store.advertisements(board_id).await })
        .await
}

/// Advertisements eligible to play at `now_ms`, in display order.
///
/// # Errors
///
/// Returns the store's failure.
pub async fn public_playlist(state: &AppState, board_id: Uuid, now_ms: i64) -> Result<Vec<Advertisement>, StoreError> {
    let ads = list_advertisements(state, board_id).await?;
    Ok(ads.into_iter().filter(|ad| ad.is_live_at(now_ms)).collect())
}

// =============================================================================
// WRITES
// =============================================================================

/// # Errors
///
/// Returns [`ServiceError::Invalid`] for missing fields, or the store's
/// failure (including an unknown board).
pub async fn create_advertisement(state: &AppState, input: NewAdvertisement) -> Result<Advertisement, ServiceError> {
    input.fields.validate()?;
    let now = now_ms();
    let mut ad = Advertisement {
        id: Uuid::new_v4(),
        board_id: input.board_id,
        title: String::new(),
        media_url: String::new(),
        media_type: input.fields.media_type,
        display_duration_ms: None,
        is_active: true,
        start_date: None,
        end_date: None,
        created_at: now,
        updated_at: now,
    };
    input.fields.apply(&mut ad);

    let created = state.store.insert_advertisement(&ad).await?;
    notify_advertisements_changed(state, created.board_id, Some(created.id), ChangeType::AdvertisementCreated);
    Ok(created)
}

/// # Errors
///
/// Returns [`ServiceError::Invalid`] for missing fields, or the store's
/// failure (including an unknown advertisement).
pub async fn replace_advertisement(
    state: &AppState,
    input: AdvertisementReplace,
) -> Result<Advertisement, ServiceError> {
    input.fields.validate()?;
    let existing = state.store.advertisement(input.id).await?;
    let mut ad = existing.clone();
    input.fields.apply(&mut ad);

    let change = if ad.is_active == existing.is_active {
        ChangeType::ContentUpdate
    } else {
        ChangeType::ActiveStatusChange
    };
    let updated = state.store.update_advertisement(&ad).await?;
    notify_advertisements_changed(state, updated.board_id, Some(updated.id), change);
    Ok(updated)
}

/// # Errors
///
/// Returns the store's failure (including an unknown advertisement).
pub async fn delete_advertisement(state: &AppState, advertisement_id: Uuid) -> Result<Advertisement, ServiceError> {
    let deleted = state.store.delete_advertisement(advertisement_id).await?;
    notify_advertisements_changed(state, deleted.board_id, Some(deleted.id), ChangeType::AdvertisementDeleted);
    Ok(deleted)
}

/// Drop the board's playlist and analytics caches, then tell its displays
/// to re-fetch. Returns how many streams were notified.
pub fn notify_advertisements_changed(
    state: &AppState,
    board_id: Uuid,
    advertisement_id: Option<Uuid>,
    change: ChangeType,
) -> usize {
    state.caches.advertisements.invalidate(&advertisements_key(board_id));
    state.caches.queries.invalidate(&analytics_key(board_id));
    let event = BroadcastEvent::advertisements_invalidated(board_id, advertisement_id, change);
    let notified = state.hub.broadcast(board_id, event);
    info!(%board_id, ?advertisement_id, ?change, notified, "advertisements changed");
    notified
}

// =============================================================================
// ANALYTICS
// =============================================================================

/// Count one completed showing. Cached totals are not invalidated; they
/// lag by at most [`ANALYTICS_TTL`].
///
/// # Errors
///
/// Returns the store's failure (including an unknown advertisement).
pub async fn record_view(state: &AppState, advertisement_id: Uuid) -> Result<(), StoreError> {
    let board_id = state.store.record_view(advertisement_id).await?;
    debug!(%board_id, %advertisement_id, "view recorded");
    Ok(())
}

/// View totals for a board.
///
/// # Errors
///
/// Returns the store's failure.
pub async fn view_counts(state: &AppState, board_id: Uuid) -> Result<Vec<AdvertisementViews>, StoreError> {
    let store = Arc::clone(&state.store);
    state
        .caches
        .queries
        .with_cache(&analytics_key(board_id), Some(ANALYTICS_TTL), || async move { store.view_counts(board_id).await })
        .await
}

#[cfg(test)]
#[path = "advertisement_test.rs"]
mod tests;
