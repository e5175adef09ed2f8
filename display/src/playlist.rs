//! Playlist rotation.
//!
//! DESIGN
//! ======
//! The controller owns the rotation index and at most one visible item.
//! `show_next` presents `items[index mod len]`; completion (duration elapsed
//! or end-of-media) hides it and advances the index. A replaced playlist
//! keeps the index, clamped to the new length, so rotation continues where
//! it left off instead of restarting at the first item.

use std::time::{Duration, Instant};

use events::{AdvertisementItem, AdvertisementSettings, DEFAULT_IMAGE_DURATION_MS, MediaType};
use tracing::debug;
use uuid::Uuid;

/// Completion deadline for a video that never reports end-of-media.
pub const VIDEO_FALLBACK: Duration = Duration::from_secs(30);

/// The item on screen and when it is due to complete.
#[derive(Clone, Debug, PartialEq)]
pub struct Showing {
    pub item: AdvertisementItem,
    pub index: usize,
    pub started_at: Instant,
    pub due_at: Instant,
}

#[derive(Debug, Default)]
pub struct PlaylistController {
    items: Vec<AdvertisementItem>,
    index: usize,
    showing: Option<Showing>,
}

/// How long an item stays on screen when nothing ends it early.
#[must_use]
pub fn display_duration(item: &AdvertisementItem, settings: &AdvertisementSettings) -> Duration {
    match item.media_type {
        MediaType::Video => VIDEO_FALLBACK,
        MediaType::Image => {
            let ms = item
                .display_duration_ms
                .or(settings.ad_display_duration_override_ms)
                .unwrap_or(DEFAULT_IMAGE_DURATION_MS);
            Duration::from_millis(ms)
        }
    }
}

impl PlaylistController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn items(&self) -> &[AdvertisementItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn showing(&self) -> Option<&Showing> {
        self.showing.as_ref()
    }

    /// Replace the playlist. The index is kept modulo the new length; the
    /// visible item, if any, stays until it completes.
    pub fn set_items(&mut self, items: Vec<AdvertisementItem>) {
        self.index = if items.is_empty() { 0 } else { self.index % items.len() };
        debug!(count = items.len(), index = self.index, "playlist replaced");
        self.items = items;
    }

    /// Put the current item on screen. Replaces whatever was showing.
    /// Returns `None` when the playlist is empty.
    pub fn show_next(&mut self, now: Instant, settings: &AdvertisementSettings) -> Option<&Showing> {
        if self.items.is_empty() {
            return None;
        }
        let index = self.index % self.items.len();
        let item = self.items[index].clone();
        let due_at = now + display_duration(&item, settings);
        debug!(ad_id = %item.id, index, "showing advertisement");
        self.showing = Some(Showing { item, index, started_at: now, due_at });
        self.showing.as_ref()
    }

    /// Whether the visible item's duration has elapsed at `now`.
    #[must_use]
    pub fn due(&self, now: Instant) -> bool {
        self.showing.as_ref().is_some_and(|showing| now >= showing.due_at)
    }

    /// Hide the visible item and advance the rotation. Returns the completed
    /// item, or `None` if nothing was showing.
    pub fn complete(&mut self) -> Option<AdvertisementItem> {
        let showing = self.showing.take()?;
        self.index = if self.items.is_empty() { 0 } else { (showing.index + 1) % self.items.len() };
        debug!(ad_id = %showing.item.id, next_index = self.index, "advertisement completed");
        Some(showing.item)
    }

    /// End-of-media from the renderer. Ignored unless it names the visible
    /// item, so a late event from a replaced video cannot skip an ad.
    pub fn on_media_end(&mut self, ad_id: Uuid) -> Option<AdvertisementItem> {
        if self.showing.as_ref().is_some_and(|showing| showing.item.id == ad_id) {
            return self.complete();
        }
        None
    }
}

#[cfg(test)]
#[path = "playlist_test.rs"]
mod tests;
