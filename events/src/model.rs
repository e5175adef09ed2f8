//! Board, advertisement, and settings records shared by server and display.
//!
//! DESIGN
//! ======
//! Field names on the wire are camelCase so the stream, the REST API, and the
//! store webhooks all speak the same JSON. Timestamps are milliseconds since
//! the Unix epoch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// DEFAULTS AND LIMITS
// =============================================================================

pub const DEFAULT_TIME_BETWEEN_ADS_SECS: u32 = 60;
pub const DEFAULT_INITIAL_DELAY_SECS: u32 = 5;
pub const DEFAULT_PERSON_THRESHOLD: u32 = 1;

/// Image duration when neither the item nor the settings say otherwise.
pub const DEFAULT_IMAGE_DURATION_MS: u64 = 10_000;

pub const TIME_BETWEEN_ADS_RANGE: (u32, u32) = (5, 600);
pub const INITIAL_DELAY_RANGE: (u32, u32) = (1, 60);
pub const MAX_DETECTION_DURATION_SECS: u32 = 60;

/// Floor applied to every post-trigger cooldown.
pub const MIN_COOLDOWN: Duration = Duration::from_secs(2);

// =============================================================================
// BOARD
// =============================================================================

/// A logical display target. The core only relies on `id`; the rest is
/// carried through to displays in `board_updated` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub configuration: serde_json::Value,
    pub updated_at: i64,
}

// =============================================================================
// ADVERTISEMENTS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// Persisted advertisement record as returned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advertisement {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(rename = "displayDuration")]
    pub display_duration_ms: Option<u64>,
    pub is_active: bool,
    pub start_date: Option<i64>,
    pub end_date: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Advertisement {
    /// Whether the ad is switched on and `now_ms` lies inside its schedule.
    #[must_use]
    pub fn is_live_at(&self, now_ms: i64) -> bool {
        if !self.is_active {
            return false;
        }
        if self.start_date.is_some_and(|start| start > now_ms) {
            return false;
        }
        if self.end_date.is_some_and(|end| end < now_ms) {
            return false;
        }
        true
    }
}

/// One playlist entry as the display consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementItem {
    pub id: Uuid,
    pub media_type: MediaType,
    pub display_duration_ms: Option<u64>,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl From<&Advertisement> for AdvertisementItem {
    fn from(ad: &Advertisement) -> Self {
        Self {
            id: ad.id,
            media_type: ad.media_type,
            display_duration_ms: ad.display_duration_ms,
            url: ad.media_url.clone(),
            title: ad.title.clone(),
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("time between ads must be between {min} and {max} seconds")]
    TimeBetweenAds { min: u32, max: u32 },
    #[error("initial delay must be between {min} and {max} seconds")]
    InitialDelay { min: u32, max: u32 },
    #[error("person threshold must be at least 1")]
    PersonThreshold,
    #[error("detection duration must be at most {max} seconds")]
    DetectionDuration { max: u32 },
}

/// Immutable advertisement settings snapshot for one board.
///
/// A write always produces a whole new snapshot; displays swap the value
/// they hold rather than patching fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementSettings {
    pub board_id: Uuid,
    pub time_between_ads: u32,
    pub initial_delay_seconds: u32,
    #[serde(rename = "adDisplayDurationOverride")]
    pub ad_display_duration_override_ms: Option<u64>,
    #[serde(rename = "enableAI")]
    pub enable_ai: bool,
    pub person_threshold: u32,
    pub detection_duration_seconds: u32,
}

impl AdvertisementSettings {
    /// Settings served for a board that never saved any.
    #[must_use]
    pub fn defaults_for(board_id: Uuid) -> Self {
        Self {
            board_id,
            time_between_ads: DEFAULT_TIME_BETWEEN_ADS_SECS,
            initial_delay_seconds: DEFAULT_INITIAL_DELAY_SECS,
            ad_display_duration_override_ms: None,
            enable_ai: false,
            person_threshold: DEFAULT_PERSON_THRESHOLD,
            detection_duration_seconds: 0,
        }
    }

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let (min, max) = TIME_BETWEEN_ADS_RANGE;
        if !(min..=max).contains(&self.time_between_ads) {
            return Err(SettingsError::TimeBetweenAds { min, max });
        }
        let (min, max) = INITIAL_DELAY_RANGE;
        if !(min..=max).contains(&self.initial_delay_seconds) {
            return Err(SettingsError::InitialDelay { min, max });
        }
        if self.person_threshold == 0 {
            return Err(SettingsError::PersonThreshold);
        }
        if self.detection_duration_seconds > MAX_DETECTION_DURATION_SECS {
            return Err(SettingsError::DetectionDuration { max: MAX_DETECTION_DURATION_SECS });
        }
        Ok(())
    }

    #[must_use]
    pub fn time_between(&self) -> Duration {
        Duration::from_secs(u64::from(self.time_between_ads))
    }

    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(u64::from(self.initial_delay_seconds))
    }

    /// Dwell time required before a trigger. Zero means immediate mode.
    #[must_use]
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(u64::from(self.detection_duration_seconds))
    }

    /// Quiet period entered after every trigger: `max(2s, dwell)`.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.dwell().max(MIN_COOLDOWN)
    }

    /// Threshold with the `>= 1` floor applied, for snapshots that bypassed
    /// validation.
    #[must_use]
    pub fn effective_threshold(&self) -> u32 {
        self.person_threshold.max(1)
    }
}
