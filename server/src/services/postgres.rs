//! Postgres-backed [`BoardStore`].
//!
//! Timestamps are stored as `TIMESTAMPTZ` and converted to epoch
//! milliseconds in SQL so rows map straight onto the shared event model.

use async_trait::async_trait;
use events::{Advertisement, AdvertisementSettings, Board, MediaType};
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{AdvertisementViews, BoardStore, BoardUpdate, StoreError};

const BOARD_COLUMNS: &str =
    "id, name, configuration, (extract(epoch from updated_at) * 1000)::bigint";

const AD_COLUMNS: &str = "id, board_id, title, media_url, media_type, display_duration, is_active, \
     (extract(epoch from start_date) * 1000)::bigint, \
     (extract(epoch from end_date) * 1000)::bigint, \
     (extract(epoch from created_at) * 1000)::bigint, \
     (extract(epoch from updated_at) * 1000)::bigint";

const SETTINGS_COLUMNS: &str = "board_id, time_between_ads, initial_delay_seconds, ad_display_duration_override, \
     enable_ai, person_threshold, detection_duration_seconds";

type BoardRow = (Uuid, String, serde_json::Value, i64);
type AdRow = (Uuid, Uuid, String, String, String, Option<i64>, bool, Option<i64>, Option<i64>, i64, i64);
type SettingsRow = (Uuid, i32, i32, Option<i64>, bool, i32, i32);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

fn board_from_row((id, name, configuration, updated_at): BoardRow) -> Board {
    Board { id, name, configuration, updated_at }
}

fn ad_from_row(row: AdRow) -> Result<Advertisement, StoreError> {
    let (id, board_id, title, media_url, media_type, duration, is_active, start_date, end_date, created_at, updated_at) =
        row;
    let media_type = MediaType::parse(&media_type)
        .ok_or_else(|| StoreError::Malformed(format!("advertisement {id} has media type {media_type:?}")))?;
    Ok(Advertisement {
        id,
        board_id,
        title,
        media_url,
        media_type,
        display_duration_ms: duration.and_then(|ms| u64::try_from(ms).ok()),
        is_active,
        start_date,
        end_date,
        created_at,
        updated_at,
    })
}

fn settings_from_row(row: SettingsRow) -> AdvertisementSettings {
    let (board_id, time_between_ads, initial_delay, override_ms, enable_ai, threshold, dwell) = row;
    AdvertisementSettings {
        board_id,
        time_between_ads: u32::try_from(time_between_ads).unwrap_or(0),
        initial_delay_seconds: u32::try_from(initial_delay).unwrap_or(0),
        ad_display_duration_override_ms: override_ms.and_then(|ms| u64::try_from(ms).ok()),
        enable_ai,
        person_threshold: u32::try_from(threshold).unwrap_or(0),
        detection_duration_seconds: u32::try_from(dwell).unwrap_or(0),
    }
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_db_ms(value: Option<u64>) -> Option<i64> {
    value.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX))
}

// =============================================================================
// STORE
// =============================================================================

#[async_trait]
impl BoardStore for PgStore {
    async fn board(&self, board_id: Uuid) -> Result<Board, StoreError> {
        let row = sqlx::query_as::<_, BoardRow>(&format!("SELECT {BOARD_COLUMNS} FROM boards WHERE id = $1"))
            .bind(board_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(board_from_row).ok_or(StoreError::BoardNotFound(board_id))
    }

    async fn update_board(&self, board_id: Uuid, update: BoardUpdate) -> Result<Board, StoreError> {
        let row = sqlx::query_as::<_, BoardRow>(&format!(
            "UPDATE boards \
             SET name = COALESCE($2, name), configuration = COALESCE($3, configuration), updated_at = now() \
             WHERE id = $1 \
             RETURNING {BOARD_COLUMNS}"
        ))
        .bind(board_id)
        .bind(update.name)
        .bind(update.configuration)
        .fetch_optional(&self.pool)
        .await?;
        row.map(board_from_row).ok_or(StoreError::BoardNotFound(board_id))
    }

    async fn advertisements(&self, board_id: Uuid) -> Result<Vec<Advertisement>, StoreError> {
        let rows = sqlx::query_as::<_, AdRow>(&format!(
            "SELECT {AD_COLUMNS} FROM advertisements WHERE board_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ad_from_row).collect()
    }

    async fn advertisement(&self, advertisement_id: Uuid) -> Result<Advertisement, StoreError> {
        let row = sqlx::query_as::<_, AdRow>(&format!("SELECT {AD_COLUMNS} FROM advertisements WHERE id = $1"))
            .bind(advertisement_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ad_from_row).transpose()?.ok_or(StoreError::AdvertisementNotFound(advertisement_id))
    }

    async fn insert_advertisement(&self, ad: &Advertisement) -> Result<Advertisement, StoreError> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "INSERT INTO advertisements \
                 (id, board_id, title, media_url, media_type, display_duration, is_active, start_date, end_date) \
             SELECT $1, $2, $3, $4, $5, $6, $7, \
                    to_timestamp($8::double precision / 1000.0), to_timestamp($9::double precision / 1000.0) \
             WHERE EXISTS (SELECT 1 FROM boards WHERE id = $2) \
             RETURNING {AD_COLUMNS}"
        ))
        .bind(ad.id)
        .bind(ad.board_id)
        .bind(&ad.title)
        .bind(&ad.media_url)
        .bind(ad.media_type.as_str())
        .bind(to_db_ms(ad.display_duration_ms))
        .bind(ad.is_active)
        .bind(ad.start_date)
        .bind(ad.end_date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ad_from_row).transpose()?.ok_or(StoreError::BoardNotFound(ad.board_id))
    }

    async fn update_advertisement(&self, ad: &Advertisement) -> Result<Advertisement, StoreError> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "UPDATE advertisements \
             SET title = $2, media_url = $3, media_type = $4, display_duration = $5, is_active = $6, \
                 start_date = to_timestamp($7::double precision / 1000.0), \
                 end_date = to_timestamp($8::double precision / 1000.0), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {AD_COLUMNS}"
        ))
        .bind(ad.id)
        .bind(&ad.title)
        .bind(&ad.media_url)
        .bind(ad.media_type.as_str())
        .bind(to_db_ms(ad.display_duration_ms))
        .bind(ad.is_active)
        .bind(ad.start_date)
        .bind(ad.end_date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ad_from_row).transpose()?.ok_or(StoreError::AdvertisementNotFound(ad.id))
    }

    async fn delete_advertisement(&self, advertisement_id: Uuid) -> Result<Advertisement, StoreError> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "DELETE FROM advertisements WHERE id = $1 RETURNING {AD_COLUMNS}"
        ))
        .bind(advertisement_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ad_from_row).transpose()?.ok_or(StoreError::AdvertisementNotFound(advertisement_id))
    }

    async fn settings(&self, board_id: Uuid) -> Result<Option<AdvertisementSettings>, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM advertisement_settings WHERE board_id = $1"
        ))
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(settings_from_row))
    }

    async fn save_settings(&self, settings: &AdvertisementSettings) -> Result<AdvertisementSettings, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "INSERT INTO advertisement_settings \
                 (board_id, time_between_ads, initial_delay_seconds, ad_display_duration_override, \
                  enable_ai, person_threshold, detection_duration_seconds, updated_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, now() \
             WHERE EXISTS (SELECT 1 FROM boards WHERE id = $1) \
             ON CONFLICT (board_id) DO UPDATE SET \
                 time_between_ads = EXCLUDED.time_between_ads, \
                 initial_delay_seconds = EXCLUDED.initial_delay_seconds, \
                 ad_display_duration_override = EXCLUDED.ad_display_duration_override, \
                 enable_ai = EXCLUDED.enable_ai, \
                 person_threshold = EXCLUDED.person_threshold, \
                 detection_duration_seconds = EXCLUDED.detection_duration_seconds, \
                 updated_at = now() \
             RETURNING {SETTINGS_COLUMNS}"
        ))
        .bind(settings.board_id)
        .bind(to_db_int(settings.time_between_ads))
        .bind(to_db_int(settings.initial_delay_seconds))
        .bind(to_db_ms(settings.ad_display_duration_override_ms))
        .bind(settings.enable_ai)
        .bind(to_db_int(settings.person_threshold))
        .bind(to_db_int(settings.detection_duration_seconds))
        .fetch_optional(&self.pool)
        .await?;
        row.map(settings_from_row).ok_or(StoreError::BoardNotFound(settings.board_id))
    }

    async fn record_view(&self, advertisement_id: Uuid) -> Result<Uuid, StoreError> {
        let board_id: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO advertisement_analytics (advertisement_id, board_id, view_count, last_viewed_at) \
             SELECT id, board_id, 1, now() FROM advertisements WHERE id = $1 \
             ON CONFLICT (advertisement_id) DO UPDATE SET \
                 view_count = advertisement_analytics.view_count + 1, \
                 last_viewed_at = now() \
             RETURNING board_id",
        )
        .bind(advertisement_id)
        .fetch_optional(&self.pool)
        .await?;
        board_id.ok_or(StoreError::AdvertisementNotFound(advertisement_id))
    }

    async fn view_counts(&self, board_id: Uuid) -> Result<Vec<AdvertisementViews>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64)>(
            "SELECT a.id, a.title, COALESCE(s.view_count, 0) \
             FROM advertisements a \
             LEFT JOIN advertisement_analytics s ON s.advertisement_id = a.id \
             WHERE a.board_id = $1 \
             ORDER BY a.created_at ASC, a.id ASC",
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(advertisement_id, title, view_count)| AdvertisementViews { advertisement_id, title, view_count })
            .collect())
    }
}

#[cfg(test)]
#[path = "postgres_test.rs"]
mod tests;
