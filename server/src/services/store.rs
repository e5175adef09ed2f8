//! Persistence seam for boards, advertisements, settings, and view counts.
//!
//! DESIGN
//! ======
//! Services talk to `dyn BoardStore` so the read path, the caches, and the
//! broadcast flow can be exercised without a database. The Postgres
//! implementation lives in `services::postgres`.

use async_trait::async_trait;
use events::{Advertisement, AdvertisementSettings, Board};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("board not found: {0}")]
    BoardNotFound(Uuid),
    #[error("advertisement not found: {0}")]
    AdvertisementNotFound(Uuid),
    #[error("stored row is malformed: {0}")]
    Malformed(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Partial board edit. `None` leaves the field unchanged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoardUpdate {
    pub name: Option<String>,
    pub configuration: Option<serde_json::Value>,
}

/// Per-advertisement view totals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementViews {
    pub advertisement_id: Uuid,
    pub title: String,
    pub view_count: i64,
}

#[async_trait]
pub trait BoardStore: Send + Sync {
    async fn board(&self, board_id: Uuid) -> Result<Board, StoreError>;

    async fn update_board(&self, board_id: Uuid, update: BoardUpdate) -> Result<Board, StoreError>;

    /// All advertisements for a board in display order (oldest first).
    async fn advertisements(&self, board_id: Uuid) -> Result<Vec<Advertisement>, StoreError>;

    async fn advertisement(&self, advertisement_id: Uuid) -> Result<Advertisement, StoreError>;

    async fn insert_advertisement(&self, ad: &Advertisement) -> Result<Advertisement, StoreError>;

    /// Overwrite every mutable column of an existing advertisement.
    async fn update_advertisement(&self, ad: &Advertisement) -> Result<Advertisement, StoreError>;

    async fn delete_advertisement(&self, advertisement_id: Uuid) -> Result<Advertisement, StoreError>;

    /// Saved settings, or `None` if the board never saved any.
    async fn settings(&self, board_id: Uuid) -> Result<Option<AdvertisementSettings>, StoreError>;

    async fn save_settings(&self, settings: &AdvertisementSettings) -> Result<AdvertisementSettings, StoreError>;

    /// Increment the view counter and return the advertisement's board.
    async fn record_view(&self, advertisement_id: Uuid) -> Result<Uuid, StoreError>;

    async fn view_counts(&self, board_id: Uuid) -> Result<Vec<AdvertisementViews>, StoreError>;
}
