//! REST read path used by the display.
//!
//! The stream only carries what changed; everything the display renders is
//! (re)loaded through these calls. [`ContentSource`] is the seam the runtime
//! depends on so tests can swap in an in-memory source.

use std::time::Duration;

use async_trait::async_trait;
use events::{Advertisement, AdvertisementItem, AdvertisementSettings, Board};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

/// Upper bound for one REST call. Set per request because the shared client
/// also carries the long-lived stream.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn board(&self, board_id: Uuid) -> Result<Board, ApiError>;

    async fn settings(&self, board_id: Uuid) -> Result<AdvertisementSettings, ApiError>;

    /// Ads eligible to play now, in rotation order.
    async fn playlist(&self, board_id: Uuid) -> Result<Vec<AdvertisementItem>, ApiError>;

    /// Count one showing of an ad.
    async fn record_view(&self, advertisement_id: Uuid) -> Result<(), ApiError>;
}

#[derive(Clone, Debug)]
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentSource {
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidBaseUrl`] unless `base_url` is http(s).
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url)?;
        Ok(Self { client, base_url })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).timeout(REQUEST_TIMEOUT).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), path: path.to_owned() });
        }
        Ok(response.json::<T>().await?)
    }
}

/// Trim trailing slashes and reject anything that is not http(s).
///
/// # Errors
///
/// Returns [`ApiError::InvalidBaseUrl`] for other schemes.
pub fn normalize_base_url(base_url: &str) -> Result<String, ApiError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ApiError::InvalidBaseUrl(base_url.to_owned()))
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn board(&self, board_id: Uuid) -> Result<Board, ApiError> {
        self.get_json(&format!("/api/boards/{board_id}")).await
    }

    async fn settings(&self, board_id: Uuid) -> Result<AdvertisementSettings, ApiError> {
        self.get_json(&format!("/api/advertisements/settings?boardId={board_id}")).await
    }

    async fn playlist(&self, board_id: Uuid) -> Result<Vec<AdvertisementItem>, ApiError> {
        let ads: Vec<Advertisement> = self.get_json(&format!("/api/advertisements/public?boardId={board_id}")).await?;
        Ok(ads.iter().map(AdvertisementItem::from).collect())
    }

    async fn record_view(&self, advertisement_id: Uuid) -> Result<(), ApiError> {
        let path = "/api/advertisements/analytics";
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&json!({ "advertisementId": advertisement_id }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), path: path.to_owned() });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
