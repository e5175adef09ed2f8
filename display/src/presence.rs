//! Presence sensing.
//!
//! A sensor reports how many people are in front of the display. Sensing is
//! best-effort: any error means the runtime treats sensing as disabled and
//! falls back to timer-only scheduling until a later probe succeeds.

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("presence sensing unavailable: {0}")]
    Unavailable(String),
    #[error("sensor request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sensor returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait PresenceSensor: Send + Sync {
    /// Current person count.
    async fn person_count(&self) -> Result<u32, SensorError>;
}

/// Sensor used when none is configured. Always unavailable, so the display
/// runs in timer mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSensor;

#[async_trait]
impl PresenceSensor for NoSensor {
    async fn person_count(&self) -> Result<u32, SensorError> {
        Err(SensorError::Unavailable("no sensor configured".into()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresenceReading {
    person_count: u32,
}

/// Sensor sidecar exposing `GET <url>` → `{"personCount": n}`.
#[derive(Clone, Debug)]
pub struct HttpPresenceSensor {
    client: reqwest::Client,
    url: String,
}

impl HttpPresenceSensor {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl PresenceSensor for HttpPresenceSensor {
    async fn person_count(&self) -> Result<u32, SensorError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SensorError::Status(status.as_u16()));
        }
        let reading: PresenceReading = response.json().await?;
        Ok(reading.person_count)
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
