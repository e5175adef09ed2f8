//! Server configuration loaded from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a default except `DATABASE_URL`. Unparseable values fall
//! back to the default rather than aborting startup; `.env` is loaded by
//! `main` before this runs.

use std::time::Duration;

use crate::cache::CacheConfig;
use crate::hub::HubConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

const DEFAULT_STREAM_PING_INTERVAL_SECS: u64 = 30;
const DEFAULT_STREAM_MAX_MISSED_PINGS: u32 = 3;
const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 64;

const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_BOARD_CACHE_SIZE: usize = 100;
const DEFAULT_BOARD_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_SETTINGS_CACHE_SIZE: usize = 100;
const DEFAULT_SETTINGS_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_ADS_CACHE_SIZE: usize = 200;
const DEFAULT_ADS_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_QUERY_CACHE_SIZE: usize = 50;
const DEFAULT_QUERY_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Sizes and lifetimes of the four read-through caches.
#[derive(Clone, Copy, Debug)]
pub struct CacheSettings {
    pub sweep_interval: Duration,
    pub boards: CacheConfig,
    pub settings: CacheConfig,
    pub advertisements: CacheConfig,
    pub queries: CacheConfig,
}

impl CacheSettings {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            sweep_interval: Duration::from_secs(env_parse(
                "CACHE_SWEEP_INTERVAL_SECS",
                DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
            )),
            boards: cache_from_env("BOARD", DEFAULT_BOARD_CACHE_SIZE, DEFAULT_BOARD_CACHE_TTL_SECS),
            settings: cache_from_env("SETTINGS", DEFAULT_SETTINGS_CACHE_SIZE, DEFAULT_SETTINGS_CACHE_TTL_SECS),
            advertisements: cache_from_env("ADS", DEFAULT_ADS_CACHE_SIZE, DEFAULT_ADS_CACHE_TTL_SECS),
            queries: cache_from_env("QUERY", DEFAULT_QUERY_CACHE_SIZE, DEFAULT_QUERY_CACHE_TTL_SECS),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
            boards: CacheConfig::new(DEFAULT_BOARD_CACHE_SIZE, Duration::from_secs(DEFAULT_BOARD_CACHE_TTL_SECS)),
            settings: CacheConfig::new(
                DEFAULT_SETTINGS_CACHE_SIZE,
                Duration::from_secs(DEFAULT_SETTINGS_CACHE_TTL_SECS),
            ),
            advertisements: CacheConfig::new(DEFAULT_ADS_CACHE_SIZE, Duration::from_secs(DEFAULT_ADS_CACHE_TTL_SECS)),
            queries: CacheConfig::new(DEFAULT_QUERY_CACHE_SIZE, Duration::from_secs(DEFAULT_QUERY_CACHE_TTL_SECS)),
        }
    }
}

fn cache_from_env(prefix: &str, default_size: usize, default_ttl_secs: u64) -> CacheConfig {
    let max_size = env_parse(&format!("{prefix}_CACHE_SIZE"), default_size);
    let ttl_secs = env_parse(&format!("{prefix}_CACHE_TTL_SECS"), default_ttl_secs);
    CacheConfig::new(max_size, Duration::from_secs(ttl_secs))
}

/// Top-level server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub hub: HubConfig,
    pub cache: CacheSettings,
}

impl ServerConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `DATABASE_URL` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            hub: hub_from_env(),
            cache: CacheSettings::from_env(),
        })
    }
}

fn hub_from_env() -> HubConfig {
    HubConfig {
        ping_interval: Duration::from_secs(env_parse(
            "STREAM_PING_INTERVAL_SECS",
            DEFAULT_STREAM_PING_INTERVAL_SECS,
        )),
        max_missed_pings: env_parse("STREAM_MAX_MISSED_PINGS", DEFAULT_STREAM_MAX_MISSED_PINGS).max(1),
        channel_capacity: env_parse("STREAM_CHANNEL_CAPACITY", DEFAULT_STREAM_CHANNEL_CAPACITY).max(1),
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(DEFAULT_STREAM_PING_INTERVAL_SECS),
            max_missed_pings: DEFAULT_STREAM_MAX_MISSED_PINGS,
            channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
