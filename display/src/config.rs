//! Command-line and environment configuration for the display binary.

use std::time::Duration;

use clap::Parser;
use uuid::Uuid;

use crate::subscriber::{ReconnectPolicy, SubscriberConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "signage-display", about = "Signage board display client")]
pub struct DisplayArgs {
    /// Server origin, e.g. `http://127.0.0.1:3000`.
    #[arg(long, env = "SIGNAGE_BASE_URL", default_value = "http://127.0.0.1:3000")]
    pub base_url: String,

    #[arg(long, env = "SIGNAGE_BOARD_ID")]
    pub board_id: Uuid,

    /// Presence sensor endpoint returning `{"personCount": n}`. Without it
    /// the display runs in timer mode.
    #[arg(long, env = "SIGNAGE_SENSOR_URL")]
    pub sensor_url: Option<String>,

    /// Expected server ping interval; three silent intervals drop the stream.
    #[arg(long, env = "SIGNAGE_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    #[arg(long, env = "SIGNAGE_MAX_RECONNECT_ATTEMPTS", default_value_t = 5)]
    pub max_reconnect_attempts: u32,

    /// Full reload period, independent of stream events. Picks up ads whose
    /// schedule window opened or closed without a write.
    #[arg(
        long,
        env = "SIGNAGE_REFRESH_INTERVAL_SECS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub refresh_interval_secs: u64,
}

impl DisplayArgs {
    #[must_use]
    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs.max(1)),
            reconnect: ReconnectPolicy { max_attempts: self.max_reconnect_attempts, ..ReconnectPolicy::default() },
            ..SubscriberConfig::new(self.board_id)
        }
    }

    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
