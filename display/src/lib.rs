//! Display client for signage boards.
//!
//! ARCHITECTURE
//! ============
//! - [`subscriber`] keeps the board's NDJSON event stream open and turns
//!   lines into [`subscriber::StreamUpdate`]s.
//! - [`api`] re-reads board, settings, and playlist over REST.
//! - [`trigger`] and [`scheduler`] decide when an ad plays (presence-driven
//!   or timer-only); [`playlist`] decides which one.
//! - [`runtime`] drives all of the above from one task and publishes the
//!   current [`runtime::DisplayState`].

pub mod api;
pub mod config;
pub mod playlist;
pub mod presence;
pub mod runtime;
pub mod scheduler;
pub mod subscriber;
pub mod trigger;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error(transparent)]
    Api(#[from] api::ApiError),
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}
