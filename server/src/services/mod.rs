//! Domain services used by the stream and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own reads, writes, and change notification so route
//! handlers stay focused on protocol translation. Every write follows the
//! same order: persist, invalidate the affected cache keys, then broadcast.
//! A broadcast never fails the write that triggered it.

pub mod advertisement;
pub mod board;
pub mod postgres;
pub mod settings;
pub mod store;

use events::SettingsError;

use store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("invalid request: {0}")]
    Invalid(String),
}
