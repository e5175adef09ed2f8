//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the store behind a trait object, the broadcast hub that owns every
//! open stream, and the read-through caches. All fields are cheap to clone.

use std::sync::Arc;

use crate::cache::Caches;
use crate::config::CacheSettings;
use crate::hub::{BroadcastHub, HubConfig};
use crate::services::store::BoardStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BoardStore>,
    pub hub: BroadcastHub,
    pub caches: Caches,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn BoardStore>, hub_config: HubConfig, cache_settings: &CacheSettings) -> Self {
        Self { store, hub: BroadcastHub::new(hub_config), caches: Caches::new(cache_settings) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
