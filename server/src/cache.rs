//! Bounded TTL read-through caches for board, settings, and playlist reads.
//!
//! DESIGN
//! ======
//! Each cache is a `HashMap<String, Entry>` behind a `std::sync::Mutex`; no
//! lock is held across an `.await`. Entries expire at `expires_at` (an entry
//! read exactly at its expiry instant is a miss). When full, inserting a new
//! key evicts one entry: an expired one if any exists, otherwise the least
//! recently accessed.
//!
//! Time-dependent operations have an `_at(now)` variant so tests can drive
//! expiry without sleeping.
//!
//! CONSISTENCY
//! ===========
//! Writers invalidate before they broadcast. Concurrent readers that miss
//! may both call the producer; the last `set` wins. That is acceptable for
//! data whose source of truth is the store.
//!
//! Every invalidation bumps a generation counter. A read-through fill
//! records the generation when it misses and only inserts if no
//! invalidation happened while the producer ran, so a fill that read the
//! store before a write can never re-cache the old value after it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use events::{Advertisement, AdvertisementSettings, Board};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use uuid::Uuid;

use crate::config::CacheSettings;
use crate::services::store::AdvertisementViews;

/// Capacity and default lifetime of one cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub default_ttl: Duration,
}

impl CacheConfig {
    #[must_use]
    pub const fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self { max_size, default_ttl }
    }
}

/// Point-in-time counters for one cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub name: &'static str,
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_accessed: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct CacheInner<V> {
    entries: HashMap<String, Entry<V>>,
    hits: u64,
    misses: u64,
    generation: u64,
}

impl<V> CacheInner<V> {
    fn insert(&mut self, key: String, value: V, expires_at: Instant, now: Instant, max_size: usize) {
        if max_size == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= max_size {
            evict_one(&mut self.entries, now);
        }
        self.entries.insert(key, Entry { value, expires_at, last_accessed: now });
    }
}

// =============================================================================
// READ-THROUGH CACHE
// =============================================================================

pub struct ReadThroughCache<V> {
    name: &'static str,
    config: CacheConfig,
    inner: Arc<Mutex<CacheInner<V>>>,
}

impl<V> Clone for ReadThroughCache<V> {
    fn clone(&self) -> Self {
        Self { name: self.name, config: self.config, inner: Arc::clone(&self.inner) }
    }
}

impl<V: Clone> ReadThroughCache<V> {
    #[must_use]
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(CacheInner { entries: HashMap::new(), hits: 0, misses: 0, generation: 0 })),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`. Expired entries are dropped and count as
    /// misses.
    #[must_use]
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.last_accessed = now;
                inner.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(key);
        }
        inner.misses += 1;
        None
    }

    /// Insert with `ttl`, or the cache's default when `None`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, now: Instant) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        self.lock().insert(key.into(), value, now + ttl, now, self.config.max_size);
    }

    /// Insert only if nothing was invalidated since `generation` was read.
    fn fill_at(&self, key: &str, value: V, ttl: Option<Duration>, now: Instant, generation: u64) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(cache = self.name, key, "fill raced an invalidation, not cached");
            return;
        }
        inner.insert(key.to_owned(), value, now + ttl, now, self.config.max_size);
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Presence check that does not touch hit/miss counters or recency.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.has_at(key, Instant::now())
    }

    #[must_use]
    pub fn has_at(&self, key: &str, now: Instant) -> bool {
        self.lock().entries.get(key).is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        inner.generation += 1;
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        before - inner.entries.len()
    }

    /// Drop all entries and reset counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Remove every entry expired as of `now`. Returns the number removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 { 0.0 } else { inner.hits as f64 / lookups as f64 };
        CacheStats {
            name: self.name,
            size: inner.entries.len(),
            max_size: self.config.max_size,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
        }
    }

    /// Return the cached value for `key`, or run `producer`, cache its
    /// success, and return it. Errors are returned uncached, and so is a
    /// value produced while the cache was invalidated.
    ///
    /// # Errors
    ///
    /// Propagates the producer's error.
    pub async fn with_cache<F, Fut, E>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = self.generation();
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = producer().await?;
        self.fill_at(key, value.clone(), ttl, Instant::now(), generation);
        Ok(value)
    }

    /// [`with_cache`](Self::with_cache) with an explicit clock for both the
    /// lookup and the insert.
    ///
    /// # Errors
    ///
    /// Propagates the producer's error.
    pub async fn with_cache_at<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        now: Instant,
        producer: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let generation = self.generation();
        if let Some(value) = self.get_at(key, now) {
            return Ok(value);
        }
        let value = producer().await?;
        self.fill_at(key, value.clone(), ttl, now, generation);
        Ok(value)
    }
}

fn evict_one<V>(entries: &mut HashMap<String, Entry<V>>, now: Instant) {
    let victim = entries
        .iter()
        .find(|(_, entry)| entry.is_expired(now))
        .or_else(|| entries.iter().min_by_key(|(_, entry)| entry.last_accessed))
        .map(|(key, _)| key.clone());
    if let Some(key) = victim {
        entries.remove(&key);
    }
}

// =============================================================================
// CACHE SET
// =============================================================================

/// TTL for analytics rollups.
pub const ANALYTICS_TTL: Duration = Duration::from_secs(300);

#[must_use]
pub fn board_key(board_id: Uuid) -> String {
    format!("board:{board_id}")
}

#[must_use]
pub fn settings_key(board_id: Uuid) -> String {
    format!("settings:{board_id}")
}

#[must_use]
pub fn advertisements_key(board_id: Uuid) -> String {
    format!("ads:{board_id}")
}

#[must_use]
pub fn analytics_key(board_id: Uuid) -> String {
    format!("analytics:{board_id}")
}

/// The four caches the read path goes through.
#[derive(Clone)]
pub struct Caches {
    pub boards: ReadThroughCache<Board>,
    pub settings: ReadThroughCache<AdvertisementSettings>,
    pub advertisements: ReadThroughCache<Vec<Advertisement>>,
    pub queries: ReadThroughCache<Vec<AdvertisementViews>>,
}

impl Caches {
    #[must_use]
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            boards: ReadThroughCache::new("boards", settings.boards),
            settings: ReadThroughCache::new("settings", settings.settings),
            advertisements: ReadThroughCache::new("advertisements", settings.advertisements),
            queries: ReadThroughCache::new("queries", settings.queries),
        }
    }

    /// Drop every cached read that belongs to `board_id`.
    pub fn invalidate_board(&self, board_id: Uuid) {
        self.boards.invalidate(&board_key(board_id));
        self.settings.invalidate(&settings_key(board_id));
        self.advertisements.invalidate(&advertisements_key(board_id));
        self.queries.invalidate(&analytics_key(board_id));
    }

    pub fn sweep_all(&self) -> usize {
        self.boards.sweep() + self.settings.sweep() + self.advertisements.sweep() + self.queries.sweep()
    }

    #[must_use]
    pub fn stats(&self) -> Vec<CacheStats> {
        vec![self.boards.stats(), self.settings.stats(), self.advertisements.stats(), self.queries.stats()]
    }
}

/// Spawn the periodic expiry sweep. Returns a handle for shutdown.
pub fn spawn_sweep_task(caches: Caches, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = caches.sweep_all();
            if removed > 0 {
                debug!(removed, "cache sweep removed expired entries");
            }
        }
    })
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
