//! Display runtime: the single task that drives ad decisions.
//!
//! DESIGN
//! ======
//! Everything that changes what is on screen funnels through one
//! `tokio::select!` loop:
//! - a 1-second tick samples presence and steps either the trigger engine
//!   (sensing on) or the timer scheduler (sensing off or unavailable);
//! - stream updates swap in STATE payloads or queue a refetch through
//!   [`ContentSource`] for INVALIDATE events;
//! - a slower refresh tick queues a full refetch, so schedule windows that
//!   open or close without a write still reach the screen;
//! - finished fetches are applied as they arrive;
//! - end-of-media events from the renderer complete videos early;
//! - subscriber state changes toggle the offline flag.
//!
//! Fetches run on spawned tasks, one at a time. Requests made while one is
//! in flight merge into a single queued scope. No loop branch awaits a
//! fetch; the initial load before the loop is bounded by [`FETCH_TIMEOUT`].
//!
//! The result is published as a [`DisplayState`] on a `watch` channel; the
//! renderer only ever reads that value.
//!
//! ERROR HANDLING
//! ==============
//! Fetch failures and timeouts keep the last good board, settings, and
//! playlist. Sensor failures switch to timer mode and re-probe later. View
//! recording is fire-and-forget. None of these stop the loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use events::{AdvertisementItem, AdvertisementSettings, Board};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ContentSource;
use crate::playlist::PlaylistController;
use crate::presence::PresenceSensor;
use crate::scheduler::TimerScheduler;
use crate::subscriber::{Refetch, StreamUpdate, SubscriberState};
use crate::trigger::{Decision, TriggerEngine};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// How long sensing stays off after a sensor error.
pub const SENSOR_RETRY_INTERVAL: Duration = Duration::from_secs(60);
/// A reading slower than this counts as no reading.
pub const SENSOR_TIMEOUT: Duration = Duration::from_millis(800);
/// Full reload period when no other is configured.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
/// Upper bound for one fetch of every scope it covers.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// VIEW
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum DisplayView {
    Primary,
    Advertisement(AdvertisementItem),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DisplayState {
    pub view: DisplayView,
    /// Set once the subscriber has given up reconnecting.
    pub offline: bool,
    pub board: Option<Board>,
    /// Whether the last tick used presence sensing.
    pub sensing: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self { view: DisplayView::Primary, offline: false, board: None, sensing: false }
    }
}

/// One successful read from a [`ContentSource`].
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    Board(Board),
    Settings(AdvertisementSettings),
    Playlist(Vec<AdvertisementItem>),
}

/// Read every part of `scope`. Failures are logged and left out, so callers
/// keep their previous value.
pub async fn fetch(content: &dyn ContentSource, board_id: Uuid, scope: Refetch) -> Vec<Fetched> {
    let mut fetched = Vec::new();
    if matches!(scope, Refetch::Board | Refetch::All) {
        match content.board(board_id).await {
            Ok(board) => fetched.push(Fetched::Board(board)),
            Err(e) => warn!(%board_id, error = %e, "board fetch failed, keeping previous"),
        }
    }
    if scope == Refetch::All {
        match content.settings(board_id).await {
            Ok(settings) => fetched.push(Fetched::Settings(settings)),
            Err(e) => warn!(%board_id, error = %e, "settings fetch failed, keeping previous"),
        }
    }
    if matches!(scope, Refetch::Advertisements | Refetch::All) {
        match content.playlist(board_id).await {
            Ok(items) => fetched.push(Fetched::Playlist(items)),
            Err(e) => warn!(%board_id, error = %e, "playlist fetch failed, keeping previous"),
        }
    }
    fetched
}

/// One tick's input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sample {
    /// Sensing off or unavailable.
    Timer,
    /// Sensing on; `None` when the sensor produced no reading in time.
    Presence(Option<u32>),
}

// =============================================================================
// RUNTIME
// =============================================================================

pub struct DisplayRuntime {
    board_id: Uuid,
    content: Arc<dyn ContentSource>,
    sensor: Arc<dyn PresenceSensor>,
    settings: AdvertisementSettings,
    playlist: PlaylistController,
    engine: TriggerEngine,
    scheduler: TimerScheduler,
    sensor_retry_at: Option<Instant>,
    refresh_interval: Duration,
    fetching: bool,
    queued: Option<Refetch>,
    state: watch::Sender<DisplayState>,
}

impl DisplayRuntime {
    /// Build a runtime with default settings and an empty playlist. Call
    /// [`DisplayRuntime::reload`] (or [`DisplayRuntime::run`]) to load real
    /// content.
    #[must_use]
    pub fn new(
        board_id: Uuid,
        content: Arc<dyn ContentSource>,
        sensor: Arc<dyn PresenceSensor>,
    ) -> (Self, watch::Receiver<DisplayState>) {
        let (state, rx) = watch::channel(DisplayState::default());
        let runtime = Self {
            board_id,
            content,
            sensor,
            settings: AdvertisementSettings::defaults_for(board_id),
            playlist: PlaylistController::new(),
            engine: TriggerEngine::new(),
            scheduler: TimerScheduler::new(),
            sensor_retry_at: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetching: false,
            queued: None,
            state,
        };
        (runtime, rx)
    }

    /// Period of the full reload. Clamped to at least one tick.
    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval.max(TICK_INTERVAL);
        self
    }

    #[must_use]
    pub fn settings(&self) -> &AdvertisementSettings {
        &self.settings
    }

    #[must_use]
    pub fn playlist(&self) -> &PlaylistController {
        &self.playlist
    }

    #[must_use]
    pub fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    // -------------------------------------------------------------------------
    // Content
    // -------------------------------------------------------------------------

    /// Re-read the given scope in place. Failures keep the previous value.
    pub async fn reload(&mut self, scope: Refetch) {
        for fetched in fetch(self.content.as_ref(), self.board_id, scope).await {
            self.apply_fetched(fetched);
        }
    }

    pub fn apply_fetched(&mut self, fetched: Fetched) {
        match fetched {
            Fetched::Board(board) => self.state.send_modify(|s| s.board = Some(board)),
            Fetched::Settings(settings) => self.apply_settings(settings),
            Fetched::Playlist(items) => self.playlist.set_items(items),
        }
    }

    /// Start a background fetch of `scope`, or queue it behind the one in
    /// flight. Results arrive on `done`.
    fn request(&mut self, scope: Refetch, done: &mpsc::Sender<Vec<Fetched>>) {
        if self.fetching {
            self.queued = Some(self.queued.map_or(scope, |queued| queued.union(scope)));
            debug!(board_id = %self.board_id, ?scope, "fetch queued");
            return;
        }
        self.fetching = true;
        let content = Arc::clone(&self.content);
        let board_id = self.board_id;
        let done = done.clone();
        tokio::spawn(async move {
            let fetched = match tokio::time::timeout(FETCH_TIMEOUT, fetch(content.as_ref(), board_id, scope)).await {
                Ok(fetched) => fetched,
                Err(_) => {
                    warn!(%board_id, ?scope, "fetch timed out, keeping previous");
                    Vec::new()
                }
            };
            let _ = done.send(fetched).await;
        });
    }

    fn fetch_done(&mut self, fetched: Vec<Fetched>, done: &mpsc::Sender<Vec<Fetched>>) {
        self.fetching = false;
        for item in fetched {
            self.apply_fetched(item);
        }
        if let Some(scope) = self.queued.take() {
            self.request(scope, done);
        }
    }

    /// Apply a stream update. Returns the scope to refetch, if any.
    pub fn apply(&mut self, update: StreamUpdate) -> Option<Refetch> {
        match update {
            StreamUpdate::Board(board) => {
                debug!(board_id = %board.id, "board state applied");
                self.state.send_modify(|s| s.board = Some(board));
                None
            }
            StreamUpdate::Settings(settings) => {
                self.apply_settings(settings);
                None
            }
            StreamUpdate::Refetch(scope) => Some(scope),
        }
    }

    fn apply_settings(&mut self, settings: AdvertisementSettings) {
        if settings.board_id != self.board_id {
            warn!(board_id = %self.board_id, got = %settings.board_id, "settings for another board ignored");
            return;
        }
        if !settings.enable_ai {
            self.engine.reset();
        }
        info!(
            board_id = %self.board_id,
            enable_ai = settings.enable_ai,
            time_between_ads = settings.time_between_ads,
            "settings applied"
        );
        self.settings = settings;
    }

    // -------------------------------------------------------------------------
    // Ticks
    // -------------------------------------------------------------------------

    /// Read the sensor if sensing is on and not backing off.
    pub async fn sample(&mut self, now: Instant) -> Sample {
        if !self.settings.enable_ai {
            return Sample::Timer;
        }
        if self.sensor_retry_at.is_some_and(|at| now < at) {
            return Sample::Timer;
        }
        match tokio::time::timeout(SENSOR_TIMEOUT, self.sensor.person_count()).await {
            Ok(Ok(count)) => {
                if self.sensor_retry_at.take().is_some() {
                    info!(board_id = %self.board_id, "presence sensing restored");
                }
                Sample::Presence(Some(count))
            }
            Ok(Err(e)) => {
                warn!(board_id = %self.board_id, error = %e, "presence sensing unavailable, using timer mode");
                self.engine.reset();
                self.sensor_retry_at = Some(now + SENSOR_RETRY_INTERVAL);
                Sample::Timer
            }
            Err(_) => Sample::Presence(None),
        }
    }

    /// Advance one tick: finish a due ad, then ask the active decider whether
    /// to show the next one.
    pub fn step(&mut self, now: Instant, sample: Sample) {
        if self.playlist.due(now) {
            self.finish_ad(now);
        }

        let sensing = matches!(sample, Sample::Presence(_));
        let was_sensing = self.state.borrow().sensing;
        if was_sensing && !sensing {
            // The old deadline is stale after a stretch of sensing.
            self.scheduler.rearm(now, &self.settings);
        }
        if was_sensing != sensing {
            self.state.send_modify(|s| s.sensing = sensing);
        }

        let has_ads = !self.playlist.is_empty();
        let decision = match sample {
            Sample::Presence(count) => self.engine.tick(now, count, &self.settings, has_ads),
            Sample::Timer => self.scheduler.tick(now, &self.settings, has_ads),
        };

        if decision == Decision::ShowAd {
            self.show_ad(now);
        }
    }

    /// The renderer reports a video ended.
    pub fn media_ended(&mut self, ad_id: Uuid, now: Instant) {
        if self.playlist.on_media_end(ad_id).is_some() {
            self.after_ad(now);
        }
    }

    pub fn set_offline(&mut self, offline: bool) {
        if self.state.borrow().offline != offline {
            if offline {
                warn!(board_id = %self.board_id, "display offline");
            } else {
                info!(board_id = %self.board_id, "display back online");
            }
            self.state.send_modify(|s| s.offline = offline);
        }
    }

    fn show_ad(&mut self, now: Instant) {
        let Some(showing) = self.playlist.show_next(now, &self.settings) else {
            return;
        };
        let item = showing.item.clone();
        self.record_view(item.id);
        self.state.send_modify(|s| s.view = DisplayView::Advertisement(item));
    }

    fn finish_ad(&mut self, now: Instant) {
        if self.playlist.complete().is_some() {
            self.after_ad(now);
        }
    }

    fn after_ad(&mut self, now: Instant) {
        self.engine.on_ad_complete();
        self.scheduler.on_ad_complete(now, &self.settings);
        self.state.send_modify(|s| s.view = DisplayView::Primary);
    }

    fn record_view(&self, advertisement_id: Uuid) {
        let content = Arc::clone(&self.content);
        tokio::spawn(async move {
            if let Err(e) = content.record_view(advertisement_id).await {
                warn!(%advertisement_id, error = %e, "view not recorded");
            }
        });
    }

    // -------------------------------------------------------------------------
    // Loop
    // -------------------------------------------------------------------------

    /// Load content, then drive the display until `shutdown` resolves. The
    /// initial load gives up after [`FETCH_TIMEOUT`]; the loop retries it on
    /// the refresh tick.
    pub async fn run<F>(
        mut self,
        mut updates: mpsc::Receiver<StreamUpdate>,
        mut status: watch::Receiver<SubscriberState>,
        mut media_end: mpsc::Receiver<Uuid>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        if tokio::time::timeout(FETCH_TIMEOUT, self.reload(Refetch::All)).await.is_err() {
            warn!(board_id = %self.board_id, "initial load timed out, starting with what arrived");
        }
        info!(board_id = %self.board_id, ads = self.playlist.items().len(), "display runtime started");

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let start = tokio::time::Instant::now() + self.refresh_interval;
        let mut refresh = tokio::time::interval_at(start, self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (done_tx, mut done_rx) = mpsc::channel(4);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    let now = tokio::time::Instant::now().into_std();
                    let sample = self.sample(now).await;
                    self.step(now, sample);
                }
                _ = refresh.tick() => {
                    debug!(board_id = %self.board_id, "periodic refresh");
                    self.request(Refetch::All, &done_tx);
                }
                Some(update) = updates.recv() => {
                    if let Some(scope) = self.apply(update) {
                        self.request(scope, &done_tx);
                    }
                }
                Some(fetched) = done_rx.recv() => self.fetch_done(fetched, &done_tx),
                Some(ad_id) = media_end.recv() => {
                    self.media_ended(ad_id, tokio::time::Instant::now().into_std());
                }
                Ok(()) = status.changed() => {
                    let state = *status.borrow_and_update();
                    self.set_offline(state == SubscriberState::Disconnected);
                }
            }
        }
        info!(board_id = %self.board_id, "display runtime stopped");
    }
}

#[cfg(test)]
#[path = "runtime_test.rs"]
mod tests;
