//! Presence-driven trigger decision engine.
//!
//! DESIGN
//! ======
//! The engine is a pure step function: the runtime feeds it one sample per
//! tick together with the current settings snapshot and gets back either
//! [`Decision::ShowAd`] or [`Decision::Hold`]. It owns no timers and never
//! reads the clock, so every transition is driven by the `now` it is given.
//!
//! States:
//! - `Idle`: counting consecutive qualifying ticks. Immediate mode (dwell 0)
//!   fires on the second one; dwell mode moves to `Detecting`.
//! - `Detecting`: presence must hold for the whole dwell. Any drop below the
//!   threshold discards the partial dwell.
//! - `Cooldown`: entered on every fire. Signals are ignored until the
//!   cooldown ends, then the engine waits for the area to clear before it
//!   returns to `Idle`.

use std::time::{Duration, Instant};

use events::AdvertisementSettings;
use tracing::{debug, trace};

/// Consecutive qualifying ticks needed in immediate mode.
pub const IMMEDIATE_HITS: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Detecting { started_at: Instant },
    Cooldown { ends_at: Instant },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Hold,
    ShowAd,
}

#[derive(Debug)]
pub struct TriggerEngine {
    phase: TriggerPhase,
    consecutive_hits: u32,
    consecutive_misses: u32,
    /// Set when a trigger found an empty playlist; evaluation is suspended
    /// until then.
    recheck_at: Option<Instant>,
}

impl Default for TriggerEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { phase: TriggerPhase::Idle, consecutive_hits: 0, consecutive_misses: 0, recheck_at: None }
    }

    #[must_use]
    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    #[must_use]
    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    #[must_use]
    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    #[must_use]
    pub fn recheck_at(&self) -> Option<Instant> {
        self.recheck_at
    }

    /// Drop back to `Idle` with cleared counters. Used when sensing is
    /// switched off or the engine is rebuilt for a new board.
    pub fn reset(&mut self) {
        self.phase = TriggerPhase::Idle;
        self.consecutive_hits = 0;
        self.consecutive_misses = 0;
        self.recheck_at = None;
    }

    /// Advance one tick.
    ///
    /// `presence` is the person count for this tick; `None` (no reading)
    /// counts as an empty area. `has_ads` reports whether the playlist has
    /// anything to show.
    pub fn tick(
        &mut self,
        now: Instant,
        presence: Option<u32>,
        settings: &AdvertisementSettings,
        has_ads: bool,
    ) -> Decision {
        if let Some(at) = self.recheck_at {
            if now < at {
                return Decision::Hold;
            }
            self.recheck_at = None;
        }

        let occupied = presence.unwrap_or(0) >= settings.effective_threshold();
        let dwell = settings.dwell();

        match self.phase {
            TriggerPhase::Cooldown { ends_at } => {
                if now < ends_at {
                    return Decision::Hold;
                }
                if occupied {
                    trace!("cooldown over but area still occupied");
                    return Decision::Hold;
                }
                debug!("area cleared, trigger engine idle");
                self.phase = TriggerPhase::Idle;
                self.consecutive_hits = 0;
                self.consecutive_misses = 1;
                Decision::Hold
            }
            TriggerPhase::Detecting { started_at } => {
                if !occupied {
                    trace!("presence lost during dwell");
                    self.phase = TriggerPhase::Idle;
                    self.consecutive_hits = 0;
                    self.consecutive_misses = 1;
                    return Decision::Hold;
                }
                self.consecutive_hits += 1;
                if now.saturating_duration_since(started_at) >= dwell {
                    return self.fire(now, settings, has_ads);
                }
                Decision::Hold
            }
            TriggerPhase::Idle => {
                if !occupied {
                    self.consecutive_hits = 0;
                    self.consecutive_misses += 1;
                    return Decision::Hold;
                }
                self.consecutive_hits += 1;
                self.consecutive_misses = 0;
                if dwell == Duration::ZERO {
                    if self.consecutive_hits >= IMMEDIATE_HITS {
                        return self.fire(now, settings, has_ads);
                    }
                } else {
                    trace!(dwell_secs = dwell.as_secs(), "presence detected, dwell started");
                    self.phase = TriggerPhase::Detecting { started_at: now };
                }
                Decision::Hold
            }
        }
    }

    /// Ad completion never resets or shortens an active cooldown; the engine
    /// leaves the area-clear check to the next tick.
    pub fn on_ad_complete(&mut self) {
        trace!(phase = ?self.phase, "ad completed");
    }

    fn fire(&mut self, now: Instant, settings: &AdvertisementSettings, has_ads: bool) -> Decision {
        self.consecutive_hits = 0;
        self.consecutive_misses = 0;
        if !has_ads {
            let at = now + settings.time_between();
            debug!(recheck_in_secs = settings.time_between_ads, "trigger with empty playlist");
            self.phase = TriggerPhase::Idle;
            self.recheck_at = Some(at);
            return Decision::Hold;
        }
        let cooldown = settings.cooldown();
        debug!(cooldown_ms = cooldown.as_millis(), "trigger fired");
        self.phase = TriggerPhase::Cooldown { ends_at: now + cooldown };
        Decision::ShowAd
    }
}

#[cfg(test)]
#[path = "trigger_test.rs"]
mod tests;
