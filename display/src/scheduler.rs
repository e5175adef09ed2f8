//! Timer-only ad scheduling, used when presence sensing is off or
//! unavailable.
//!
//! Primary content stays up for `timeBetweenAds`, then the next playlist
//! item plays; the gap restarts when that item completes. The initial delay
//! is added once, before the first gap.

use std::time::Instant;

use events::AdvertisementSettings;
use tracing::debug;

use crate::trigger::Decision;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerPhase {
    Unstarted,
    Waiting { until: Instant },
    /// An ad is on screen; the next gap starts when it completes.
    Showing,
}

#[derive(Debug)]
pub struct TimerScheduler {
    phase: TimerPhase,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self { phase: TimerPhase::Unstarted }
    }

    #[must_use]
    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Forget the schedule. The next tick applies the initial delay again.
    pub fn reset(&mut self) {
        self.phase = TimerPhase::Unstarted;
    }

    /// Start a full gap from `now`. Used when timer mode takes over from
    /// presence sensing, so the first timer ad waits `timeBetweenAds`.
    pub fn rearm(&mut self, now: Instant, settings: &AdvertisementSettings) {
        self.phase = TimerPhase::Waiting { until: now + settings.time_between() };
    }

    pub fn tick(&mut self, now: Instant, settings: &AdvertisementSettings, has_ads: bool) -> Decision {
        match self.phase {
            TimerPhase::Unstarted => {
                let until = now + settings.initial_delay() + settings.time_between();
                debug!(
                    initial_delay_secs = settings.initial_delay_seconds,
                    time_between_secs = settings.time_between_ads,
                    "timer schedule started"
                );
                self.phase = TimerPhase::Waiting { until };
                Decision::Hold
            }
            TimerPhase::Waiting { until } if now >= until => {
                if has_ads {
                    self.phase = TimerPhase::Showing;
                    Decision::ShowAd
                } else {
                    debug!("timer elapsed with empty playlist, rescheduling");
                    self.phase = TimerPhase::Waiting { until: now + settings.time_between() };
                    Decision::Hold
                }
            }
            TimerPhase::Waiting { .. } | TimerPhase::Showing => Decision::Hold,
        }
    }

    /// The visible ad finished; primary content returns for another gap.
    pub fn on_ad_complete(&mut self, now: Instant, settings: &AdvertisementSettings) {
        if self.phase == TimerPhase::Showing {
            self.phase = TimerPhase::Waiting { until: now + settings.time_between() };
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
