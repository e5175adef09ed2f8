use super::*;
use uuid::Uuid;

fn settings(dwell_secs: u32) -> AdvertisementSettings {
    AdvertisementSettings {
        enable_ai: true,
        detection_duration_seconds: dwell_secs,
        ..AdvertisementSettings::defaults_for(Uuid::nil())
    }
}

fn at(base: Instant, millis: u64) -> Instant {
    base + Duration::from_millis(millis)
}

#[test]
fn dwell_interrupted_before_threshold_never_fires() {
    let s = settings(3);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    for ms in [0, 1_000, 2_000, 2_900] {
        assert_eq!(engine.tick(at(t0, ms), Some(1), &s, true), Decision::Hold);
    }
    assert_eq!(engine.tick(at(t0, 3_900), Some(0), &s, true), Decision::Hold);
    assert_eq!(engine.phase(), TriggerPhase::Idle);
    assert_eq!(engine.consecutive_misses(), 1);
}

#[test]
fn dwell_held_to_threshold_fires_exactly_once() {
    let s = settings(3);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    let fired: Vec<Decision> = (0..=8).map(|sec| engine.tick(at(t0, sec * 1_000), Some(2), &s, true)).collect();
    assert_eq!(fired.iter().filter(|d| **d == Decision::ShowAd).count(), 1);
    assert_eq!(fired[3], Decision::ShowAd);
}

#[test]
fn immediate_mode_needs_two_consecutive_ticks() {
    let s = settings(0);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    assert_eq!(engine.tick(t0, Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 1_000), Some(0), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 2_000), Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 3_000), Some(1), &s, true), Decision::ShowAd);
    assert!(matches!(engine.phase(), TriggerPhase::Cooldown { .. }));
}

#[test]
fn below_threshold_is_a_miss() {
    let s = AdvertisementSettings { person_threshold: 3, ..settings(0) };
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    assert_eq!(engine.tick(t0, Some(2), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 1_000), Some(2), &s, true), Decision::Hold);
    assert_eq!(engine.consecutive_hits(), 0);
    assert_eq!(engine.consecutive_misses(), 2);
}

#[test]
fn missing_sample_counts_as_empty_area() {
    let s = settings(0);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    assert_eq!(engine.tick(t0, Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 1_000), None, &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 2_000), Some(1), &s, true), Decision::Hold);
}

#[test]
fn second_trigger_needs_cooldown_elapsed_and_area_cleared() {
    let s = settings(5);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    let mut fires = Vec::new();
    // Occupied from 0 to 20s: fires once at 5s, then stays in cooldown.
    for sec in 0..=20 {
        if engine.tick(at(t0, sec * 1_000), Some(1), &s, true) == Decision::ShowAd {
            fires.push(sec);
        }
    }
    assert_eq!(fires, vec![5]);
    assert!(matches!(engine.phase(), TriggerPhase::Cooldown { .. }));

    // Area clears, then a fresh dwell fires again.
    assert_eq!(engine.tick(at(t0, 21_000), Some(0), &s, true), Decision::Hold);
    assert_eq!(engine.phase(), TriggerPhase::Idle);
    for sec in 22..27 {
        assert_eq!(engine.tick(at(t0, sec * 1_000), Some(1), &s, true), Decision::Hold);
    }
    assert_eq!(engine.tick(at(t0, 27_000), Some(1), &s, true), Decision::ShowAd);
}

#[test]
fn clearing_during_cooldown_does_not_end_it_early() {
    let s = settings(5);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    for sec in 0..5 {
        engine.tick(at(t0, sec * 1_000), Some(1), &s, true);
    }
    assert_eq!(engine.tick(at(t0, 5_000), Some(1), &s, true), Decision::ShowAd);

    // Empty at 7s is ignored; occupied again when the cooldown ends at 10s.
    assert_eq!(engine.tick(at(t0, 7_000), Some(0), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 10_000), Some(1), &s, true), Decision::Hold);
    assert!(matches!(engine.phase(), TriggerPhase::Cooldown { .. }));
}

#[test]
fn cooldown_has_a_two_second_floor() {
    let s = settings(0);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    engine.tick(t0, Some(1), &s, true);
    assert_eq!(engine.tick(at(t0, 1_000), Some(1), &s, true), Decision::ShowAd);
    assert_eq!(engine.phase(), TriggerPhase::Cooldown { ends_at: at(t0, 3_000) });
}

#[test]
fn ad_completion_keeps_cooldown() {
    let s = settings(0);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    engine.tick(t0, Some(1), &s, true);
    engine.tick(at(t0, 1_000), Some(1), &s, true);
    let before = engine.phase();
    engine.on_ad_complete();
    assert_eq!(engine.phase(), before);
}

#[test]
fn empty_playlist_never_fires_and_waits_time_between_ads() {
    let s = settings(0);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    engine.tick(t0, Some(1), &s, false);
    assert_eq!(engine.tick(at(t0, 1_000), Some(1), &s, false), Decision::Hold);
    assert_eq!(engine.phase(), TriggerPhase::Idle);
    assert_eq!(engine.recheck_at(), Some(at(t0, 61_000)));

    // Ads arrive, but evaluation stays suspended until the recheck.
    assert_eq!(engine.tick(at(t0, 30_000), Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 31_000), Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 61_000), Some(1), &s, true), Decision::Hold);
    assert_eq!(engine.tick(at(t0, 62_000), Some(1), &s, true), Decision::ShowAd);
}

#[test]
fn reset_returns_to_idle() {
    let s = settings(4);
    let mut engine = TriggerEngine::new();
    let t0 = Instant::now();

    engine.tick(t0, Some(1), &s, true);
    assert!(matches!(engine.phase(), TriggerPhase::Detecting { .. }));
    engine.reset();
    assert_eq!(engine.phase(), TriggerPhase::Idle);
    assert_eq!(engine.consecutive_hits(), 0);
}
