//! Unit tests for multi-window smoothing

use chrono::{DateTime, Duration, TimeZone, Utc};
use sentrix::config::WindowSettings;
use sentrix::models::signal::{SignalName, Window};
use sentrix::signals::smoothing::{SmoothingEngine, SmoothingOutcome};

const SIGNAL: SignalName = SignalName::CompositeSentiment;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

#[test]
fn test_first_update_initializes_every_window() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    assert_eq!(engine.update("BTC", SIGNAL, 0.4, t0()), SmoothingOutcome::Applied);

    let state = engine.get("BTC", SIGNAL).unwrap();
    assert_eq!(state.updates, 1);
    assert_eq!(state.raw, 0.4);
    assert_eq!(state.previous_raw, None);
    for window in Window::ALL {
        let value = state.window(window).unwrap();
        assert_eq!(value.value, 0.4);
        assert_eq!(value.previous, None);
        assert_eq!(value.samples, 1);
        assert_eq!(value.updated_at, t0());
    }
}

#[test]
fn test_ema_windows_follow_recurrence() {
    let settings = WindowSettings::default();
    let mut engine = SmoothingEngine::new(settings.clone());
    let inputs = [0.2, -0.1, 0.5, 0.5, -0.7, 0.3, 0.0, 0.9];

    let mut expected = [inputs[0]; 3];
    engine.update("BTC", SIGNAL, inputs[0], at(0));
    for (i, x) in inputs.iter().enumerate().skip(1) {
        engine.update("BTC", SIGNAL, *x, at(i as i64 * 60));
        let state = engine.get("BTC", SIGNAL).unwrap();
        for (slot, window) in [Window::Fast, Window::Medium, Window::Slow].into_iter().enumerate() {
            let n = settings.period(window).unwrap();
            let a = 2.0 / (n as f64 + 1.0);
            let previous = expected[slot];
            expected[slot] = a * x + (1.0 - a) * previous;
            assert!((state.value(window).unwrap() - expected[slot]).abs() < 1e-12);
            assert_eq!(state.previous(window), Some(previous));
        }
    }
}

#[test]
fn test_daily_window_is_rolling_mean() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    engine.update("BTC", SignalName::SocialVolume, 10.0, t0());
    engine.update("BTC", SignalName::SocialVolume, 20.0, t0() + Duration::hours(1));
    engine.update("BTC", SignalName::SocialVolume, 30.0, t0() + Duration::hours(25));

    let state = engine.get("BTC", SignalName::SocialVolume).unwrap();
    let daily = state.window(Window::Daily).unwrap();
    assert_eq!(daily.value, 25.0);
    assert_eq!(daily.previous, Some(15.0));
    assert_eq!(daily.samples, 2);
}

#[test]
fn test_stale_update_leaves_state_unchanged() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    engine.update("BTC", SIGNAL, 0.1, at(0));
    engine.update("BTC", SIGNAL, 0.3, at(100));
    let before = engine.get("BTC", SIGNAL).cloned().unwrap();

    for (value, secs) in [(0.9, 50), (-0.9, 99), (0.0, 0)] {
        assert_eq!(engine.update("BTC", SIGNAL, value, at(secs)), SmoothingOutcome::Stale);
        assert_eq!(engine.get("BTC", SIGNAL), Some(&before));
    }
}

#[test]
fn test_duplicate_and_same_instant_updates() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    engine.update("BTC", SIGNAL, 0.1, at(0));
    engine.update("BTC", SIGNAL, 0.3, at(10));

    assert_eq!(engine.update("BTC", SIGNAL, 0.3, at(10)), SmoothingOutcome::Duplicate);
    assert_eq!(engine.get("BTC", SIGNAL).unwrap().updates, 2);

    assert_eq!(engine.update("BTC", SIGNAL, 0.35, at(10)), SmoothingOutcome::Applied);
    assert_eq!(engine.get("BTC", SIGNAL).unwrap().updates, 3);
}

#[test]
fn test_rejects_non_finite() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    assert_eq!(engine.update("BTC", SIGNAL, f64::NAN, t0()), SmoothingOutcome::Rejected);
    assert!(engine.get("BTC", SIGNAL).is_none());
}

#[test]
fn test_evict_only_touches_one_entity() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    engine.update("BTC", SIGNAL, 0.1, t0());
    engine.update("BTC", SignalName::FearGreedIndex, 40.0, t0());
    engine.update("ETH", SIGNAL, -0.1, t0());
    assert_eq!(engine.entity_count(), 2);
    assert_eq!(engine.states("BTC").count(), 2);

    assert!(engine.evict("BTC"));
    assert!(!engine.evict("BTC"));
    assert!(engine.get("BTC", SIGNAL).is_none());
    assert_eq!(engine.get("ETH", SIGNAL).unwrap().raw, -0.1);
}

#[test]
fn test_reconfigure_keeps_values() {
    let mut engine = SmoothingEngine::new(WindowSettings::default());
    engine.update("BTC", SIGNAL, 1.0, at(0));

    engine.reconfigure(WindowSettings {
        fast: 1,
        ..WindowSettings::default()
    });
    assert_eq!(engine.get("BTC", SIGNAL).unwrap().value(Window::Fast), Some(1.0));

    engine.update("BTC", SIGNAL, 0.0, at(1));
    assert_eq!(engine.get("BTC", SIGNAL).unwrap().value(Window::Fast), Some(0.0));
}
