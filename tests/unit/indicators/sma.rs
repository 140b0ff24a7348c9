//! Unit tests for the time-based rolling mean

use chrono::{Duration, TimeZone, Utc};
use sentrix::indicators::trend::RollingMean;

#[test]
fn test_mean_over_span() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut mean = RollingMean::new(Duration::hours(24), 100);

    assert_eq!(mean.push(t0, 10.0), 10.0);
    assert_eq!(mean.push(t0 + Duration::hours(1), 20.0), 15.0);

    // t0 falls out of the trailing 24h, t0 + 1h sits exactly on the edge.
    assert_eq!(mean.push(t0 + Duration::hours(25), 30.0), 25.0);
    assert_eq!(mean.len(), 2);
}

#[test]
fn test_sample_bound_drops_oldest() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut mean = RollingMean::new(Duration::hours(24), 3);
    for (i, v) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
        mean.push(t0 + Duration::seconds(i as i64), v);
    }
    assert_eq!(mean.len(), 3);
    assert_eq!(mean.mean(), Some(3.0));
}

#[test]
fn test_prune_and_reconfigure() {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut mean = RollingMean::new(Duration::hours(1), 10);
    mean.push(t0, 1.0);
    mean.push(t0 + Duration::minutes(30), 3.0);

    mean.prune(t0 + Duration::minutes(70));
    assert_eq!(mean.len(), 1);
    assert_eq!(mean.mean(), Some(3.0));

    mean.reconfigure(Duration::hours(1), 1);
    assert_eq!(mean.len(), 1);

    mean.prune(t0 + Duration::hours(3));
    assert!(mean.is_empty());
    assert_eq!(mean.mean(), None);
}
