//! Unit tests for source observations

use chrono::{TimeZone, Utc};
use sentrix::error::ValidationError;
use sentrix::models::observation::{SourceName, SourceObservation};

#[test]
fn test_source_names_parse_case_insensitively() {
    assert_eq!("order_book".parse::<SourceName>(), Ok(SourceName::OrderBook));
    assert_eq!(" FEAR_GREED ".parse::<SourceName>(), Ok(SourceName::FearGreed));
    assert_eq!(
        "weather".parse::<SourceName>(),
        Err(ValidationError::UnknownSource("weather".to_string()))
    );
    for source in SourceName::ALL {
        assert_eq!(source.as_str().parse::<SourceName>(), Ok(source));
    }
}

#[test]
fn test_value_ranges() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert!(SourceObservation::new("BTC", SourceName::News, -1.0, ts).is_ok());
    assert!(SourceObservation::new("BTC", SourceName::FearGreed, 100.0, ts).is_ok());
    assert!(SourceObservation::new("BTC", SourceName::SocialVolume, 1.0e9, ts).is_ok());

    assert!(matches!(
        SourceObservation::new("BTC", SourceName::News, 1.2, ts),
        Err(ValidationError::OutOfRange { .. })
    ));
    assert!(matches!(
        SourceObservation::new("BTC", SourceName::Volatility, -3.0, ts),
        Err(ValidationError::OutOfRange { .. })
    ));
    assert_eq!(
        SourceObservation::new("BTC", SourceName::Social, f64::NAN, ts),
        Err(ValidationError::NonFinite { field: "value" })
    );
    assert_eq!(
        SourceObservation::new("  ", SourceName::Social, 0.1, ts),
        Err(ValidationError::EmptyEntity)
    );
}

#[test]
fn test_confidence_bounds() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let observation = SourceObservation::new("ETH", SourceName::Options, 0.3, ts).unwrap();
    assert_eq!(observation.confidence, 1.0);

    let observation = observation.with_confidence(0.4).unwrap();
    assert_eq!(observation.confidence, 0.4);
    assert_eq!(
        observation.clone().with_confidence(1.5),
        Err(ValidationError::InvalidConfidence(1.5))
    );
}

#[test]
fn test_redelivery_detection() {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let a = SourceObservation::new("BTC", SourceName::News, 0.3, ts).unwrap();
    let b = a.clone().with_confidence(0.2).unwrap();
    let c = SourceObservation::new("BTC", SourceName::News, 0.31, ts).unwrap();
    assert!(b.is_redelivery_of(&a));
    assert!(!c.is_redelivery_of(&a));
}

#[test]
fn test_deserializes_with_default_confidence() {
    let observation: SourceObservation = serde_json::from_str(
        r#"{"entity":"SOL","source":"order_book","value":-0.2,"timestamp":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(observation.source, SourceName::OrderBook);
    assert_eq!(observation.confidence, 1.0);
    assert!(observation.metadata.is_none());
}
