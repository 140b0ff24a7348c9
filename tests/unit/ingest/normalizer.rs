//! Unit tests for provider payload normalization

use chrono::{TimeZone, Utc};
use sentrix::error::ValidationError;
use sentrix::ingest::normalizer::{
    fear_greed_to_sentiment, normalize_order_book_imbalance, normalize_put_call_ratio,
    normalize_score, RawObservation,
};
use sentrix::models::observation::{SourceName, SourceObservation};
use serde_json::json;

fn raw(source: &str, value: f64) -> RawObservation {
    RawObservation {
        entity: " BTC ".to_string(),
        source: source.to_string(),
        value,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        confidence: None,
        metadata: None,
    }
}

#[test]
fn test_converts_valid_payload() {
    let mut payload = raw("Social", 0.4);
    payload.confidence = Some(0.8);
    payload.metadata = Some(json!({ "posts": 120 }));

    let observation = payload.into_observation().unwrap();
    assert_eq!(observation.entity, "BTC");
    assert_eq!(observation.source, SourceName::Social);
    assert_eq!(observation.confidence, 0.8);
    assert_eq!(observation.metadata, Some(json!({ "posts": 120 })));
}

#[test]
fn test_default_confidence() {
    let observation = SourceObservation::try_from(raw("news", -0.1)).unwrap();
    assert_eq!(observation.confidence, 1.0);
}

#[test]
fn test_rejects_invalid_payloads() {
    assert_eq!(
        raw("weather", 0.1).into_observation(),
        Err(ValidationError::UnknownSource("weather".to_string()))
    );
    assert!(matches!(
        raw("fear_greed", 140.0).into_observation(),
        Err(ValidationError::OutOfRange { .. })
    ));

    let mut payload = raw("news", 0.1);
    payload.confidence = Some(-0.1);
    assert_eq!(
        payload.into_observation(),
        Err(ValidationError::InvalidConfidence(-0.1))
    );

    let mut payload = raw("news", 0.1);
    payload.entity = "   ".to_string();
    assert_eq!(payload.into_observation(), Err(ValidationError::EmptyEntity));
}

#[test]
fn test_parses_json_line() {
    let payload: RawObservation = serde_json::from_str(
        r#"{"entity":"ETH","source":"volatility","value":27.5,"timestamp":"2024-03-01T12:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(payload.confidence, None);
    let observation = payload.into_observation().unwrap();
    assert_eq!(observation.source, SourceName::Volatility);
    assert_eq!(observation.value, 27.5);
}

#[test]
fn test_normalize_score() {
    assert_eq!(normalize_score(50.0, 0.0, 100.0), 0.0);
    assert_eq!(normalize_score(0.0, 0.0, 100.0), -1.0);
    assert_eq!(normalize_score(150.0, 0.0, 100.0), 1.0);
    assert_eq!(normalize_score(5.0, 5.0, 5.0), 0.0);
}

#[test]
fn test_order_book_imbalance() {
    assert_eq!(normalize_order_book_imbalance(300.0, 100.0), 0.5);
    assert_eq!(normalize_order_book_imbalance(100.0, 300.0), -0.5);
    assert_eq!(normalize_order_book_imbalance(0.0, 0.0), 0.0);
}

#[test]
fn test_put_call_ratio() {
    assert_eq!(normalize_put_call_ratio(1.0), 0.0);
    assert!(normalize_put_call_ratio(3.0) < 0.0);
    assert!(normalize_put_call_ratio(0.5) > 0.0);
    assert_eq!(normalize_put_call_ratio(0.0), 1.0);
    assert_eq!(normalize_put_call_ratio(-1.0), 0.0);
}

#[test]
fn test_fear_greed_to_sentiment() {
    assert_eq!(fear_greed_to_sentiment(50.0), 0.0);
    assert_eq!(fear_greed_to_sentiment(100.0), 1.0);
    assert_eq!(fear_greed_to_sentiment(25.0), -0.5);
}
