//! Integration tests for multi-timeframe detection and reconciliation.
//!
//! The fixture is one hourly series whose closes follow a double top drawn in
//! days: rises to day 10, dips to day 20, retests at day 30, falls to day 40.
//! Aggregated to 4h and 1d, the same formation shows up on every timeframe.

use chartwise::prelude::*;
use chrono::{DateTime, Duration, TimeZone, Utc};

// ============================================================
// TEST HELPERS
// ============================================================

const DAYS: usize = 40;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Close at `day` (fractional) on the double-top path
fn path(day: f64) -> f64 {
    let vertices = [(0.0, 100.0), (10.0, 120.0), (20.0, 108.0), (30.0, 120.0), (40.0, 100.0)];
    for w in vertices.windows(2) {
        let ((d0, p0), (d1, p1)) = (w[0], w[1]);
        if day <= d1 {
            return p0 + (p1 - p0) * (day - d0) / (d1 - d0);
        }
    }
    vertices[vertices.len() - 1].1
}

fn hourly_double_top() -> Vec<Bar> {
    (0..DAYS * 24)
        .map(|h| {
            let c = path(h as f64 / 24.0);
            Bar::new(
                t0() + Duration::hours(h as i64),
                c,
                c + 0.5,
                c - 0.5,
                c,
                100.0,
                Timeframe::H1,
            )
        })
        .collect()
}

fn config() -> DetectionConfig {
    DetectionConfig {
        timeframes: vec![Timeframe::H1, Timeframe::H4, Timeframe::D1],
        baseline_timeframe: Timeframe::D1,
        min_pattern_length: 15,
        peak_order: 3,
        ..DetectionConfig::default()
    }
}

fn detector(config: DetectionConfig) -> MultiTimeframeDetector {
    chartwise::logging::init_logging();
    let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
    MultiTimeframeDetector::new(engine, config).unwrap()
}

fn double_top(patterns: &[MultiTimeframePattern]) -> &MultiTimeframePattern {
    patterns
        .iter()
        .find(|p| p.pattern_name() == "Double Top")
        .expect("double top reconciled")
}

// ============================================================
// PARAMETER SCALING
// ============================================================

#[test]
fn test_params_cover_same_duration() {
    let d = detector(config());
    assert_eq!(d.params_for(Timeframe::H1).min_pattern_length, 360);
    assert_eq!(d.params_for(Timeframe::H4).min_pattern_length, 90);
    assert_eq!(d.params_for(Timeframe::D1).min_pattern_length, 15);
    assert_eq!(d.params_for(Timeframe::W1).min_pattern_length, 10);

    let h1 = d.params_for(Timeframe::H1).peak_order;
    let h4 = d.params_for(Timeframe::H4).peak_order;
    let d1 = d.params_for(Timeframe::D1).peak_order;
    assert!(h1 >= h4 && h4 >= d1);
    assert_eq!(d1, 3);
}

// ============================================================
// RECONCILIATION
// ============================================================

#[test]
fn test_double_top_confirmed_on_three_timeframes() {
    let patterns = detector(config())
        .detect_multi_timeframe(&hourly_double_top())
        .unwrap();
    let dt = double_top(&patterns);

    assert_eq!(dt.confirmation_level, 3);
    assert!(dt.is_confirmed_on(Timeframe::H1));
    assert!(dt.is_confirmed_on(Timeframe::H4));
    assert!(dt.is_confirmed_on(Timeframe::D1));
    assert!(dt.alignment_score.is_some_and(|a| (0.0..=1.0).contains(&a)));
    assert_eq!(dt.pattern.signal, Direction::Bearish);
    // 0.75 x 1.8 already exceeds the cap
    assert_eq!(dt.adjusted_confidence, 0.95);
    assert!((dt.volume_ratio - 1.0).abs() < 1e-9);
    assert_eq!(dt.volume_quality, VolumeQuality::Good);
}

#[test]
fn test_confidence_never_exceeds_cap() {
    let patterns = detector(config())
        .detect_multi_timeframe(&hourly_double_top())
        .unwrap();
    assert!(!patterns.is_empty());
    for p in &patterns {
        assert!(p.adjusted_confidence <= 0.95, "{}", p.pattern_name());
        assert!((1..=3).contains(&p.confirmation_level));
        assert_eq!(p.detected_on_timeframes.len(), p.confirmation_level);
        assert_eq!(p.alignment_score.is_some(), p.confirmation_level > 1);
    }
    assert!(patterns
        .windows(2)
        .all(|w| w[0].adjusted_confidence >= w[1].adjusted_confidence));
}

#[test]
fn test_single_timeframe_request() {
    let cfg = DetectionConfig {
        timeframes: vec![Timeframe::D1],
        ..config()
    };
    let patterns = detector(cfg)
        .detect_multi_timeframe(&hourly_double_top())
        .unwrap();
    let dt = double_top(&patterns);

    assert_eq!(dt.confirmation_level, 1);
    assert_eq!(dt.alignment_score, None);
    // Good volume lifts the single-timeframe confidence by 15%
    assert!((dt.adjusted_confidence - 0.75 * 1.15).abs() < 1e-9);
}

#[test]
fn test_more_confirmations_never_lower_confidence() {
    let s = ScoringConfig::default();
    let mut last = 0.0;
    for level in 1..=3 {
        let c = adjusted_confidence(0.6, level, 0.5, VolumeQuality::Average, &s);
        assert!(c >= last);
        last = c;
    }
}

#[test]
fn test_excluded_name_never_reported() {
    let cfg = DetectionConfig {
        exclude_pattern_names: vec!["double top".into()],
        ..config()
    };
    let patterns = detector(cfg)
        .detect_multi_timeframe(&hourly_double_top())
        .unwrap();
    assert!(patterns.iter().all(|p| p.pattern_name() != "Double Top"));
}

/// Two nested spans over the whole series, both "Nested Span"
struct NestedSpans;

impl PatternRecognizer for NestedSpans {
    fn id(&self) -> PatternId {
        PatternId("Nested Span")
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.9
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], _structure: &PriceStructure) -> Vec<PatternCandidate> {
        let last = bars.len() - 1;
        let close = bars[last].close();
        [0, 5]
            .into_iter()
            .map(|start| PatternCandidate {
                name: PatternId("Nested Span"),
                signal: Direction::Neutral,
                start_index: start,
                end_index: last,
                trendlines: Vec::new(),
                key_points: Vec::new(),
                breakout_price: close,
                target_price: close,
                stop_loss_price: close,
            })
            .collect()
    }
}

#[test]
fn test_overlap_threshold_from_config_reaches_engine() {
    let nested = |overlap_threshold| {
        let cfg = DetectionConfig {
            timeframes: vec![Timeframe::D1],
            overlap_threshold,
            ..config()
        };
        let engine = EngineBuilder::new().add_custom(NestedSpans).build().unwrap();
        MultiTimeframeDetector::new(engine, cfg)
            .unwrap()
            .detect_multi_timeframe(&hourly_double_top())
            .unwrap()
    };

    // same timeframe, so matching never merges them
    assert_eq!(nested(None).len(), 2);
    let resolved = nested(Some(0.3));
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].pattern_name(), "Nested Span");
}

#[test]
fn test_too_short_timeframe_is_skipped() {
    // 8 days: the daily series is too short but 4h still has enough bars
    let cfg = DetectionConfig {
        timeframes: vec![Timeframe::H4, Timeframe::D1],
        min_pattern_length: 5,
        ..config()
    };
    let bars: Vec<Bar> = hourly_double_top().into_iter().take(24 * 8).collect();
    let d = detector(cfg);
    assert!(d.params_for(Timeframe::D1).min_pattern_length > 8);
    let result = d.detect_multi_timeframe(&bars);
    assert!(result.is_ok());
    for p in result.unwrap() {
        assert!(!p.is_confirmed_on(Timeframe::D1));
    }
}

#[test]
fn test_every_timeframe_failing_is_an_error() {
    let bars: Vec<Bar> = hourly_double_top().into_iter().take(24).collect();
    assert!(matches!(
        detector(config()).detect_multi_timeframe(&bars),
        Err(PatternError::InsufficientData { .. })
    ));
    assert!(detector(config()).detect_multi_timeframe(&[]).is_err());
}

// ============================================================
// CONFIGURATION
// ============================================================

#[test]
fn test_invalid_config_rejected_up_front() {
    let engine = || EngineBuilder::new().with_all_defaults().build().unwrap();
    let empty = DetectionConfig {
        timeframes: Vec::new(),
        ..config()
    };
    assert!(matches!(
        MultiTimeframeDetector::new(engine(), empty),
        Err(PatternError::InvalidConfig(_))
    ));
    let bad_r2 = DetectionConfig {
        min_r_squared: 1.5,
        ..config()
    };
    assert!(MultiTimeframeDetector::new(engine(), bad_r2).is_err());
    let zero_timeout = DetectionConfig {
        timeout_ms: Some(0),
        ..config()
    };
    assert!(MultiTimeframeDetector::new(engine(), zero_timeout).is_err());
}

#[test]
fn test_generous_timeout_succeeds() {
    let cfg = DetectionConfig {
        timeout_ms: Some(600_000),
        ..config()
    };
    assert!(detector(cfg)
        .detect_multi_timeframe(&hourly_double_top())
        .is_ok());
}

#[test]
fn test_config_from_json() {
    let cfg: DetectionConfig = serde_json::from_str(
        r#"{"timeframes": ["1h", "1d"], "min_pattern_length": 15, "exclude_pattern_names": ["Pennant"]}"#,
    )
    .unwrap();
    assert_eq!(cfg.timeframes, vec![Timeframe::H1, Timeframe::D1]);
    assert_eq!(cfg.peak_order, DetectionConfig::default().peak_order);
    assert!(cfg.is_excluded("pennant"));
    assert!(cfg.validate().is_ok());
}

// ============================================================
// SOURCE AND SINK
// ============================================================

#[test]
fn test_source_fallback_and_missing_timeframe() {
    let hourly = hourly_double_top();
    let range = TimeRange::new(t0(), t0() + Duration::days(DAYS as i64));
    // daily bars exist only outside the requested range
    let later = t0() + Duration::days(400);
    let stray: Vec<Bar> = (0..3)
        .map(|i| {
            Bar::new(
                later + Duration::days(i),
                100.0,
                101.0,
                99.0,
                100.0,
                1.0,
                Timeframe::D1,
            )
        })
        .collect();
    let source = MemoryBarSource::new()
        .with_series("XYZ", hourly)
        .unwrap()
        .with_series("XYZ", stray)
        .unwrap();

    let patterns = detector(config())
        .detect_from_source(&source, "XYZ", &range)
        .unwrap();
    let dt = double_top(&patterns);
    assert!(dt.is_confirmed_on(Timeframe::H1));
    assert!(dt.is_confirmed_on(Timeframe::H4));
    assert!(!dt.is_confirmed_on(Timeframe::D1));
    assert_eq!(dt.confirmation_level, 2);
}

#[test]
fn test_unknown_instrument_fails() {
    let source = MemoryBarSource::new();
    let range = TimeRange::new(t0(), t0() + Duration::days(1));
    assert!(matches!(
        detector(config()).detect_from_source(&source, "NONE", &range),
        Err(PatternError::Source(_))
    ));
}

#[test]
fn test_publish_hands_patterns_and_metadata_to_sink() {
    let source = MemoryBarSource::new()
        .with_series("XYZ", hourly_double_top())
        .unwrap();
    let range = TimeRange::new(t0(), t0() + Duration::days(DAYS as i64));
    let mut sink = MemorySink::new();

    let d = detector(config());
    let patterns = d.detect_and_publish(&source, "XYZ", &range, &mut sink).unwrap();

    assert_eq!(sink.runs.len(), 1);
    assert_eq!(sink.total_patterns(), patterns.len());
    let (meta, published) = &sink.runs[0];
    assert_eq!(meta, &d.run_metadata());
    assert_eq!(meta.requested_timeframes, config().timeframes);
    assert_eq!(published.len(), patterns.len());
}

#[test]
fn test_output_serializes_flat() {
    let patterns = detector(config())
        .detect_multi_timeframe(&hourly_double_top())
        .unwrap();
    let json = serde_json::to_value(double_top(&patterns)).unwrap();
    assert_eq!(json["pattern_name"], "Double Top");
    assert_eq!(json["signal"], "bearish");
    assert_eq!(json["confirmation_level"], 3);
    assert_eq!(json["detected_on_timeframes"][0], "1h");
}
