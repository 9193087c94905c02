//! Integration tests for the single-timeframe recognizers and engine.
//!
//! Price paths are piecewise linear between hand-placed vertices, so every
//! vertex is an exact extremum and every other bar is not.

use std::collections::HashMap;

use chartwise::prelude::*;
use chrono::{Duration, TimeZone, Utc};

// ============================================================
// TEST HELPERS
// ============================================================

/// Closes interpolated linearly between `(index, price)` vertices
fn zigzag(vertices: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = Vec::new();
    for w in vertices.windows(2) {
        let ((i0, p0), (i1, p1)) = (w[0], w[1]);
        for i in i0..i1 {
            let t = (i - i0) as f64 / (i1 - i0) as f64;
            closes.push(p0 + (p1 - p0) * t);
        }
    }
    if let Some(&(_, last)) = vertices.last() {
        closes.push(last);
    }
    closes
}

fn daily(closes: &[f64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            Bar::new(
                start + Duration::days(i as i64),
                c,
                c + 0.5,
                c - 0.5,
                c,
                1_000.0,
                Timeframe::D1,
            )
        })
        .collect()
}

fn params() -> DetectParams {
    DetectParams {
        timeframe: Timeframe::D1,
        min_pattern_length: 20,
        peak_order: 3,
        min_r_squared: 0.7,
        min_confidence: 0.5,
    }
}

fn engine() -> PatternEngine {
    EngineBuilder::new().with_all_defaults().build().unwrap()
}

fn find<'a>(patterns: &'a [DetectedPattern], name: &str) -> Option<&'a DetectedPattern> {
    patterns.iter().find(|p| p.pattern_name.as_str() == name)
}

fn double_top_path() -> Vec<f64> {
    zigzag(&[(0, 100.0), (10, 120.0), (20, 108.0), (30, 120.0), (40, 100.0)])
}

fn head_and_shoulders_path() -> Vec<f64> {
    zigzag(&[
        (0, 100.0),
        (8, 110.0),
        (14, 104.0),
        (22, 118.0),
        (30, 104.0),
        (36, 110.0),
        (44, 98.0),
    ])
}

fn ascending_triangle_path() -> Vec<f64> {
    zigzag(&[
        (0, 95.0),
        (6, 110.0),
        (12, 100.0),
        (18, 110.0),
        (24, 104.0),
        (30, 110.0),
        (36, 107.0),
        (44, 109.5),
    ])
}

// ============================================================
// ENGINE
// ============================================================

#[test]
fn test_engine_builder() {
    assert_eq!(engine().recognizer_count(), 12);
    let reversal = EngineBuilder::new().with_reversal_defaults().build().unwrap();
    assert_eq!(reversal.recognizer_count(), 8);
    let continuation = EngineBuilder::new()
        .with_continuation_defaults()
        .build()
        .unwrap();
    assert_eq!(continuation.recognizer_count(), 4);
}

#[test]
fn test_add_checked_rejects_bad_config() {
    let bad = CupAndHandleRecognizer {
        min_depth: Ratio::new(0.6).unwrap(),
        max_depth: Ratio::new(0.3).unwrap(),
        ..CupAndHandleRecognizer::default()
    };
    assert!(EngineBuilder::new()
        .add_checked(BuiltinRecognizer::CupAndHandle(bad))
        .is_err());
}

#[test]
fn test_flat_series_yields_nothing() {
    let bars = daily(&[100.0; 60]);
    let patterns = engine().detect(&bars, &params()).unwrap();
    assert!(patterns.is_empty());
}

#[test]
fn test_validate_data_reports_bad_bar() {
    let mut bars = daily(&double_top_path());
    bars[5].low = bars[5].high + 1.0;
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .validate_data(true)
        .build()
        .unwrap();
    assert!(matches!(
        engine.detect(&bars, &params()),
        Err(PatternError::InvalidOHLCV { index: 5, .. })
    ));
}

// ============================================================
// REVERSAL PATTERNS
// ============================================================

#[test]
fn test_double_top() {
    let bars = daily(&double_top_path());
    let patterns = engine().detect(&bars, &params()).unwrap();
    let dt = find(&patterns, "Double Top").expect("double top");

    assert_eq!(dt.signal, Direction::Bearish);
    assert_eq!(dt.pattern_type, PatternType::Reversal);
    assert_eq!((dt.start_index, dt.end_index), (10, 30));
    assert_eq!(dt.start_time, bars[10].timestamp);
    assert!((dt.breakout_price - 107.5).abs() < 1e-9);
    assert!((dt.target_price - 94.5).abs() < 1e-9);
    assert!(dt.stop_loss_price > 120.5);
    assert_eq!(dt.base_confidence, 0.75);
    assert!(dt.quality_score > 0.5 && dt.quality_score <= 1.0);
    assert!(dt.trendlines.iter().all(|t| t.fit_quality >= 0.7));
}

#[test]
fn test_double_bottom() {
    let closes: Vec<f64> = double_top_path().iter().map(|c| 220.0 - c).collect();
    let bars = daily(&closes);
    let patterns = engine().detect(&bars, &params()).unwrap();
    let db = find(&patterns, "Double Bottom").expect("double bottom");

    assert_eq!(db.signal, Direction::Bullish);
    assert!((db.breakout_price - 112.5).abs() < 1e-9);
    assert!(db.target_price > db.breakout_price);
    assert!(db.stop_loss_price < 99.5);
}

#[test]
fn test_double_top_too_short_is_ignored() {
    let bars = daily(&double_top_path());
    let long = DetectParams {
        min_pattern_length: 30,
        ..params()
    };
    let patterns = engine().detect(&bars, &long).unwrap();
    assert!(find(&patterns, "Double Top").is_none());
}

#[test]
fn test_head_and_shoulders() {
    let bars = daily(&head_and_shoulders_path());
    let patterns = engine().detect(&bars, &params()).unwrap();
    let hs = find(&patterns, "Head and Shoulders").expect("head and shoulders");

    assert_eq!(hs.signal, Direction::Bearish);
    assert_eq!((hs.start_index, hs.end_index), (8, 36));
    assert_eq!(hs.key_points.len(), 5);
    assert!((hs.breakout_price - 103.5).abs() < 1e-9);
    assert!((hs.target_price - 88.5).abs() < 1e-9);
    assert_eq!(hs.base_confidence, 0.85);
}

#[test]
fn test_inverse_head_and_shoulders() {
    let closes: Vec<f64> = head_and_shoulders_path()
        .iter()
        .map(|c| 220.0 - c)
        .collect();
    let bars = daily(&closes);
    let patterns = engine().detect(&bars, &params()).unwrap();
    let ihs = find(&patterns, "Inverse Head and Shoulders").expect("inverse");

    assert_eq!(ihs.signal, Direction::Bullish);
    assert!(ihs.target_price > ihs.breakout_price);
    assert!(ihs.stop_loss_price < ihs.breakout_price);
}

// ============================================================
// CONTINUATION PATTERNS
// ============================================================

#[test]
fn test_ascending_triangle() {
    let bars = daily(&ascending_triangle_path());
    let patterns = engine().detect(&bars, &params()).unwrap();
    let tri = find(&patterns, "Ascending Triangle").expect("ascending triangle");

    assert_eq!(tri.signal, Direction::Bullish);
    assert_eq!(tri.pattern_type, PatternType::Continuation);
    assert_eq!((tri.start_index, tri.end_index), (6, 36));
    assert!((tri.breakout_price - 110.5).abs() < 1e-9);
    assert!(tri.target_price > tri.breakout_price);
    assert_eq!(tri.trendlines[0].slope, 0.0);
}

// ============================================================
// FILTERS
// ============================================================

#[test]
fn test_exclude_by_family_and_emitted_name() {
    let bars = daily(&head_and_shoulders_path());
    let by_family = EngineBuilder::new()
        .with_all_defaults()
        .exclude(["head and shoulders"])
        .build()
        .unwrap();
    let patterns = by_family.detect(&bars, &params()).unwrap();
    assert!(find(&patterns, "Head and Shoulders").is_none());

    let bars = daily(&double_top_path());
    let by_name = EngineBuilder::new()
        .with_all_defaults()
        .exclude(["Double Top"])
        .build()
        .unwrap();
    let patterns = by_name.detect(&bars, &params()).unwrap();
    assert!(find(&patterns, "Double Top").is_none());
}

#[test]
fn test_only_patterns() {
    let bars = daily(&double_top_path());
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .only_patterns([PatternId("Head and Shoulders")])
        .build()
        .unwrap();
    assert!(engine.detect(&bars, &params()).unwrap().is_empty());
}

#[test]
fn test_min_confidence_filters_everything() {
    let bars = daily(&double_top_path());
    let strict = DetectParams {
        min_confidence: 1.0,
        ..params()
    };
    assert!(engine().detect(&bars, &strict).unwrap().is_empty());
}

#[test]
fn test_overlap_removal_keeps_best() {
    let bars = daily(&double_top_path());
    let all = engine().detect(&bars, &params()).unwrap();
    let engine = EngineBuilder::new()
        .with_all_defaults()
        .overlap_threshold(0.5)
        .build()
        .unwrap();
    let resolved = engine.detect(&bars, &params()).unwrap();

    assert!(!resolved.is_empty());
    assert!(resolved.len() <= all.len());
    let best = all
        .iter()
        .map(|p| p.quality_score)
        .fold(f64::NEG_INFINITY, f64::max);
    assert!(resolved.iter().any(|p| p.quality_score == best));
}

// ============================================================
// CUSTOM RECOGNIZERS
// ============================================================

/// Reports the whole series as one neutral formation
struct WholeSeries;

impl PatternRecognizer for WholeSeries {
    fn id(&self) -> PatternId {
        PatternId("Whole Series")
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.9
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], _structure: &PriceStructure) -> Vec<PatternCandidate> {
        let last = bars.len() - 1;
        vec![PatternCandidate {
            name: PatternId("Whole Series"),
            signal: Direction::Neutral,
            start_index: 0,
            end_index: last,
            trendlines: Vec::new(),
            key_points: Vec::new(),
            breakout_price: bars[last].close(),
            target_price: bars[last].close(),
            stop_loss_price: bars[last].close(),
        }]
    }
}

#[test]
fn test_custom_recognizer_slow_path() {
    let bars = daily(&[100.0; 30]);
    let engine = EngineBuilder::new().add_custom(WholeSeries).build().unwrap();
    let patterns = engine.detect(&bars, &params()).unwrap();

    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern_name, PatternId("Whole Series"));
    assert_eq!(patterns[0].end_index, 29);
}

// ============================================================
// PARAMETERS
// ============================================================

#[test]
fn test_param_meta_covers_with_params() {
    fn check<R: ParameterizedRecognizer>() {
        let defaults: HashMap<&str, f64> =
            R::param_meta().iter().map(|m| (m.name, m.default)).collect();
        assert!(R::with_checked_params(&defaults).is_ok(), "{}", R::pattern_id_str());
        for m in R::param_meta() {
            assert!(m.validate(m.default).is_ok(), "{} {}", R::pattern_id_str(), m.name);
        }
    }
    check::<HeadAndShouldersRecognizer>();
    check::<DoubleTopRecognizer>();
    check::<DoubleBottomRecognizer>();
    check::<TripleTopRecognizer>();
    check::<TripleBottomRecognizer>();
    check::<RoundingBottomRecognizer>();
    check::<RisingWedgeRecognizer>();
    check::<FallingWedgeRecognizer>();
    check::<TriangleRecognizer>();
    check::<FlagRecognizer>();
    check::<PennantRecognizer>();
    check::<CupAndHandleRecognizer>();
}

#[test]
fn test_with_params_unknown_name_rejected() {
    let mut params = HashMap::new();
    params.insert("no_such_param", 0.1);
    assert!(TriangleRecognizer::with_checked_params(&params).is_err());
    assert!(TriangleRecognizer::with_params(&params).is_ok());
}

#[test]
fn test_detect_parallel() {
    let a = daily(&double_top_path());
    let b = daily(&head_and_shoulders_path());
    let short = daily(&[100.0; 5]);
    let instruments: Vec<(&str, &[Bar])> = vec![("A", a.as_slice()), ("B", b.as_slice()), ("C", short.as_slice())];

    let (ok, errors) = detect_parallel(&engine(), instruments, &params());
    assert_eq!(ok.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].symbol, "C");
}
