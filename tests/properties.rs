//! Property tests over aggregation, fitting, scaling and confidence.

use chartwise::prelude::*;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

// ============================================================
// TEST HELPERS
// ============================================================

/// Valid hourly bars from (close, spread, volume) triples
fn hourly(rows: &[(f64, f64, u32)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    rows.iter()
        .enumerate()
        .map(|(i, &(c, spread, v))| {
            Bar::new(
                start + Duration::hours(i as i64),
                c,
                c + spread,
                c - spread,
                c,
                f64::from(v),
                Timeframe::H1,
            )
        })
        .collect()
}

fn rows() -> impl Strategy<Value = Vec<(f64, f64, u32)>> {
    proptest::collection::vec((50.0f64..150.0, 0.0f64..5.0, 0u32..10_000), 1..200)
}

fn quality() -> impl Strategy<Value = VolumeQuality> {
    prop_oneof![
        Just(VolumeQuality::Weak),
        Just(VolumeQuality::Average),
        Just(VolumeQuality::Good),
        Just(VolumeQuality::Excellent),
    ]
}

// ============================================================
// PROPERTIES
// ============================================================

proptest! {
    #[test]
    fn aggregation_conserves_volume(rows in rows()) {
        let bars = hourly(&rows);
        let agg = BarAggregator::new().aggregate_with_tail(&bars, Timeframe::H4).unwrap();
        let base: f64 = bars.iter().map(|b| b.volume).sum();
        // integer volumes sum exactly
        prop_assert_eq!(agg.total_volume(), base);
    }

    #[test]
    fn aggregated_bars_bound_their_bucket(rows in rows()) {
        let bars = hourly(&rows);
        let out = BarAggregator::new().aggregate(&bars, Timeframe::H4).unwrap();
        for agg in &out {
            let bucket: Vec<&Bar> = bars
                .iter()
                .filter(|b| Timeframe::H4.bucket_start(b.timestamp) == agg.timestamp)
                .collect();
            prop_assert!(!bucket.is_empty());
            let high = bucket.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let low = bucket.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            prop_assert_eq!(agg.high, high);
            prop_assert_eq!(agg.low, low);
            prop_assert_eq!(agg.open, bucket[0].open);
            prop_assert_eq!(agg.close, bucket[bucket.len() - 1].close);
        }
        prop_assert!(out.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn extrema_respect_order(rows in rows(), order in 1usize..6) {
        let bars = hourly(&rows);
        for p in find_extrema(&bars, order) {
            prop_assert!(p.index >= order && p.index + order < bars.len());
            let window = &bars[p.index - order..=p.index + order];
            if p.is_peak() {
                prop_assert!(window.iter().all(|b| b.high <= p.price));
            } else {
                prop_assert!(window.iter().all(|b| b.low >= p.price));
            }
        }
    }

    #[test]
    fn regression_fit_in_unit_range(ys in proptest::collection::vec(-1e3f64..1e3, 0..50)) {
        let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
        let reg = linear_regression(&xs, &ys);
        prop_assert!((0.0..=1.0).contains(&reg.r_squared));
        if ys.len() < 2 {
            prop_assert_eq!(reg.r_squared, 0.0);
        }
    }

    #[test]
    fn scaled_length_never_below_floor(
        length in 1usize..500,
        floor in 1usize..50,
        tf in prop_oneof![
            Just(Timeframe::M15),
            Just(Timeframe::H1),
            Just(Timeframe::H4),
            Just(Timeframe::D1),
            Just(Timeframe::W1),
        ],
    ) {
        let scaled = scale_min_pattern_length(length, tf, Timeframe::D1, floor);
        let exact = ((length as f64 * tf.bars_per_day()).round() as usize).max(floor);
        prop_assert!(scaled >= floor);
        prop_assert_eq!(scaled, exact);
        prop_assert!(scale_peak_order(length, tf, Timeframe::D1, &ScoringConfig::default()) >= 1);
        prop_assert_eq!(scale_peak_order(length, Timeframe::D1, Timeframe::D1, &ScoringConfig::default()), length);
    }

    #[test]
    fn adjusted_confidence_capped_and_monotonic(
        base in 0.0f64..=1.0,
        alignment in 0.0f64..=1.0,
        volume in quality(),
    ) {
        let s = ScoringConfig::default();
        let levels: Vec<f64> = (1..=3)
            .map(|level| adjusted_confidence(base, level, alignment, volume, &s))
            .collect();
        prop_assert!(levels.iter().all(|c| *c <= s.confidence_cap));
        prop_assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }
}
