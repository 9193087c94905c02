//! Multi-timeframe reconciliation.
//!
//! One request runs the [`PatternEngine`] once per requested timeframe, with
//! `min_pattern_length` and `peak_order` rescaled so every timeframe looks at
//! the same wall-clock duration. Per-timeframe results are joined, then the
//! same formation seen on several timeframes is collapsed into one
//! [`MultiTimeframePattern`] whose confidence is boosted by the number of
//! confirming timeframes, their agreement and the volume behaviour.

use std::{borrow::Cow, collections::BTreeSet, time::Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    aggregate::BarAggregator,
    config::{DetectionConfig, ScoringConfig},
    detector::{DetectParams, PatternEngine},
    source::{BarSource, PatternSink, RunMetadata},
    volume::{VolumeAnalyzer, VolumeQuality, VolumeScore, VwapPosition},
    Bar, DetectedPattern, PatternError, Result, TimeRange, Timeframe,
};

// ============================================================
// PARAMETER SCALING
// ============================================================

/// `min_pattern_length` expressed in bars of `timeframe`.
///
/// `length` counts bars of `baseline`; the result covers the same wall-clock
/// duration, never below `floor`.
pub fn scale_min_pattern_length(
    length: usize,
    timeframe: Timeframe,
    baseline: Timeframe,
    floor: usize,
) -> usize {
    let factor = timeframe.bars_per_day() / baseline.bars_per_day();
    ((length as f64 * factor).round() as usize).max(floor)
}

/// `peak_order` for `timeframe`: scaled sub-linearly with bar density.
///
/// `order` counts bars of `baseline`, so the baseline series keeps it unchanged.
pub fn scale_peak_order(
    order: usize,
    timeframe: Timeframe,
    baseline: Timeframe,
    scoring: &ScoringConfig,
) -> usize {
    let factors = &scoring.peak_order_factors;
    let factor = factors.factor(timeframe) / factors.factor(baseline);
    ((order as f64 * factor).round() as usize).max(1)
}

/// `base × timeframe_multiplier × (1 + alignment × coefficient) × volume_multiplier`,
/// capped at `scoring.confidence_cap`
pub fn adjusted_confidence(
    base_confidence: f64,
    confirmation_level: usize,
    alignment_score: f64,
    volume_quality: VolumeQuality,
    scoring: &ScoringConfig,
) -> f64 {
    let raw = base_confidence
        * scoring.timeframe_multiplier(confirmation_level)
        * (1.0 + alignment_score * scoring.alignment_coefficient)
        * scoring.volume_multipliers.for_quality(volume_quality);
    raw.min(scoring.confidence_cap)
}

// ============================================================
// OUTPUT
// ============================================================

/// A formation reconciled across timeframes.
///
/// Geometry is that of the highest-quality instance; the other fields describe
/// the whole matched group.
#[derive(Debug, Clone, Serialize)]
pub struct MultiTimeframePattern {
    #[serde(flatten)]
    pub pattern: DetectedPattern,
    pub detected_on_timeframes: BTreeSet<Timeframe>,
    /// Confirming timeframes, capped at 3
    pub confirmation_level: usize,
    /// `None` when confirmed on a single timeframe
    pub alignment_score: Option<f64>,
    pub volume_score: f64,
    pub volume_quality: VolumeQuality,
    pub volume_ratio: f64,
    pub vwap_position: Option<VwapPosition>,
    pub volume: VolumeScore,
    pub adjusted_confidence: f64,
}

impl MultiTimeframePattern {
    pub fn pattern_name(&self) -> &'static str {
        self.pattern.pattern_name.as_str()
    }

    pub fn is_confirmed_on(&self, timeframe: Timeframe) -> bool {
        self.detected_on_timeframes.contains(&timeframe)
    }
}

// ============================================================
// ORCHESTRATOR
// ============================================================

/// Bars of one requested timeframe, or why they are unavailable
struct Series<'a> {
    timeframe: Timeframe,
    bars: Result<Cow<'a, [Bar]>>,
}

/// Successful single-timeframe run
struct TimeframeRun<'a> {
    bars: Cow<'a, [Bar]>,
    patterns: Vec<DetectedPattern>,
}

/// Runs and reconciles detection across timeframes
pub struct MultiTimeframeDetector {
    engine: PatternEngine,
    config: DetectionConfig,
    aggregator: BarAggregator,
}

impl MultiTimeframeDetector {
    /// Fails with [`PatternError::InvalidConfig`]/[`PatternError::OutOfRange`]
    /// before any computation when `config` is invalid. The engine inherits
    /// `config.exclude_pattern_names` and `config.overlap_threshold`.
    pub fn new(engine: PatternEngine, config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        let engine = engine
            .with_excluded(&config.exclude_pattern_names)
            .with_overlap_threshold(config.overlap_threshold);
        Ok(Self {
            engine,
            config,
            aggregator: BarAggregator::new(),
        })
    }

    /// Replace the engine's scoring constants
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Result<Self> {
        self.engine = self.engine.with_scoring(scoring)?;
        Ok(self)
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn scoring(&self) -> &ScoringConfig {
        self.engine.scoring()
    }

    /// Detection parameters for one timeframe, scaled from the baseline
    pub fn params_for(&self, timeframe: Timeframe) -> DetectParams {
        let scoring = self.engine.scoring();
        DetectParams {
            min_pattern_length: scale_min_pattern_length(
                self.config.min_pattern_length,
                timeframe,
                self.config.baseline_timeframe,
                scoring.min_scaled_pattern_length,
            ),
            peak_order: scale_peak_order(
                self.config.peak_order,
                timeframe,
                self.config.baseline_timeframe,
                scoring,
            ),
            ..DetectParams::from_config(&self.config, timeframe)
        }
    }

    pub fn run_metadata(&self) -> RunMetadata {
        RunMetadata::from(&self.config)
    }

    /// Detect on every requested timeframe derived from one base series.
    ///
    /// Timeframes finer than the base series cannot be derived and are skipped.
    /// A timeframe without enough bars is skipped; the request fails only when
    /// no timeframe could be analyzed.
    pub fn detect_multi_timeframe(&self, base_bars: &[Bar]) -> Result<Vec<MultiTimeframePattern>> {
        self.detect_since(base_bars, Instant::now())
    }

    /// Fetch each requested timeframe from `source` and detect across them.
    ///
    /// A timeframe the source does not store is built from the nearest finer
    /// stored timeframe.
    pub fn detect_from_source<S: BarSource + ?Sized>(
        &self,
        source: &S,
        instrument: &str,
        range: &TimeRange,
    ) -> Result<Vec<MultiTimeframePattern>> {
        let started = Instant::now();
        let series: Vec<Series> = self
            .config
            .timeframes
            .iter()
            .map(|&tf| Series {
                timeframe: tf,
                bars: self.load_series(source, instrument, tf, range).map(Cow::Owned),
            })
            .collect();
        self.reconcile(series, started)
    }

    /// [`Self::detect_from_source`], then hand the result to `sink`
    pub fn detect_and_publish<S: BarSource + ?Sized, K: PatternSink + ?Sized>(
        &self,
        source: &S,
        instrument: &str,
        range: &TimeRange,
        sink: &mut K,
    ) -> Result<Vec<MultiTimeframePattern>> {
        let patterns = self.detect_from_source(source, instrument, range)?;
        sink.publish(&patterns, &self.run_metadata())?;
        info!(instrument, patterns = patterns.len(), "patterns published");
        Ok(patterns)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    /// [`Self::detect_multi_timeframe`] with the deadline counted from `started`
    fn detect_since(&self, base_bars: &[Bar], started: Instant) -> Result<Vec<MultiTimeframePattern>> {
        let first = base_bars
            .first()
            .ok_or(PatternError::InsufficientData { need: 1, got: 0 })?;
        let base_tf = first.timeframe;

        let series: Vec<Series> = self
            .config
            .timeframes
            .iter()
            .copied()
            .filter(|tf| {
                if *tf < base_tf {
                    warn!(timeframe = %tf, base = %base_tf, "timeframe finer than base series, skipped");
                    false
                } else {
                    true
                }
            })
            .map(|tf| Series {
                timeframe: tf,
                bars: if tf == base_tf {
                    Ok(Cow::Borrowed(base_bars))
                } else {
                    self.aggregator.aggregate(base_bars, tf).map(Cow::Owned)
                },
            })
            .collect();

        if series.is_empty() {
            return Err(PatternError::InvalidConfig(format!(
                "no requested timeframe can be derived from {base_tf} bars"
            )));
        }
        self.reconcile(series, started)
    }

    fn load_series<S: BarSource + ?Sized>(
        &self,
        source: &S,
        instrument: &str,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<Vec<Bar>> {
        if let Some(bars) = source.fetch_bars(instrument, timeframe, range)? {
            return Ok(bars);
        }
        for finer in timeframe.finer() {
            if let Some(bars) = source.fetch_bars(instrument, finer, range)? {
                debug!(timeframe = %timeframe, from = %finer, "aggregating from finer stored series");
                if bars.is_empty() {
                    return Ok(bars);
                }
                return self.aggregator.aggregate_range(&bars, timeframe, range);
            }
        }
        Err(PatternError::Source(format!(
            "no stored series at or below {timeframe} for {instrument}"
        )))
    }

    fn reconcile(&self, series: Vec<Series>, started: Instant) -> Result<Vec<MultiTimeframePattern>> {
        // phase 1: independent per-timeframe detection, joined before matching
        let outcomes: Vec<(Timeframe, Result<TimeframeRun>)> = series
            .into_par_iter()
            .map(|s| {
                let timeframe = s.timeframe;
                let run = s.bars.and_then(|bars| {
                    let params = self.params_for(timeframe);
                    let patterns = self.engine.detect(&bars[..], &params)?;
                    Ok(TimeframeRun { bars, patterns })
                });
                (timeframe, run)
            })
            .collect();
        self.check_deadline(started)?;

        let mut runs = Vec::new();
        let mut first_error = None;
        for (timeframe, outcome) in outcomes {
            match outcome {
                Ok(run) => {
                    debug!(timeframe = %timeframe, patterns = run.patterns.len(), "timeframe analyzed");
                    runs.push(run);
                }
                Err(e) => {
                    warn!(timeframe = %timeframe, error = %e, "timeframe skipped");
                    first_error.get_or_insert(e);
                }
            }
        }
        if runs.is_empty() {
            return Err(first_error.unwrap_or(PatternError::InsufficientData { need: 1, got: 0 }));
        }

        // phase 2: matching over the immutable per-timeframe lists
        let flat: Vec<(usize, &DetectedPattern)> = runs
            .iter()
            .enumerate()
            .flat_map(|(r, run)| run.patterns.iter().map(move |p| (r, p)))
            .collect();
        let patterns: Vec<&DetectedPattern> = flat.iter().map(|(_, p)| *p).collect();
        let groups = match_groups(&patterns, self.engine.scoring().match_overlap);

        let mut out: Vec<MultiTimeframePattern> = groups
            .iter()
            .map(|group| {
                let (run_idx, _) = flat[group[0]];
                let members: Vec<&DetectedPattern> = group.iter().map(|&i| patterns[i]).collect();
                self.collapse(&members, &runs[run_idx].bars)
            })
            .collect();
        self.check_deadline(started)?;

        out.sort_by(|a, b| {
            b.adjusted_confidence
                .total_cmp(&a.adjusted_confidence)
                .then_with(|| a.pattern.start_time.cmp(&b.pattern.start_time))
        });
        info!(
            timeframes = runs.len(),
            detected = patterns.len(),
            reconciled = out.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "multi-timeframe detection finished"
        );
        Ok(out)
    }

    /// One group of matched instances into one record; `members[0]` is the
    /// highest-quality instance and `bars` its series.
    fn collapse(&self, members: &[&DetectedPattern], bars: &[Bar]) -> MultiTimeframePattern {
        let scoring = self.engine.scoring();
        let representative = members[0];
        let detected_on_timeframes: BTreeSet<Timeframe> =
            members.iter().map(|p| p.timeframe).collect();
        let confirmation_level = detected_on_timeframes.len().min(3);
        let alignment_score = (confirmation_level > 1).then(|| alignment(members, scoring));

        let volume = VolumeAnalyzer::new(bars, scoring)
            .with_baseline(self.config.volume_baseline_bars)
            .score(
                representative.start_time,
                representative.end_time,
                representative.pattern_type,
            );
        let adjusted = adjusted_confidence(
            representative.base_confidence,
            confirmation_level,
            alignment_score.unwrap_or(0.0),
            volume.quality,
            scoring,
        );

        MultiTimeframePattern {
            pattern: representative.clone(),
            detected_on_timeframes,
            confirmation_level,
            alignment_score,
            volume_score: volume.volume_score,
            volume_quality: volume.quality,
            volume_ratio: volume.volume_ratio,
            vwap_position: volume.vwap_position,
            volume,
            adjusted_confidence: adjusted,
        }
    }

    fn check_deadline(&self, started: Instant) -> Result<()> {
        if let Some(limit_ms) = self.config.timeout_ms {
            let elapsed_ms = started.elapsed().as_millis();
            if elapsed_ms > u128::from(limit_ms) {
                return Err(PatternError::Timeout {
                    elapsed_ms,
                    limit_ms,
                });
            }
        }
        Ok(())
    }
}

// ============================================================
// MATCHING
// ============================================================

/// Group patterns that are the same formation on different timeframes.
///
/// Anchors are taken by descending quality (coarser timeframe first on ties).
/// Each anchor gathers, per other timeframe, the best unassigned pattern with
/// the same name and signal whose interval overlaps the anchor's by at least
/// `min_overlap` of the shorter interval. The first index of every group is
/// its anchor; every pattern lands in exactly one group.
pub fn match_groups(patterns: &[&DetectedPattern], min_overlap: f64) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..patterns.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (patterns[a], patterns[b]);
        pb.quality_score
            .total_cmp(&pa.quality_score)
            .then_with(|| pb.timeframe.cmp(&pa.timeframe))
            .then_with(|| pa.start_time.cmp(&pb.start_time))
    });

    let mut assigned = vec![false; patterns.len()];
    let mut groups = Vec::new();
    for (pos, &anchor) in order.iter().enumerate() {
        if assigned[anchor] {
            continue;
        }
        assigned[anchor] = true;
        let a = patterns[anchor];
        let interval = a.interval();
        let mut group = vec![anchor];
        let mut seen: BTreeSet<Timeframe> = BTreeSet::from([a.timeframe]);

        for &candidate in &order[pos + 1..] {
            let c = patterns[candidate];
            if assigned[candidate]
                || seen.contains(&c.timeframe)
                || c.pattern_name != a.pattern_name
                || c.signal != a.signal
            {
                continue;
            }
            if interval.overlap_fraction(&c.interval()) >= min_overlap {
                assigned[candidate] = true;
                seen.insert(c.timeframe);
                group.push(candidate);
            }
        }
        groups.push(group);
    }
    groups
}

/// Agreement of a matched group in `[0, 1]`: mean closeness of the breakout,
/// target and stop levels and of the quality scores
pub fn alignment(members: &[&DetectedPattern], scoring: &ScoringConfig) -> f64 {
    let level = |f: fn(&DetectedPattern) -> f64| {
        let values: Vec<f64> = members.iter().map(|p| f(p)).collect();
        closeness(&values, scoring.alignment_price_tolerance)
    };
    let qualities: Vec<f64> = members.iter().map(|p| p.quality_score).collect();
    let (q_min, q_max) = min_max(&qualities);

    let parts = [
        level(|p| p.breakout_price),
        level(|p| p.target_price),
        level(|p| p.stop_loss_price),
        (1.0 - (q_max - q_min)).clamp(0.0, 1.0),
    ];
    parts.iter().sum::<f64>() / parts.len() as f64
}

/// 1 for identical values, 0 once the relative spread reaches `tolerance`
fn closeness(values: &[f64], tolerance: f64) -> f64 {
    let (lo, hi) = min_max(values);
    let mean = values.iter().map(|v| v.abs()).sum::<f64>() / values.len().max(1) as f64;
    if mean <= f64::EPSILON {
        return 1.0;
    }
    (1.0 - (hi - lo) / mean / tolerance).clamp(0.0, 1.0)
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        })
}
