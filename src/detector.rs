//! Single-timeframe detection.
//!
//! [`PatternEngine`] runs every registered recognizer over one bar series,
//! scores each candidate, applies the fit/quality/confidence filters and
//! optionally resolves overlaps. Engines are built with [`EngineBuilder`].

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::{
    analysis::close_regression,
    config::{DetectionConfig, ScoringConfig},
    recognizers::{BuiltinRecognizer, DynPatternRecognizer, PatternCandidate},
    validate_bars,
    volume::{halves_trend, VolumeTrend},
    DetectedPattern, Direction, PatternError, PatternId, PatternType, PriceStructure, Result,
    Timeframe, OHLCV,
};

// ============================================================
// PARAMETERS
// ============================================================

/// Per-series detection parameters, already scaled to the series' timeframe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectParams {
    pub timeframe: Timeframe,
    pub min_pattern_length: usize,
    pub peak_order: usize,
    pub min_r_squared: f64,
    pub min_confidence: f64,
}

impl DetectParams {
    /// Parameters of `config` taken as-is for `timeframe`
    pub fn from_config(config: &DetectionConfig, timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            min_pattern_length: config.min_pattern_length,
            peak_order: config.peak_order,
            min_r_squared: config.min_r_squared,
            min_confidence: config.min_confidence,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_pattern_length == 0 || self.peak_order == 0 {
            return Err(PatternError::InvalidValue(
                "min_pattern_length and peak_order must be > 0",
            ));
        }
        for (field, value) in [
            ("min_r_squared", self.min_r_squared),
            ("min_confidence", self.min_confidence),
        ] {
            if value.is_nan() || !(0.0..=1.0).contains(&value) {
                return Err(PatternError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        Ok(())
    }
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternId>>,
    /// Case-insensitive names (family ids or emitted names) never reported
    pub excluded: Vec<String>,
    /// Drop the lower-quality of two patterns whose intervals overlap beyond this fraction
    pub overlap_threshold: Option<f64>,
}

/// Single-timeframe detection engine
pub struct PatternEngine {
    builtin: Vec<BuiltinRecognizer>,
    custom: Vec<Box<dyn DynPatternRecognizer>>,
    config: EngineConfig,
}

/// Candidate with the family attributes of the recognizer that produced it
struct Scored {
    candidate: PatternCandidate,
    pattern_type: PatternType,
    base_confidence: f64,
}

impl PatternEngine {
    pub fn scoring(&self) -> &ScoringConfig {
        &self.config.scoring
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn recognizer_count(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    /// Additionally never report `names` (family ids or emitted names)
    pub fn with_excluded<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for name in names {
            let name = name.as_ref();
            if !self.config.excluded.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                self.config.excluded.push(name.to_string());
            }
        }
        self
    }

    /// Resolve overlaps at `threshold`; `None` keeps the current setting
    pub fn with_overlap_threshold(mut self, threshold: Option<f64>) -> Self {
        if threshold.is_some() {
            self.config.overlap_threshold = threshold;
        }
        self
    }

    /// Same recognizers under a different scoring configuration
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Result<Self> {
        scoring.validate()?;
        self.config.scoring = scoring;
        Ok(self)
    }

    /// Detect, score and filter formations on one bar series.
    ///
    /// Fails with [`PatternError::InsufficientData`] when the series is shorter
    /// than `min_pattern_length`. Output is ordered by start index.
    pub fn detect<T: OHLCV>(&self, bars: &[T], params: &DetectParams) -> Result<Vec<DetectedPattern>> {
        params.validate()?;
        if bars.len() < params.min_pattern_length {
            return Err(PatternError::InsufficientData {
                need: params.min_pattern_length,
                got: bars.len(),
            });
        }
        if self.config.validate_data {
            validate_bars(bars)?;
        }

        let structure = PriceStructure::new(bars, params.peak_order, params.min_pattern_length);
        debug!(
            timeframe = %params.timeframe,
            bars = bars.len(),
            peaks = structure.peaks.len(),
            troughs = structure.troughs.len(),
            "price structure ready"
        );

        let candidates = if self.custom.is_empty() {
            self.collect_candidates(bars, &[], &structure)
        } else {
            let bar_refs: Vec<&dyn OHLCV> = bars.iter().map(|b| b as &dyn OHLCV).collect();
            self.collect_candidates(bars, &bar_refs, &structure)
        };

        let mut patterns: Vec<DetectedPattern> = candidates
            .into_iter()
            .filter_map(|s| self.accept(bars, s, params))
            .collect();

        if let Some(threshold) = self.config.overlap_threshold {
            patterns = remove_overlaps(patterns, threshold);
        }
        patterns.sort_by(|a, b| {
            a.start_index
                .cmp(&b.start_index)
                .then_with(|| b.quality_score.total_cmp(&a.quality_score))
        });
        debug!(timeframe = %params.timeframe, patterns = patterns.len(), "detection finished");
        Ok(patterns)
    }

    /// Weighted quality of a candidate in `[0, 1]`
    pub fn quality_score<T: OHLCV>(
        &self,
        bars: &[T],
        candidate: &PatternCandidate,
        pattern_type: PatternType,
        base_confidence: f64,
    ) -> f64 {
        let s = &self.config.scoring;
        let end = candidate.end_index.min(bars.len().saturating_sub(1));
        let window = bars.get(candidate.start_index..=end).unwrap_or(&[]);
        let volume = volume_behavior_score(window, s);
        let prior = match pattern_type {
            PatternType::Reversal => {
                prior_trend_strength(bars, candidate.start_index, candidate.signal, s)
            }
            PatternType::Continuation => 1.0,
        };
        let quality = s.trendline_weight * candidate.mean_fit_quality()
            + s.volume_weight * volume
            + s.prior_trend_weight * prior
            + s.base_confidence_weight * base_confidence;
        quality.clamp(0.0, 1.0)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn collect_candidates<T: OHLCV>(
        &self,
        bars: &[T],
        bar_refs: &[&dyn OHLCV],
        structure: &PriceStructure,
    ) -> Vec<Scored> {
        let mut out = Vec::new();

        // Fast path: builtin recognizers (enum dispatch, no vtable)
        for r in &self.builtin {
            if !self.family_enabled(r.id()) {
                continue;
            }
            let (pattern_type, base_confidence) = (r.pattern_type(), r.base_confidence());
            out.extend(r.recognize(bars, structure).into_iter().map(|candidate| Scored {
                candidate,
                pattern_type,
                base_confidence,
            }));
        }

        // Slow path: custom recognizers (vtable)
        if !bar_refs.is_empty() {
            for r in &self.custom {
                if !self.family_enabled(r.id()) {
                    continue;
                }
                let (pattern_type, base_confidence) = (r.pattern_type(), r.base_confidence());
                out.extend(r.recognize(bar_refs, structure).into_iter().map(|candidate| {
                    Scored {
                        candidate,
                        pattern_type,
                        base_confidence,
                    }
                }));
            }
        }

        out.retain(|s| !self.is_excluded(s.candidate.name));
        out
    }

    fn family_enabled(&self, id: PatternId) -> bool {
        !self.is_excluded(id)
    }

    fn is_excluded(&self, id: PatternId) -> bool {
        self.config
            .excluded
            .iter()
            .any(|n| n.eq_ignore_ascii_case(id.as_str()))
    }

    fn passes_filter(&self, family: PatternId, name: PatternId) -> bool {
        match self.config.pattern_filter {
            Some(ref filter) => filter.contains(&family) || filter.contains(&name),
            None => true,
        }
    }

    fn accept<T: OHLCV>(&self, bars: &[T], scored: Scored, params: &DetectParams) -> Option<DetectedPattern> {
        let Scored {
            candidate,
            pattern_type,
            base_confidence,
        } = scored;
        if candidate.end_index >= bars.len() || candidate.start_index > candidate.end_index {
            return None;
        }
        if !self.passes_filter(self.family_of(candidate.name), candidate.name) {
            return None;
        }
        if candidate
            .trendlines
            .iter()
            .any(|t| t.fit_quality < params.min_r_squared)
        {
            trace!(pattern = %candidate.name, "rejected: trendline fit");
            return None;
        }

        let quality = self.quality_score(bars, &candidate, pattern_type, base_confidence);
        let confidence = quality;
        if quality <= self.config.scoring.quality_floor || confidence < params.min_confidence {
            trace!(pattern = %candidate.name, quality, "rejected: quality");
            return None;
        }

        Some(DetectedPattern {
            pattern_name: candidate.name,
            pattern_type,
            signal: candidate.signal,
            start_time: bars[candidate.start_index].timestamp(),
            end_time: bars[candidate.end_index].timestamp(),
            start_index: candidate.start_index,
            end_index: candidate.end_index,
            trendlines: candidate.trendlines,
            key_points: candidate.key_points,
            breakout_price: candidate.breakout_price,
            target_price: candidate.target_price,
            stop_loss_price: candidate.stop_loss_price,
            base_confidence,
            quality_score: quality,
            confidence,
            timeframe: params.timeframe,
        })
    }

    /// Family id of an emitted name, for the pattern filter
    fn family_of(&self, name: PatternId) -> PatternId {
        self.builtin
            .iter()
            .map(BuiltinRecognizer::id)
            .find(|id| *id == name)
            .or_else(|| family_of_builtin_name(name))
            .unwrap_or(name)
    }

    fn validate(&self) -> Result<()> {
        for r in &self.builtin {
            r.validate_config()?;
        }
        for r in &self.custom {
            r.validate_config()?;
        }
        self.config.scoring.validate()?;
        if let Some(t) = self.config.overlap_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(PatternError::OutOfRange {
                    field: "overlap_threshold",
                    value: t,
                    min: 0.0,
                    max: 1.0,
                });
            }
        }
        Ok(())
    }
}

fn family_of_builtin_name(name: PatternId) -> Option<PatternId> {
    use crate::recognizers::*;
    match name {
        n if n == INVERSE_HEAD_AND_SHOULDERS => Some(HEAD_AND_SHOULDERS),
        n if n == ASCENDING_TRIANGLE || n == DESCENDING_TRIANGLE || n == SYMMETRICAL_TRIANGLE => {
            Some(TRIANGLE)
        }
        n if n == BULL_FLAG || n == BEAR_FLAG => Some(FLAG),
        _ => None,
    }
}

// ============================================================
// SCORING COMPONENTS
// ============================================================

/// Volume behaviour inside the formation: first half vs second half.
/// Declining volume scores highest; a window without volume scores as flat.
pub fn volume_behavior_score<T: OHLCV>(window: &[T], scoring: &ScoringConfig) -> f64 {
    if window.iter().all(|b| b.volume() <= 0.0) {
        return scoring.volume_flat_score;
    }
    match halves_trend(window, scoring.volume_change_threshold) {
        VolumeTrend::Decreasing => scoring.volume_declining_score,
        VolumeTrend::Stable => scoring.volume_flat_score,
        VolumeTrend::Increasing => scoring.volume_rising_score,
    }
}

/// Strength of the antecedent trend a reversal needs: an uptrend before a
/// bearish signal, a downtrend before a bullish one.
///
/// Combines the percentage move and the regression fit of the closes over the
/// look-back window ending at `start`. A missing or opposite trend lowers the
/// score but never below 0.25.
pub fn prior_trend_strength<T: OHLCV>(
    bars: &[T],
    start: usize,
    signal: Direction,
    scoring: &ScoringConfig,
) -> f64 {
    const MIN_BARS: usize = 5;

    if start >= bars.len() || start + 1 < MIN_BARS || signal == Direction::Neutral {
        return 0.5;
    }
    let from = start.saturating_sub(scoring.prior_trend_lookback);
    let first = bars[from].close();
    if first.abs() <= f64::EPSILON {
        return 0.5;
    }
    let change = (bars[start].close() - first) / first.abs();
    let magnitude = (change.abs() / scoring.prior_trend_full_move).min(1.0);
    let fit = close_regression(bars, from, start).r_squared;

    let expected_up = signal.is_bearish();
    let matches = if expected_up { change > 0.0 } else { change < 0.0 };
    if matches {
        0.5 + 0.5 * (0.5 * magnitude + 0.5 * fit)
    } else {
        0.25 + 0.25 * (1.0 - magnitude)
    }
}

/// Greedy overlap resolution: keep patterns by descending quality, dropping any
/// whose interval overlaps an already kept one beyond `threshold` of the
/// shorter interval.
pub fn remove_overlaps(mut patterns: Vec<DetectedPattern>, threshold: f64) -> Vec<DetectedPattern> {
    patterns.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
    let mut kept: Vec<DetectedPattern> = Vec::with_capacity(patterns.len());
    for p in patterns {
        let clashes = kept
            .iter()
            .any(|k| index_overlap(k, &p) > threshold);
        if !clashes {
            kept.push(p);
        }
    }
    kept
}

/// Overlap of two bar-index spans as a fraction of the shorter one
fn index_overlap(a: &DetectedPattern, b: &DetectedPattern) -> f64 {
    let lo = a.start_index.max(b.start_index);
    let hi = a.end_index.min(b.end_index);
    if hi < lo {
        return 0.0;
    }
    let shorter = (a.end_index - a.start_index).min(b.end_index - b.start_index) + 1;
    (hi - lo + 1) as f64 / shorter as f64
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinRecognizer>,
    custom: Vec<Box<dyn DynPatternRecognizer>>,
    config: EngineConfig,
}

/// Generate an array of `BuiltinRecognizer` variants using `Default::default()` for each inner type.
macro_rules! builtin_defaults {
  ($($variant:ident),* $(,)?) => {
    [$(BuiltinRecognizer::$variant(Default::default())),*]
  };
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all 12 builtin recognizers with default thresholds
    pub fn with_all_defaults(self) -> Self {
        self.with_reversal_defaults().with_continuation_defaults()
    }

    /// Add reversal recognizers with defaults (8)
    pub fn with_reversal_defaults(mut self) -> Self {
        self.builtin.extend(builtin_defaults![
            HeadAndShoulders,
            DoubleTop,
            DoubleBottom,
            TripleTop,
            TripleBottom,
            RoundingBottom,
            RisingWedge,
            FallingWedge,
        ]);
        self
    }

    /// Add continuation recognizers with defaults (4)
    pub fn with_continuation_defaults(mut self) -> Self {
        self.builtin
            .extend(builtin_defaults![Triangle, Flag, Pennant, CupAndHandle]);
        self
    }

    /// Add a builtin recognizer
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, recognizer: BuiltinRecognizer) -> Self {
        self.builtin.push(recognizer);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, recognizer: BuiltinRecognizer) -> Result<Self> {
        recognizer.validate_config()?;
        self.builtin.push(recognizer);
        Ok(self)
    }

    /// Add a custom recognizer (slow path)
    pub fn add_custom<R: DynPatternRecognizer + 'static>(mut self, recognizer: R) -> Self {
        self.custom.push(Box::new(recognizer));
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    /// Never report these names (family ids or emitted names, case-insensitive)
    pub fn exclude<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.config.excluded.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn overlap_threshold(mut self, threshold: f64) -> Self {
        self.config.overlap_threshold = Some(threshold);
        self
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.config.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            custom: self.custom,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL DETECTION
// ============================================================

/// Result of detecting on a single instrument
#[derive(Debug)]
pub struct DetectResult {
    pub symbol: String,
    pub patterns: Vec<DetectedPattern>,
}

/// Error from detecting on a single instrument
#[derive(Debug)]
pub struct DetectError {
    pub symbol: String,
    pub error: PatternError,
}

/// Parallel single-timeframe detection over many instruments
pub fn detect_parallel<'a, T, I>(
    engine: &PatternEngine,
    instruments: I,
    params: &DetectParams,
) -> (Vec<DetectResult>, Vec<DetectError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .detect(bars, params)
                .map(|patterns| DetectResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| DetectError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
