//! Run parameters and tunable scoring constants.
//!
//! [`DetectionConfig`] is the flat per-invocation parameter set supplied by the
//! caller. [`ScoringConfig`] gathers every heuristic constant (weights,
//! thresholds, multipliers, caps) into one value threaded through the detector,
//! the volume analyzer and the multi-timeframe orchestrator.

use serde::{Deserialize, Serialize};

use crate::{volume::VolumeQuality, PatternError, Result, Timeframe};

// ============================================================
// DETECTION CONFIG
// ============================================================

/// Per-invocation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Timeframes to analyze; order is preserved in run metadata
    pub timeframes: Vec<Timeframe>,
    /// Timeframe in whose bar count `min_pattern_length` and `peak_order` are expressed
    pub baseline_timeframe: Timeframe,
    /// Minimum formation span, in bars of `baseline_timeframe`
    pub min_pattern_length: usize,
    /// Extremum look-around, in bars of `baseline_timeframe`
    pub peak_order: usize,
    pub min_r_squared: f64,
    pub min_confidence: f64,
    /// Drop the lower-quality of two patterns overlapping beyond this fraction
    pub overlap_threshold: Option<f64>,
    pub exclude_pattern_names: Vec<String>,
    /// Trailing bars averaged for the volume-ratio baseline
    pub volume_baseline_bars: usize,
    /// Fail the whole request when exceeded
    pub timeout_ms: Option<u64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![Timeframe::H1, Timeframe::H4, Timeframe::D1],
            baseline_timeframe: Timeframe::D1,
            min_pattern_length: 20,
            peak_order: 5,
            min_r_squared: 0.7,
            min_confidence: 0.5,
            overlap_threshold: None,
            exclude_pattern_names: Vec::new(),
            volume_baseline_bars: 20,
            timeout_ms: None,
        }
    }
}

impl DetectionConfig {
    /// Reject invalid parameters before any computation starts
    pub fn validate(&self) -> Result<()> {
        if self.timeframes.is_empty() {
            return Err(PatternError::InvalidConfig(
                "timeframe list is empty".to_string(),
            ));
        }
        if self.min_pattern_length == 0 {
            return Err(PatternError::InvalidValue("min_pattern_length must be > 0"));
        }
        if self.peak_order == 0 {
            return Err(PatternError::InvalidValue("peak_order must be > 0"));
        }
        if self.volume_baseline_bars == 0 {
            return Err(PatternError::InvalidValue(
                "volume_baseline_bars must be > 0",
            ));
        }
        check_unit("min_r_squared", self.min_r_squared)?;
        check_unit("min_confidence", self.min_confidence)?;
        if let Some(t) = self.overlap_threshold {
            check_unit("overlap_threshold", t)?;
        }
        if self.timeout_ms == Some(0) {
            return Err(PatternError::InvalidValue("timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclude_pattern_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }
}

// ============================================================
// SCORING CONFIG
// ============================================================

/// Confidence multipliers per volume quality label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeMultipliers {
    pub weak: f64,
    pub average: f64,
    pub good: f64,
    pub excellent: f64,
}

impl Default for VolumeMultipliers {
    fn default() -> Self {
        Self {
            weak: 0.70,
            average: 1.00,
            good: 1.15,
            excellent: 1.30,
        }
    }
}

impl VolumeMultipliers {
    pub fn for_quality(&self, quality: VolumeQuality) -> f64 {
        match quality {
            VolumeQuality::Weak => self.weak,
            VolumeQuality::Average => self.average,
            VolumeQuality::Good => self.good,
            VolumeQuality::Excellent => self.excellent,
        }
    }
}

/// Sub-linear peak-order growth with bar density.
///
/// Applied relative to the baseline timeframe's own factor, so the baseline
/// series always keeps the configured `peak_order`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakOrderFactors {
    pub m15: f64,
    pub h1: f64,
    pub h4: f64,
    pub d1: f64,
    pub w1: f64,
}

impl Default for PeakOrderFactors {
    fn default() -> Self {
        Self {
            m15: 1.8,
            h1: 1.5,
            h4: 1.2,
            d1: 1.0,
            w1: 1.0,
        }
    }
}

impl PeakOrderFactors {
    pub fn factor(&self, timeframe: Timeframe) -> f64 {
        match timeframe {
            Timeframe::M15 => self.m15,
            Timeframe::H1 => self.h1,
            Timeframe::H4 => self.h4,
            Timeframe::D1 => self.d1,
            Timeframe::W1 => self.w1,
        }
    }
}

/// Every tunable heuristic of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    // quality score weights
    pub trendline_weight: f64,
    pub volume_weight: f64,
    pub prior_trend_weight: f64,
    pub base_confidence_weight: f64,
    /// Candidates at or below this quality are discarded
    pub quality_floor: f64,

    // volume behaviour inside the pattern (halves comparison)
    pub volume_change_threshold: f64,
    pub volume_declining_score: f64,
    pub volume_flat_score: f64,
    pub volume_rising_score: f64,

    // prior trend
    pub prior_trend_lookback: usize,
    /// Price move (fraction) treated as a full-strength antecedent trend
    pub prior_trend_full_move: f64,

    // multi-timeframe confidence
    /// Multipliers for 1, 2 and 3+ confirming timeframes
    pub timeframe_multipliers: [f64; 3],
    pub alignment_coefficient: f64,
    pub volume_multipliers: VolumeMultipliers,
    pub confidence_cap: f64,
    /// Minimum interval overlap (of the shorter interval) to match across timeframes
    pub match_overlap: f64,
    /// Relative spread of price levels at which alignment drops to zero
    pub alignment_price_tolerance: f64,

    // parameter scaling
    pub min_scaled_pattern_length: usize,
    pub peak_order_factors: PeakOrderFactors,

    // volume analyzer
    pub value_area: f64,
    pub profile_bins: usize,
    /// `(min_ratio, score)` bands, highest first; below the last band scores `volume_ratio_floor_score`
    pub volume_ratio_bands: Vec<(f64, f64)>,
    pub volume_ratio_floor_score: f64,
    pub volume_trend_adjustment: f64,
    /// Lower bounds of the excellent, good and average labels
    pub volume_quality_thresholds: [f64; 3],
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            trendline_weight: 0.35,
            volume_weight: 0.25,
            prior_trend_weight: 0.20,
            base_confidence_weight: 0.20,
            quality_floor: 0.5,

            volume_change_threshold: 0.10,
            volume_declining_score: 0.8,
            volume_flat_score: 0.6,
            volume_rising_score: 0.4,

            prior_trend_lookback: 20,
            prior_trend_full_move: 0.10,

            timeframe_multipliers: [1.0, 1.4, 1.8],
            alignment_coefficient: 0.15,
            volume_multipliers: VolumeMultipliers::default(),
            confidence_cap: 0.95,
            match_overlap: 0.30,
            alignment_price_tolerance: 0.10,

            min_scaled_pattern_length: 10,
            peak_order_factors: PeakOrderFactors::default(),

            value_area: 0.70,
            profile_bins: 24,
            volume_ratio_bands: vec![(2.0, 0.9), (1.5, 0.75), (1.0, 0.6), (0.75, 0.45)],
            volume_ratio_floor_score: 0.3,
            volume_trend_adjustment: 0.1,
            volume_quality_thresholds: [0.8, 0.6, 0.4],
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let weights = [
            self.trendline_weight,
            self.volume_weight,
            self.prior_trend_weight,
            self.base_confidence_weight,
        ];
        if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(PatternError::InvalidConfig(
                "quality weights must be finite and non-negative".to_string(),
            ));
        }
        if (weights.iter().sum::<f64>() - 1.0).abs() > 1e-9 {
            return Err(PatternError::InvalidConfig(
                "quality weights must sum to 1".to_string(),
            ));
        }
        check_unit("quality_floor", self.quality_floor)?;
        check_unit("confidence_cap", self.confidence_cap)?;
        check_unit("match_overlap", self.match_overlap)?;
        check_unit("value_area", self.value_area)?;
        if self.timeframe_multipliers.iter().any(|m| *m < 1.0) {
            return Err(PatternError::InvalidConfig(
                "timeframe multipliers must be >= 1".to_string(),
            ));
        }
        if self
            .timeframe_multipliers
            .windows(2)
            .any(|w| w[1] < w[0])
        {
            return Err(PatternError::InvalidConfig(
                "timeframe multipliers must be non-decreasing".to_string(),
            ));
        }
        if self.alignment_coefficient < 0.0 {
            return Err(PatternError::InvalidValue(
                "alignment_coefficient must be >= 0",
            ));
        }
        if self.prior_trend_lookback < 2 {
            return Err(PatternError::InvalidValue("prior_trend_lookback must be >= 2"));
        }
        if self.profile_bins == 0 {
            return Err(PatternError::InvalidValue("profile_bins must be > 0"));
        }
        if self.min_scaled_pattern_length == 0 {
            return Err(PatternError::InvalidValue(
                "min_scaled_pattern_length must be > 0",
            ));
        }
        if Timeframe::all()
            .iter()
            .map(|tf| self.peak_order_factors.factor(*tf))
            .any(|f| f.is_nan() || f <= 0.0)
        {
            return Err(PatternError::InvalidValue(
                "peak_order_factors must be positive",
            ));
        }
        if self.alignment_price_tolerance <= 0.0 || self.prior_trend_full_move <= 0.0 {
            return Err(PatternError::InvalidValue(
                "tolerances must be positive",
            ));
        }
        Ok(())
    }

    /// Multiplier for the number of timeframes a formation was confirmed on
    pub fn timeframe_multiplier(&self, confirmation_level: usize) -> f64 {
        let slot = confirmation_level.clamp(1, 3) - 1;
        self.timeframe_multipliers[slot]
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<()> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(PatternError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}
