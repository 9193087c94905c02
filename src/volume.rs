//! Volume confirmation for detected formations.
//!
//! A [`VolumeAnalyzer`] is built over one bar series and answers questions about
//! time windows of it: VWAP at an instant, volume relative to the preceding
//! baseline, the volume-by-price profile, and a composite [`VolumeScore`].
//! Missing or zero volume never fails; it degrades to a neutral score.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{config::ScoringConfig, OHLCVExt, PatternType, OHLCV};

// ============================================================
// TYPES
// ============================================================

/// Quality label of a volume score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeQuality {
    Weak,
    Average,
    Good,
    Excellent,
}

impl VolumeQuality {
    /// Label for `score` given the excellent/good/average lower bounds
    pub fn from_score(score: f64, thresholds: [f64; 3]) -> Self {
        if score >= thresholds[0] {
            VolumeQuality::Excellent
        } else if score >= thresholds[1] {
            VolumeQuality::Good
        } else if score >= thresholds[2] {
            VolumeQuality::Average
        } else {
            VolumeQuality::Weak
        }
    }
}

/// Direction of volume across a window (first half vs second half)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeTrend {
    Increasing,
    Stable,
    Decreasing,
}

/// Close relative to VWAP at the end of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VwapPosition {
    Above,
    Below,
}

/// What the volume is expected to do for the formation to be credible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeContext {
    /// Rising participation confirms
    Breakout,
    /// Drying-up participation confirms
    Consolidation,
}

impl From<PatternType> for VolumeContext {
    fn from(pattern_type: PatternType) -> Self {
        match pattern_type {
            PatternType::Reversal => VolumeContext::Breakout,
            PatternType::Continuation => VolumeContext::Consolidation,
        }
    }
}

/// Volume-by-price distribution of a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeProfile {
    /// Center of the highest-volume price bin
    pub point_of_control: f64,
    pub value_area_low: f64,
    pub value_area_high: f64,
    pub total_volume: f64,
    /// Lower edge of the first bin
    pub price_low: f64,
    pub bin_width: f64,
    pub bin_volumes: Vec<f64>,
}

/// Composite volume assessment of a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeScore {
    pub volume_score: f64,
    pub quality: VolumeQuality,
    pub volume_ratio: f64,
    pub trend: VolumeTrend,
    pub vwap_position: Option<VwapPosition>,
    /// (close - vwap) / vwap * 100 at the end of the window
    pub vwap_distance_pct: f64,
}

impl VolumeScore {
    /// Score used when the window or its baseline carries no usable volume
    pub fn neutral() -> Self {
        Self {
            volume_score: 0.5,
            quality: VolumeQuality::Average,
            volume_ratio: 1.0,
            trend: VolumeTrend::Stable,
            vwap_position: None,
            vwap_distance_pct: 0.0,
        }
    }
}

// ============================================================
// ANALYZER
// ============================================================

pub struct VolumeAnalyzer<'a, T: OHLCV> {
    bars: &'a [T],
    config: &'a ScoringConfig,
    baseline_bars: usize,
}

impl<'a, T: OHLCV> VolumeAnalyzer<'a, T> {
    /// `bars` must be ordered by timestamp.
    pub fn new(bars: &'a [T], config: &'a ScoringConfig) -> Self {
        Self {
            bars,
            config,
            baseline_bars: 20,
        }
    }

    /// Number of bars preceding a window averaged for its volume ratio
    pub fn with_baseline(mut self, baseline_bars: usize) -> Self {
        self.baseline_bars = baseline_bars.max(1);
        self
    }

    /// Index range `[lo, hi)` of bars with `start <= timestamp <= end`
    fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> (usize, usize) {
        let lo = self.bars.partition_point(|b| b.timestamp() < start);
        let hi = self.bars.partition_point(|b| b.timestamp() <= end);
        (lo, hi.max(lo))
    }

    /// Cumulative typical-price VWAP over all bars up to and including `at`
    pub fn vwap_at(&self, at: DateTime<Utc>) -> Option<f64> {
        let hi = self.bars.partition_point(|b| b.timestamp() <= at);
        let (pv, v) = self.bars[..hi]
            .iter()
            .fold((0.0, 0.0), |(pv, v), b| {
                (pv + b.typical_price() * b.volume(), v + b.volume())
            });
        if v > 0.0 {
            Some(pv / v)
        } else {
            None
        }
    }

    /// Mean volume inside the window over mean volume of up to `baseline`
    /// bars before it. `None` when either side has no volume.
    pub fn volume_ratio(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        baseline: usize,
    ) -> Option<f64> {
        let (lo, hi) = self.window(start, end);
        if lo == hi || lo == 0 {
            return None;
        }
        let window_avg = mean_volume(&self.bars[lo..hi]);
        let base_avg = mean_volume(&self.bars[lo.saturating_sub(baseline.max(1))..lo]);
        if window_avg <= 0.0 || base_avg <= 0.0 {
            return None;
        }
        Some(window_avg / base_avg)
    }

    /// Compare the mean volume of the window's two halves
    pub fn volume_trend(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> VolumeTrend {
        let (lo, hi) = self.window(start, end);
        halves_trend(&self.bars[lo..hi], self.config.volume_change_threshold)
    }

    /// Volume distribution over `num_bins` equal price bins of the window's
    /// low..high range, bars assigned by typical price.
    pub fn volume_profile(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        num_bins: usize,
    ) -> Option<VolumeProfile> {
        let (lo, hi) = self.window(start, end);
        let bars = &self.bars[lo..hi];
        if bars.is_empty() || num_bins == 0 {
            return None;
        }

        let price_low = bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
        let price_high = bars
            .iter()
            .map(|b| b.high())
            .fold(f64::NEG_INFINITY, f64::max);
        let total_volume: f64 = bars.iter().map(|b| b.volume()).sum();
        if total_volume <= 0.0 {
            return None;
        }

        let span = price_high - price_low;
        if span <= f64::EPSILON {
            return Some(VolumeProfile {
                point_of_control: price_low,
                value_area_low: price_low,
                value_area_high: price_high,
                total_volume,
                price_low,
                bin_width: 0.0,
                bin_volumes: vec![total_volume],
            });
        }

        let bin_width = span / num_bins as f64;
        let mut bin_volumes = vec![0.0; num_bins];
        for bar in bars {
            let slot = ((bar.typical_price() - price_low) / bin_width) as usize;
            bin_volumes[slot.min(num_bins - 1)] += bar.volume();
        }

        let poc = bin_volumes
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| if *v > bin_volumes[best] { i } else { best });

        // grow the value area from the POC towards the heavier neighbour
        let target = total_volume * self.config.value_area;
        let (mut low, mut high) = (poc, poc);
        let mut covered = bin_volumes[poc];
        while covered < target && (low > 0 || high < num_bins - 1) {
            let below = if low > 0 { bin_volumes[low - 1] } else { -1.0 };
            let above = if high < num_bins - 1 {
                bin_volumes[high + 1]
            } else {
                -1.0
            };
            if above > below {
                high += 1;
                covered += above;
            } else {
                low -= 1;
                covered += below;
            }
        }

        Some(VolumeProfile {
            point_of_control: price_low + (poc as f64 + 0.5) * bin_width,
            value_area_low: price_low + low as f64 * bin_width,
            value_area_high: price_low + (high + 1) as f64 * bin_width,
            total_volume,
            price_low,
            bin_width,
            bin_volumes,
        })
    }

    /// Composite score of the window for a formation of `pattern_type`
    pub fn score(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pattern_type: PatternType,
    ) -> VolumeScore {
        self.score_in_context(start, end, VolumeContext::from(pattern_type))
    }

    pub fn score_in_context(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        context: VolumeContext,
    ) -> VolumeScore {
        let (lo, hi) = self.window(start, end);
        if lo == hi {
            return VolumeScore::neutral();
        }

        let trend = halves_trend(&self.bars[lo..hi], self.config.volume_change_threshold);
        let (vwap_position, vwap_distance_pct) = self.vwap_context(hi - 1);

        let Some(ratio) = self.volume_ratio(start, end, self.baseline_bars) else {
            return VolumeScore {
                trend,
                vwap_position,
                vwap_distance_pct,
                ..VolumeScore::neutral()
            };
        };

        let base = self
            .config
            .volume_ratio_bands
            .iter()
            .find(|(min_ratio, _)| ratio >= *min_ratio)
            .map(|(_, score)| *score)
            .unwrap_or(self.config.volume_ratio_floor_score);

        let adj = self.config.volume_trend_adjustment;
        let adjustment = match (context, trend) {
            (_, VolumeTrend::Stable) => 0.0,
            (VolumeContext::Breakout, VolumeTrend::Increasing) => adj,
            (VolumeContext::Breakout, VolumeTrend::Decreasing) => -adj,
            (VolumeContext::Consolidation, VolumeTrend::Decreasing) => adj,
            (VolumeContext::Consolidation, VolumeTrend::Increasing) => -adj,
        };
        let volume_score = (base + adjustment).clamp(0.0, 1.0);

        VolumeScore {
            volume_score,
            quality: VolumeQuality::from_score(
                volume_score,
                self.config.volume_quality_thresholds,
            ),
            volume_ratio: ratio,
            trend,
            vwap_position,
            vwap_distance_pct,
        }
    }

    fn vwap_context(&self, last: usize) -> (Option<VwapPosition>, f64) {
        let bar = &self.bars[last];
        match self.vwap_at(bar.timestamp()) {
            Some(vwap) if vwap > 0.0 => {
                let position = if bar.close() >= vwap {
                    VwapPosition::Above
                } else {
                    VwapPosition::Below
                };
                (Some(position), (bar.close() - vwap) / vwap * 100.0)
            }
            _ => (None, 0.0),
        }
    }
}

fn mean_volume<T: OHLCV>(bars: &[T]) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    bars.iter().map(|b| b.volume()).sum::<f64>() / bars.len() as f64
}

/// Second-half mean volume against first-half mean, `threshold` as a fraction
pub(crate) fn halves_trend<T: OHLCV>(bars: &[T], threshold: f64) -> VolumeTrend {
    if bars.len() < 2 {
        return VolumeTrend::Stable;
    }
    let mid = bars.len() / 2;
    let first = mean_volume(&bars[..mid]);
    let second = mean_volume(&bars[mid..]);
    if first <= 0.0 {
        return if second > 0.0 {
            VolumeTrend::Increasing
        } else {
            VolumeTrend::Stable
        };
    }
    let change = (second - first) / first;
    if change > threshold {
        VolumeTrend::Increasing
    } else if change < -threshold {
        VolumeTrend::Decreasing
    } else {
        VolumeTrend::Stable
    }
}
