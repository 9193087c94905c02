//! Local extrema and least-squares trendlines.
//!
//! Everything here is deterministic: the same bars and look-around order always
//! produce the same extrema and the same fitted lines.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::trace;

use crate::OHLCV;

// ============================================================
// EXTREMA
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtremumKind {
    Peak,
    Trough,
}

/// A local price peak (on highs) or trough (on lows)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtremumPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub kind: ExtremumKind,
}

impl ExtremumPoint {
    #[inline]
    pub fn is_peak(&self) -> bool {
        self.kind == ExtremumKind::Peak
    }
}

/// Find local peaks and troughs.
///
/// Bar `i` is a peak when its high is the maximum of the `order` bars on each
/// side (strictly above the left side, so a flat top yields one peak at its
/// first bar). Troughs mirror this on lows. Bars closer than `order` to either
/// end are never extrema. Output is ordered by index, peak before trough.
pub fn find_extrema<T: OHLCV>(bars: &[T], order: usize) -> Vec<ExtremumPoint> {
    let order = order.max(1);
    let mut points = Vec::new();
    if bars.len() < 2 * order + 1 {
        return points;
    }

    for i in order..bars.len() - order {
        let high = bars[i].high();
        let low = bars[i].low();

        let is_peak = bars[i - order..i].iter().all(|b| b.high() < high)
            && bars[i + 1..=i + order].iter().all(|b| b.high() <= high);
        let is_trough = bars[i - order..i].iter().all(|b| b.low() > low)
            && bars[i + 1..=i + order].iter().all(|b| b.low() >= low);

        if is_peak {
            points.push(ExtremumPoint {
                index: i,
                timestamp: bars[i].timestamp(),
                price: high,
                kind: ExtremumKind::Peak,
            });
        }
        if is_trough {
            points.push(ExtremumPoint {
                index: i,
                timestamp: bars[i].timestamp(),
                price: low,
                kind: ExtremumKind::Trough,
            });
        }
    }

    points
}

/// Extrema of one series, split by kind for the recognizers
#[derive(Debug, Clone, Default)]
pub struct PriceStructure {
    pub extrema: Vec<ExtremumPoint>,
    pub peaks: Vec<ExtremumPoint>,
    pub troughs: Vec<ExtremumPoint>,
    /// Minimum bars a formation must span on this series
    pub min_pattern_length: usize,
}

impl PriceStructure {
    pub fn new<T: OHLCV>(bars: &[T], order: usize, min_pattern_length: usize) -> Self {
        let extrema = find_extrema(bars, order);
        let peaks = extrema.iter().filter(|p| p.is_peak()).copied().collect();
        let troughs = extrema.iter().filter(|p| !p.is_peak()).copied().collect();
        Self {
            extrema,
            peaks,
            troughs,
            min_pattern_length,
        }
    }

    /// Troughs strictly between two bar indices
    pub fn troughs_between(&self, from: usize, to: usize) -> impl Iterator<Item = &ExtremumPoint> {
        self.troughs
            .iter()
            .filter(move |t| t.index > from && t.index < to)
    }

    /// Peaks strictly between two bar indices
    pub fn peaks_between(&self, from: usize, to: usize) -> impl Iterator<Item = &ExtremumPoint> {
        self.peaks
            .iter()
            .filter(move |p| p.index > from && p.index < to)
    }
}

// ============================================================
// REGRESSION / TRENDLINES
// ============================================================

/// Ordinary least-squares fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Squared correlation coefficient, 0.0 for degenerate input
    pub r_squared: f64,
}

impl Regression {
    fn degenerate(ys: &[f64]) -> Self {
        let intercept = if ys.is_empty() {
            0.0
        } else {
            ys.iter().sum::<f64>() / ys.len() as f64
        };
        Self {
            slope: 0.0,
            intercept,
            r_squared: 0.0,
        }
    }

    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// OLS of `ys` on `xs`. Fewer than two points or identical x values give a
/// flat line with `r_squared = 0`. A perfectly flat y series fits exactly
/// (`r_squared = 1`).
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Regression {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Regression::degenerate(&ys[..n]);
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let nf = n as f64;
    let mean_x = xs.iter().sum::<f64>() / nf;
    let mean_y = ys.iter().sum::<f64>() / nf;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx <= f64::EPSILON {
        return Regression::degenerate(ys);
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let scale = mean_y.abs().max(1.0);
    let r_squared = if syy <= f64::EPSILON * scale * scale {
        1.0
    } else {
        ((sxy * sxy) / (sxx * syy)).clamp(0.0, 1.0)
    };

    Regression {
        slope,
        intercept,
        r_squared,
    }
}

/// Regression of closing prices over `bars[start..=end]`, x = bar index
pub fn close_regression<T: OHLCV>(bars: &[T], start: usize, end: usize) -> Regression {
    if bars.is_empty() || start > end {
        return Regression::degenerate(&[]);
    }
    let end = end.min(bars.len() - 1);
    let xs: Vec<f64> = (start..=end).map(|i| i as f64).collect();
    let ys: Vec<f64> = bars[start..=end].iter().map(|b| b.close()).collect();
    linear_regression(&xs, &ys)
}

/// Straight line through chosen extrema, x = bar index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trendline {
    pub slope: f64,
    pub intercept: f64,
    /// Goodness of fit (R²) in `[0, 1]`
    pub fit_quality: f64,
    pub anchor_points: Vec<ExtremumPoint>,
}

impl Trendline {
    #[inline]
    pub fn value_at(&self, index: usize) -> f64 {
        self.intercept + self.slope * index as f64
    }

    /// Slope as a fraction of the line's level per bar
    pub fn relative_slope(&self, at: usize) -> f64 {
        let level = self.value_at(at).abs();
        if level <= f64::EPSILON {
            0.0
        } else {
            self.slope / level
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.fit_quality == 0.0 && self.slope == 0.0
    }
}

/// Least-squares line through `points` (x = index, y = price).
///
/// Never fails: fewer than two distinct indices produce a zero-slope line with
/// `fit_quality = 0`.
pub fn fit_trendline(points: &[ExtremumPoint]) -> Trendline {
    let xs: Vec<f64> = points.iter().map(|p| p.index as f64).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.price).collect();
    let reg = linear_regression(&xs, &ys);
    if reg.r_squared == 0.0 && reg.slope == 0.0 {
        trace!(points = points.len(), "degenerate trendline fit");
    }
    Trendline {
        slope: reg.slope,
        intercept: reg.intercept,
        fit_quality: reg.r_squared,
        anchor_points: points.to_vec(),
    }
}
