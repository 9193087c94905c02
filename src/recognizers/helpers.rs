//! Geometry shared by the recognizers: relative comparisons, level lines,
//! converging/parallel channels, poles and curvature fits.

use super::PatternCandidate;
use crate::{
    analysis::fit_trendline, Direction, ExtremumKind, ExtremumPoint, PriceStructure, Trendline,
    OHLCV,
};

// ============================================================
// CONSTANTS
// ============================================================

/// Stop-loss distance beyond the protecting extremum
pub const STOP_BUFFER: f64 = 0.005;
/// Minimum bars a pole covers
pub const MIN_POLE_BARS: usize = 3;

// ============================================================
// COMPARISONS
// ============================================================

/// |a - b| relative to their mean magnitude
#[inline]
pub fn relative_diff(a: f64, b: f64) -> f64 {
    let mean = (a.abs() + b.abs()) / 2.0;
    if mean <= f64::EPSILON {
        0.0
    } else {
        (a - b).abs() / mean
    }
}

/// Largest deviation of `prices` from their mean, relative to the mean
pub fn max_relative_deviation(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean.abs() <= f64::EPSILON {
        return 0.0;
    }
    prices
        .iter()
        .map(|p| (p - mean).abs() / mean.abs())
        .fold(0.0, f64::max)
}

#[inline]
pub fn spans_at_least(start: usize, end: usize, min_len: usize) -> bool {
    end >= start && end - start + 1 >= min_len
}

#[inline]
pub fn stop_above(price: f64) -> f64 {
    price * (1.0 + STOP_BUFFER)
}

#[inline]
pub fn stop_below(price: f64) -> f64 {
    price * (1.0 - STOP_BUFFER)
}

/// Stop on the side opposite to `signal`
#[inline]
pub fn protective_stop(price: f64, signal: Direction) -> f64 {
    if signal.is_bearish() {
        stop_above(price)
    } else {
        stop_below(price)
    }
}

/// Project `height` from `breakout` in the direction of `signal`
#[inline]
pub fn project_target(breakout: f64, height: f64, signal: Direction) -> f64 {
    if signal.is_bearish() {
        breakout - height
    } else {
        breakout + height
    }
}

pub fn lowest<'a>(points: impl Iterator<Item = &'a ExtremumPoint>) -> Option<ExtremumPoint> {
    points
        .copied()
        .fold(None, |best: Option<ExtremumPoint>, p| match best {
            Some(b) if b.price <= p.price => Some(b),
            _ => Some(p),
        })
}

pub fn highest<'a>(points: impl Iterator<Item = &'a ExtremumPoint>) -> Option<ExtremumPoint> {
    points
        .copied()
        .fold(None, |best: Option<ExtremumPoint>, p| match best {
            Some(b) if b.price >= p.price => Some(b),
            _ => Some(p),
        })
}

/// Extremum point at bar `index` on its high (peak) or low (trough)
pub fn point_at<T: OHLCV>(bars: &[T], index: usize, kind: ExtremumKind) -> ExtremumPoint {
    let bar = &bars[index];
    ExtremumPoint {
        index,
        timestamp: bar.timestamp(),
        price: match kind {
            ExtremumKind::Peak => bar.high(),
            ExtremumKind::Trough => bar.low(),
        },
        kind,
    }
}

// ============================================================
// LINES
// ============================================================

/// Relative move of a line between two bar indices
pub fn relative_change(line: &Trendline, from: usize, to: usize) -> f64 {
    let base = line.value_at(from);
    if base.abs() <= f64::EPSILON {
        return 0.0;
    }
    (line.value_at(to) - base) / base.abs()
}

/// Horizontal line at the mean anchor price.
///
/// Fit quality is `1 - max_deviation / tolerance`, floored at the R² of the
/// least-squares line through the same anchors. A single anchor fits exactly.
pub fn fit_level(points: &[ExtremumPoint], tolerance: f64) -> Trendline {
    if points.is_empty() {
        return fit_trendline(points);
    }
    let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    let level_quality = if tolerance > 0.0 {
        (1.0 - max_relative_deviation(&prices) / tolerance).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let ols = fit_trendline(points).fit_quality;
    Trendline {
        slope: 0.0,
        intercept: mean,
        fit_quality: level_quality.max(ols),
        anchor_points: points.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTilt {
    Rising,
    Flat,
    Falling,
}

pub fn tilt(change: f64, flat_tolerance: f64) -> LineTilt {
    if change > flat_tolerance {
        LineTilt::Rising
    } else if change < -flat_tolerance {
        LineTilt::Falling
    } else {
        LineTilt::Flat
    }
}

// ============================================================
// CHANNELS
// ============================================================

/// Upper and lower boundary lines over a run of extrema
#[derive(Debug, Clone)]
pub struct Channel {
    pub upper: Trendline,
    pub lower: Trendline,
    pub start: usize,
    pub end: usize,
}

impl Channel {
    pub fn new(upper_points: &[ExtremumPoint], lower_points: &[ExtremumPoint]) -> Option<Self> {
        let first = upper_points.first()?.index.min(lower_points.first()?.index);
        let last = upper_points.last()?.index.max(lower_points.last()?.index);
        Some(Self {
            upper: fit_trendline(upper_points),
            lower: fit_trendline(lower_points),
            start: first,
            end: last,
        })
    }

    pub fn upper_change(&self) -> f64 {
        relative_change(&self.upper, self.start, self.end)
    }

    pub fn lower_change(&self) -> f64 {
        relative_change(&self.lower, self.start, self.end)
    }

    #[inline]
    pub fn width_at(&self, index: usize) -> f64 {
        self.upper.value_at(index) - self.lower.value_at(index)
    }

    /// Width shrinks by at least `min_convergence` of the opening width
    pub fn is_converging(&self, min_convergence: f64) -> bool {
        let open = self.width_at(self.start);
        let close = self.width_at(self.end);
        open > 0.0 && close > 0.0 && close <= open * (1.0 - min_convergence)
    }

    pub fn is_parallel(&self, tolerance: f64) -> bool {
        (self.upper_change() - self.lower_change()).abs() <= tolerance
    }

    /// Replace the upper line by a horizontal level through its anchors
    pub fn flatten_upper(&mut self, tolerance: f64) {
        self.upper = fit_level(&self.upper.anchor_points, tolerance);
    }

    pub fn flatten_lower(&mut self, tolerance: f64) {
        self.lower = fit_level(&self.lower.anchor_points, tolerance);
    }

    /// All anchors of both lines ordered by bar index
    pub fn key_points(&self) -> Vec<ExtremumPoint> {
        let mut points: Vec<ExtremumPoint> = self
            .upper
            .anchor_points
            .iter()
            .chain(&self.lower.anchor_points)
            .copied()
            .collect();
        points.sort_by_key(|p| p.index);
        points
    }

    pub fn last_upper(&self) -> Option<&ExtremumPoint> {
        self.upper.anchor_points.last()
    }

    pub fn last_lower(&self) -> Option<&ExtremumPoint> {
        self.lower.anchor_points.last()
    }
}

/// Which side of the channel the leading run of extrema draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lead {
    Peaks,
    Troughs,
}

/// Enumerate channels whose leading line runs through 2..=`max_touches`
/// consecutive extrema of one kind starting at `lead[first]`, with the other
/// line through every opposite extremum after that start and before the next
/// leading extremum.
pub fn channels_from(
    structure: &PriceStructure,
    lead: Lead,
    first: usize,
    max_touches: usize,
) -> Vec<Channel> {
    let (leading, other) = match lead {
        Lead::Peaks => (&structure.peaks, &structure.troughs),
        Lead::Troughs => (&structure.troughs, &structure.peaks),
    };
    let mut out = Vec::new();
    if first >= leading.len() {
        return out;
    }

    let last = (first + max_touches.max(2) - 1).min(leading.len() - 1);
    for j in first + 1..=last {
        let run = &leading[first..=j];
        let bound = leading.get(j + 1).map_or(usize::MAX, |p| p.index);
        let opposite: Vec<ExtremumPoint> = other
            .iter()
            .filter(|p| p.index > run[0].index && p.index < bound)
            .copied()
            .collect();
        if opposite.len() < 2 {
            continue;
        }
        let channel = match lead {
            Lead::Peaks => Channel::new(run, &opposite),
            Lead::Troughs => Channel::new(&opposite, run),
        };
        out.extend(channel);
    }
    out
}

/// Walk the leading extrema left to right and keep, for each start, the
/// longest channel `accept` turns into a candidate. Starts inside an accepted
/// candidate are skipped so nested sub-formations are not reported.
pub fn scan_channels(
    structure: &PriceStructure,
    lead: Lead,
    max_touches: usize,
    mut accept: impl FnMut(&Channel) -> Option<PatternCandidate>,
) -> Vec<PatternCandidate> {
    let leading = match lead {
        Lead::Peaks => &structure.peaks,
        Lead::Troughs => &structure.troughs,
    };
    let mut out: Vec<PatternCandidate> = Vec::new();
    for (i, start) in leading.iter().enumerate() {
        if out.last().is_some_and(|c| start.index <= c.end_index) {
            continue;
        }
        let found = channels_from(structure, lead, i, max_touches)
            .iter()
            .rev()
            .find_map(&mut accept);
        out.extend(found);
    }
    out
}

// ============================================================
// POLES
// ============================================================

/// Sharp move ending at an extremum
#[derive(Debug, Clone, Copy)]
pub struct Pole {
    pub base: ExtremumPoint,
    pub tip: ExtremumPoint,
}

impl Pole {
    #[inline]
    pub fn height(&self) -> f64 {
        (self.tip.price - self.base.price).abs()
    }

    pub fn relative_move(&self) -> f64 {
        if self.base.price.abs() <= f64::EPSILON {
            0.0
        } else {
            self.height() / self.base.price.abs()
        }
    }

    pub fn direction(&self) -> Direction {
        if self.tip.price > self.base.price {
            Direction::Bullish
        } else {
            Direction::Bearish
        }
    }
}

/// Pole ending at `tip`: the opposite extreme bar within `lookback` bars before it
pub fn pole_into<T: OHLCV>(bars: &[T], tip: &ExtremumPoint, lookback: usize) -> Option<Pole> {
    let lookback = lookback.max(MIN_POLE_BARS);
    if tip.index < MIN_POLE_BARS {
        return None;
    }
    let from = tip.index.saturating_sub(lookback);
    let range = from..tip.index;
    let base = match tip.kind {
        ExtremumKind::Peak => {
            let i = range.min_by(|a, b| bars[*a].low().total_cmp(&bars[*b].low()))?;
            point_at(bars, i, ExtremumKind::Trough)
        }
        ExtremumKind::Trough => {
            let i = range.max_by(|a, b| bars[*a].high().total_cmp(&bars[*b].high()))?;
            point_at(bars, i, ExtremumKind::Peak)
        }
    };
    if tip.index - base.index < MIN_POLE_BARS - 1 {
        return None;
    }
    Some(Pole { base, tip: *tip })
}

// ============================================================
// CURVATURE
// ============================================================

/// Least-squares parabola `y = a·x² + b·x + c` over `x = 0..n`
#[derive(Debug, Clone, Copy)]
pub struct Quadratic {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub r_squared: f64,
}

impl Quadratic {
    /// x of the turning point, if the parabola curves
    pub fn vertex(&self) -> Option<f64> {
        if self.a.abs() <= f64::EPSILON {
            None
        } else {
            Some(-self.b / (2.0 * self.a))
        }
    }
}

fn det3(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

pub fn quadratic_fit(ys: &[f64]) -> Option<Quadratic> {
    let n = ys.len();
    if n < 3 {
        return None;
    }
    let (mut s1, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
    let (mut sy, mut sxy, mut sx2y) = (0.0, 0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let x = i as f64;
        let x2 = x * x;
        s1 += x;
        s2 += x2;
        s3 += x2 * x;
        s4 += x2 * x2;
        sy += y;
        sxy += x * y;
        sx2y += x2 * y;
    }
    let nf = n as f64;
    let m = [[nf, s1, s2], [s1, s2, s3], [s2, s3, s4]];
    let det = det3(m);
    if det.abs() <= f64::EPSILON {
        return None;
    }
    let rhs = [sy, sxy, sx2y];
    let solve = |col: usize| {
        let mut mm = m;
        for (row, value) in rhs.iter().enumerate() {
            mm[row][col] = *value;
        }
        det3(mm) / det
    };
    let (c, b, a) = (solve(0), solve(1), solve(2));

    let mean = sy / nf;
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let x = i as f64;
        let fitted = a * x * x + b * x + c;
        ss_res += (y - fitted).powi(2);
        ss_tot += (y - mean).powi(2);
    }
    let r_squared = if ss_tot <= f64::EPSILON {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };
    Some(Quadratic { a, b, c, r_squared })
}

// ============================================================
// TREND CONTEXT
// ============================================================

/// Direction of the close-to-close move over `lookback` bars ending at `start`
pub fn prior_direction<T: OHLCV>(
    bars: &[T],
    start: usize,
    lookback: usize,
    min_move: f64,
) -> Direction {
    if start == 0 || start >= bars.len() {
        return Direction::Neutral;
    }
    let from = start.saturating_sub(lookback.max(1));
    let first = bars[from].close();
    if first.abs() <= f64::EPSILON {
        return Direction::Neutral;
    }
    let change = (bars[start].close() - first) / first.abs();
    if change > min_move {
        Direction::Bullish
    } else if change < -min_move {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn pt(index: usize, price: f64, kind: ExtremumKind) -> ExtremumPoint {
        ExtremumPoint {
            index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            price,
            kind,
        }
    }

    #[test]
    fn test_relative_diff() {
        assert!((relative_diff(100.0, 102.0) - 2.0 / 101.0).abs() < 1e-12);
        assert_eq!(relative_diff(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_fit_level_quality() {
        let pts = [
            pt(0, 100.0, ExtremumKind::Peak),
            pt(5, 100.5, ExtremumKind::Peak),
            pt(9, 99.5, ExtremumKind::Peak),
        ];
        let level = fit_level(&pts, 0.02);
        assert_eq!(level.slope, 0.0);
        assert!((level.intercept - 100.0).abs() < 1e-12);
        // max deviation 0.5% of a 2% tolerance
        assert!((level.fit_quality - 0.75).abs() < 1e-9);

        let single = fit_level(&pts[..1], 0.02);
        assert_eq!(single.fit_quality, 1.0);
    }

    #[test]
    fn test_channel_convergence() {
        let upper = [pt(0, 110.0, ExtremumKind::Peak), pt(10, 106.0, ExtremumKind::Peak)];
        let lower = [pt(5, 96.0, ExtremumKind::Trough), pt(15, 100.0, ExtremumKind::Trough)];
        let ch = Channel::new(&upper, &lower).unwrap();
        assert_eq!((ch.start, ch.end), (0, 15));
        assert!(ch.upper_change() < 0.0);
        assert!(ch.lower_change() > 0.0);
        assert!(ch.is_converging(0.3));
        assert_eq!(ch.key_points().len(), 4);
    }

    #[test]
    fn test_quadratic_fit_recovers_parabola() {
        let ys: Vec<f64> = (0..21)
            .map(|i| {
                let x = i as f64;
                0.5 * (x - 10.0).powi(2) + 3.0
            })
            .collect();
        let q = quadratic_fit(&ys).unwrap();
        assert!((q.a - 0.5).abs() < 1e-6);
        assert!((q.vertex().unwrap() - 10.0).abs() < 1e-6);
        assert!(q.r_squared > 0.999);
    }

    #[test]
    fn test_tilt() {
        assert_eq!(tilt(0.05, 0.02), LineTilt::Rising);
        assert_eq!(tilt(-0.05, 0.02), LineTilt::Falling);
        assert_eq!(tilt(0.01, 0.02), LineTilt::Flat);
    }
}
