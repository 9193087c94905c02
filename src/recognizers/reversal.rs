//! Reversal formations: the prior move is expected to turn.
//!
//! Head and Shoulders (+ inverse), Double Top/Bottom, Triple Top/Bottom,
//! Rounding Bottom, Rising/Falling Wedge

use std::collections::HashMap;

use super::{
    helpers::{
        fit_level, highest, lowest, max_relative_deviation, point_at, project_target,
        protective_stop, quadratic_fit, relative_diff, scan_channels, spans_at_least, Lead,
    },
    PatternCandidate, PatternRecognizer,
};
use crate::{
    analysis::fit_trendline,
    params::{get_period, get_ratio, ParamMeta, ParameterizedRecognizer},
    Direction, ExtremumKind, ExtremumPoint, PatternError, PatternId, PatternType, Period,
    PriceStructure, Ratio, Result, OHLCV,
};

impl_with_defaults!(
    HeadAndShouldersRecognizer,
    DoubleTopRecognizer,
    DoubleBottomRecognizer,
    TripleTopRecognizer,
    TripleBottomRecognizer,
    RoundingBottomRecognizer,
    RisingWedgeRecognizer,
    FallingWedgeRecognizer,
);

pub const HEAD_AND_SHOULDERS: PatternId = PatternId("Head and Shoulders");
pub const INVERSE_HEAD_AND_SHOULDERS: PatternId = PatternId("Inverse Head and Shoulders");
pub const DOUBLE_TOP: PatternId = PatternId("Double Top");
pub const DOUBLE_BOTTOM: PatternId = PatternId("Double Bottom");
pub const TRIPLE_TOP: PatternId = PatternId("Triple Top");
pub const TRIPLE_BOTTOM: PatternId = PatternId("Triple Bottom");
pub const ROUNDING_BOTTOM: PatternId = PatternId("Rounding Bottom");
pub const RISING_WEDGE: PatternId = PatternId("Rising Wedge");
pub const FALLING_WEDGE: PatternId = PatternId("Falling Wedge");

// ============================================================
// HEAD AND SHOULDERS
// ============================================================

/// Three consecutive peaks, the middle one highest, shoulders at similar
/// height, neckline through the troughs between them. The inverse form is
/// read on troughs and signals bullish.
#[derive(Debug, Clone)]
pub struct HeadAndShouldersRecognizer {
    /// Max relative difference between the two shoulders
    pub shoulder_tolerance: Ratio,
    /// Min excess of the head over the higher shoulder
    pub min_head_prominence: Ratio,
}

impl Default for HeadAndShouldersRecognizer {
    fn default() -> Self {
        Self {
            shoulder_tolerance: Ratio::new_const(0.03),
            min_head_prominence: Ratio::new_const(0.01),
        }
    }
}

impl HeadAndShouldersRecognizer {
    fn scan(&self, structure: &PriceStructure, inverse: bool) -> Vec<PatternCandidate> {
        let (heads, necks, signal, name) = if inverse {
            (&structure.troughs, &structure.peaks, Direction::Bullish, INVERSE_HEAD_AND_SHOULDERS)
        } else {
            (&structure.peaks, &structure.troughs, Direction::Bearish, HEAD_AND_SHOULDERS)
        };
        let prominence = self.min_head_prominence.get();
        let mut out = Vec::new();

        for w in heads.windows(3) {
            let (ls, head, rs) = (w[0], w[1], w[2]);
            let stands_out = if inverse {
                head.price < ls.price.min(rs.price) * (1.0 - prominence)
            } else {
                head.price > ls.price.max(rs.price) * (1.0 + prominence)
            };
            if !stands_out || relative_diff(ls.price, rs.price) > self.shoulder_tolerance.get() {
                continue;
            }
            if !spans_at_least(ls.index, rs.index, structure.min_pattern_length) {
                continue;
            }

            let between = |a: &ExtremumPoint, b: &ExtremumPoint| {
                let gap = necks.iter().filter(|p| p.index > a.index && p.index < b.index);
                if inverse {
                    highest(gap)
                } else {
                    lowest(gap)
                }
            };
            let (Some(left), Some(right)) = (between(&ls, &head), between(&head, &rs)) else {
                continue;
            };

            let neckline = fit_trendline(&[left, right]);
            let height = (head.price - neckline.value_at(head.index)).abs();
            if height <= f64::EPSILON {
                continue;
            }
            let breakout = neckline.value_at(rs.index);

            out.push(PatternCandidate {
                name,
                signal,
                start_index: ls.index,
                end_index: rs.index,
                trendlines: vec![neckline],
                key_points: vec![ls, left, head, right, rs],
                breakout_price: breakout,
                target_price: project_target(breakout, height, signal),
                stop_loss_price: protective_stop(rs.price, signal),
            });
        }
        out
    }
}

impl PatternRecognizer for HeadAndShouldersRecognizer {
    fn id(&self) -> PatternId {
        HEAD_AND_SHOULDERS
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.85
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        let mut out = self.scan(structure, false);
        out.extend(self.scan(structure, true));
        out
    }
}

// ============================================================
// DOUBLE TOP / BOTTOM
// ============================================================

/// Two consecutive peaks within `price_tolerance` of each other with a
/// support level through the deepest trough between them.
#[derive(Debug, Clone)]
pub struct DoubleTopRecognizer {
    pub price_tolerance: Ratio,
    /// Min depth of the intervening trough below the peaks
    pub min_depth: Ratio,
}

impl Default for DoubleTopRecognizer {
    fn default() -> Self {
        Self {
            price_tolerance: Ratio::new_const(0.02),
            min_depth: Ratio::new_const(0.02),
        }
    }
}

/// Mirror of [`DoubleTopRecognizer`] on troughs.
#[derive(Debug, Clone)]
pub struct DoubleBottomRecognizer {
    pub price_tolerance: Ratio,
    /// Min height of the intervening peak above the troughs
    pub min_depth: Ratio,
}

impl Default for DoubleBottomRecognizer {
    fn default() -> Self {
        Self {
            price_tolerance: Ratio::new_const(0.02),
            min_depth: Ratio::new_const(0.02),
        }
    }
}

fn double_formation(
    structure: &PriceStructure,
    bottom: bool,
    tolerance: f64,
    min_depth: f64,
) -> Vec<PatternCandidate> {
    let (tests, reactions, signal, name) = if bottom {
        (&structure.troughs, &structure.peaks, Direction::Bullish, DOUBLE_BOTTOM)
    } else {
        (&structure.peaks, &structure.troughs, Direction::Bearish, DOUBLE_TOP)
    };
    let mut out = Vec::new();

    for w in tests.windows(2) {
        let (first, second) = (w[0], w[1]);
        if relative_diff(first.price, second.price) > tolerance {
            continue;
        }
        if !spans_at_least(first.index, second.index, structure.min_pattern_length) {
            continue;
        }
        let gap = reactions
            .iter()
            .filter(|p| p.index > first.index && p.index < second.index);
        let Some(reaction) = (if bottom { highest(gap) } else { lowest(gap) }) else {
            continue;
        };

        let level = (first.price + second.price) / 2.0;
        let height = (level - reaction.price).abs();
        if level.abs() <= f64::EPSILON || height / level.abs() < min_depth {
            continue;
        }

        // neckline through the reaction extremum, resistance/support through the tests
        let neckline = fit_level(&[reaction], tolerance);
        let tested = fit_trendline(&[first, second]);
        let breakout = neckline.value_at(second.index);

        out.push(PatternCandidate {
            name,
            signal,
            start_index: first.index,
            end_index: second.index,
            trendlines: vec![neckline, tested],
            key_points: vec![first, reaction, second],
            breakout_price: breakout,
            target_price: project_target(breakout, height, signal),
            stop_loss_price: protective_stop(second.price, signal),
        });
    }
    out
}

impl PatternRecognizer for DoubleTopRecognizer {
    fn id(&self) -> PatternId {
        DOUBLE_TOP
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.75
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        double_formation(
            structure,
            false,
            self.price_tolerance.get(),
            self.min_depth.get(),
        )
    }
}

impl PatternRecognizer for DoubleBottomRecognizer {
    fn id(&self) -> PatternId {
        DOUBLE_BOTTOM
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.75
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        double_formation(
            structure,
            true,
            self.price_tolerance.get(),
            self.min_depth.get(),
        )
    }
}

// ============================================================
// TRIPLE TOP / BOTTOM
// ============================================================

/// Three consecutive peaks within `price_tolerance` of their mean, neckline
/// through the two troughs separating them.
#[derive(Debug, Clone)]
pub struct TripleTopRecognizer {
    pub price_tolerance: Ratio,
    pub min_depth: Ratio,
}

impl Default for TripleTopRecognizer {
    fn default() -> Self {
        Self {
            price_tolerance: Ratio::new_const(0.025),
            min_depth: Ratio::new_const(0.02),
        }
    }
}

/// Mirror of [`TripleTopRecognizer`] on troughs.
#[derive(Debug, Clone)]
pub struct TripleBottomRecognizer {
    pub price_tolerance: Ratio,
    pub min_depth: Ratio,
}

impl Default for TripleBottomRecognizer {
    fn default() -> Self {
        Self {
            price_tolerance: Ratio::new_const(0.025),
            min_depth: Ratio::new_const(0.02),
        }
    }
}

fn triple_formation(
    structure: &PriceStructure,
    bottom: bool,
    tolerance: f64,
    min_depth: f64,
) -> Vec<PatternCandidate> {
    let (tests, reactions, signal, name) = if bottom {
        (&structure.troughs, &structure.peaks, Direction::Bullish, TRIPLE_BOTTOM)
    } else {
        (&structure.peaks, &structure.troughs, Direction::Bearish, TRIPLE_TOP)
    };
    let mut out = Vec::new();

    for w in tests.windows(3) {
        let prices = [w[0].price, w[1].price, w[2].price];
        if max_relative_deviation(&prices) > tolerance {
            continue;
        }
        if !spans_at_least(w[0].index, w[2].index, structure.min_pattern_length) {
            continue;
        }
        let reaction = |a: &ExtremumPoint, b: &ExtremumPoint| {
            let gap = reactions
                .iter()
                .filter(|p| p.index > a.index && p.index < b.index);
            if bottom {
                highest(gap)
            } else {
                lowest(gap)
            }
        };
        let (Some(r1), Some(r2)) = (reaction(&w[0], &w[1]), reaction(&w[1], &w[2])) else {
            continue;
        };

        let neckline = fit_trendline(&[r1, r2]);
        let tested = fit_level(w, tolerance);
        let level = tested.intercept;
        let height = (level - neckline.value_at(w[1].index)).abs();
        if level.abs() <= f64::EPSILON || height / level.abs() < min_depth {
            continue;
        }
        let breakout = neckline.value_at(w[2].index);

        out.push(PatternCandidate {
            name,
            signal,
            start_index: w[0].index,
            end_index: w[2].index,
            trendlines: vec![neckline, tested],
            key_points: vec![w[0], r1, w[1], r2, w[2]],
            breakout_price: breakout,
            target_price: project_target(breakout, height, signal),
            stop_loss_price: protective_stop(w[2].price, signal),
        });
    }
    out
}

impl PatternRecognizer for TripleTopRecognizer {
    fn id(&self) -> PatternId {
        TRIPLE_TOP
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.80
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        triple_formation(
            structure,
            false,
            self.price_tolerance.get(),
            self.min_depth.get(),
        )
    }
}

impl PatternRecognizer for TripleBottomRecognizer {
    fn id(&self) -> PatternId {
        TRIPLE_BOTTOM
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.80
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        triple_formation(
            structure,
            true,
            self.price_tolerance.get(),
            self.min_depth.get(),
        )
    }
}

// ============================================================
// ROUNDING BOTTOM
// ============================================================

/// Saucer between two rim peaks: closes follow an upward-opening parabola,
/// the low sits in the middle half and nothing between the rims trades above
/// the lower rim.
#[derive(Debug, Clone)]
pub struct RoundingBottomRecognizer {
    pub rim_tolerance: Ratio,
    pub min_depth: Ratio,
    /// Min R² of the parabola through the closes
    pub min_curve_fit: Ratio,
    /// Max formation length as a multiple of the minimum pattern length
    pub max_span_multiple: Period,
}

impl Default for RoundingBottomRecognizer {
    fn default() -> Self {
        Self {
            rim_tolerance: Ratio::new_const(0.10),
            min_depth: Ratio::new_const(0.05),
            min_curve_fit: Ratio::new_const(0.6),
            max_span_multiple: Period::new_const(4),
        }
    }
}

/// Bowl geometry shared by the rounding bottom and the cup
pub(crate) struct Bowl {
    pub left: ExtremumPoint,
    pub bottom: ExtremumPoint,
    pub right: ExtremumPoint,
}

impl Bowl {
    pub fn depth(&self) -> f64 {
        self.left.price.min(self.right.price) - self.bottom.price
    }
}

/// Acceptance limits for [`bowl_between`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BowlLimits {
    pub rim_tolerance: f64,
    pub min_depth: f64,
    pub max_depth: f64,
    pub min_curve_fit: f64,
}

/// Test whether `left..=right` forms a bowl
pub(crate) fn bowl_between<T: OHLCV>(
    bars: &[T],
    structure: &PriceStructure,
    left: ExtremumPoint,
    right: ExtremumPoint,
    limits: BowlLimits,
) -> Option<Bowl> {
    if relative_diff(left.price, right.price) > limits.rim_tolerance || right.index >= bars.len() {
        return None;
    }
    let rim_low = left.price.min(right.price);
    if rim_low <= f64::EPSILON
        || structure
            .peaks_between(left.index, right.index)
            .any(|p| p.price > rim_low)
    {
        return None;
    }

    let bottom_index = (left.index..=right.index)
        .min_by(|a, b| bars[*a].low().total_cmp(&bars[*b].low()))?;
    let bottom = point_at(bars, bottom_index, ExtremumKind::Trough);
    let depth = (rim_low - bottom.price) / rim_low;
    if depth < limits.min_depth || depth > limits.max_depth {
        return None;
    }

    let width = (right.index - left.index) as f64;
    let position = (bottom_index - left.index) as f64 / width;
    if !(0.25..=0.75).contains(&position) {
        return None;
    }

    let closes: Vec<f64> = bars[left.index..=right.index]
        .iter()
        .map(|b| b.close())
        .collect();
    let curve = quadratic_fit(&closes)?;
    if curve.a <= 0.0 || curve.r_squared < limits.min_curve_fit {
        return None;
    }

    Some(Bowl {
        left,
        bottom,
        right,
    })
}

impl PatternRecognizer for RoundingBottomRecognizer {
    fn id(&self) -> PatternId {
        ROUNDING_BOTTOM
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.65
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure) -> Vec<PatternCandidate> {
        let min_len = structure.min_pattern_length.max(1);
        let max_span = min_len * self.max_span_multiple.get();
        let limits = BowlLimits {
            rim_tolerance: self.rim_tolerance.get(),
            min_depth: self.min_depth.get(),
            max_depth: 1.0,
            min_curve_fit: self.min_curve_fit.get(),
        };
        let mut out = Vec::new();

        for (i, left) in structure.peaks.iter().enumerate() {
            for right in &structure.peaks[i + 1..] {
                if !spans_at_least(left.index, right.index, min_len) {
                    continue;
                }
                if right.index - left.index + 1 > max_span {
                    break;
                }
                let Some(bowl) = bowl_between(bars, structure, *left, *right, limits) else {
                    continue;
                };

                let rim = fit_trendline(&[bowl.left, bowl.right]);
                let breakout = rim.value_at(bowl.right.index);
                let height = rim.value_at(bowl.bottom.index) - bowl.bottom.price;
                // last higher low on the way up protects the setup
                let guard = structure
                    .troughs_between(bowl.bottom.index, bowl.right.index)
                    .last()
                    .copied()
                    .unwrap_or(bowl.bottom);

                out.push(PatternCandidate {
                    name: ROUNDING_BOTTOM,
                    signal: Direction::Bullish,
                    start_index: bowl.left.index,
                    end_index: bowl.right.index,
                    trendlines: vec![rim],
                    key_points: vec![bowl.left, bowl.bottom, bowl.right],
                    breakout_price: breakout,
                    target_price: project_target(breakout, height, Direction::Bullish),
                    stop_loss_price: protective_stop(guard.price, Direction::Bullish),
                });
                break;
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_depth.get() <= 0.0 {
            return Err(PatternError::InvalidValue("min_depth must be > 0"));
        }
        Ok(())
    }
}

// ============================================================
// WEDGES
// ============================================================

/// Both boundaries rising, the lower one steeper so the channel narrows.
#[derive(Debug, Clone)]
pub struct RisingWedgeRecognizer {
    /// Min relative move of each boundary over the formation
    pub min_slope: Ratio,
    /// Min narrowing as a fraction of the opening width
    pub min_convergence: Ratio,
    /// Max extrema per boundary
    pub max_touches: Period,
}

impl Default for RisingWedgeRecognizer {
    fn default() -> Self {
        Self {
            min_slope: Ratio::new_const(0.02),
            min_convergence: Ratio::new_const(0.2),
            max_touches: Period::new_const(4),
        }
    }
}

/// Both boundaries falling, the upper one steeper so the channel narrows.
#[derive(Debug, Clone)]
pub struct FallingWedgeRecognizer {
    pub min_slope: Ratio,
    pub min_convergence: Ratio,
    pub max_touches: Period,
}

impl Default for FallingWedgeRecognizer {
    fn default() -> Self {
        Self {
            min_slope: Ratio::new_const(0.02),
            min_convergence: Ratio::new_const(0.2),
            max_touches: Period::new_const(4),
        }
    }
}

fn wedge(
    structure: &PriceStructure,
    rising: bool,
    min_slope: f64,
    min_convergence: f64,
    max_touches: usize,
) -> Vec<PatternCandidate> {
    scan_channels(structure, Lead::Peaks, max_touches, |ch| {
        if !spans_at_least(ch.start, ch.end, structure.min_pattern_length) {
            return None;
        }
        let (up, down) = (ch.upper_change(), ch.lower_change());
        let sloped = if rising {
            up >= min_slope && down >= min_slope
        } else {
            up <= -min_slope && down <= -min_slope
        };
        if !sloped || !ch.is_converging(min_convergence) {
            return None;
        }

        let (name, signal, breakout, guard) = if rising {
            (RISING_WEDGE, Direction::Bearish, ch.lower.value_at(ch.end), ch.last_upper()?)
        } else {
            (FALLING_WEDGE, Direction::Bullish, ch.upper.value_at(ch.end), ch.last_lower()?)
        };
        let height = ch.width_at(ch.start);

        Some(PatternCandidate {
            name,
            signal,
            start_index: ch.start,
            end_index: ch.end,
            trendlines: vec![ch.upper.clone(), ch.lower.clone()],
            key_points: ch.key_points(),
            breakout_price: breakout,
            target_price: project_target(breakout, height, signal),
            stop_loss_price: protective_stop(guard.price, signal),
        })
    })
}

impl PatternRecognizer for RisingWedgeRecognizer {
    fn id(&self) -> PatternId {
        RISING_WEDGE
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.70
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        wedge(
            structure,
            true,
            self.min_slope.get(),
            self.min_convergence.get(),
            self.max_touches.get(),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.max_touches.get() < 2 {
            return Err(PatternError::InvalidValue("max_touches must be >= 2"));
        }
        Ok(())
    }
}

impl PatternRecognizer for FallingWedgeRecognizer {
    fn id(&self) -> PatternId {
        FALLING_WEDGE
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Reversal
    }

    fn base_confidence(&self) -> f64 {
        0.70
    }

    fn recognize<T: OHLCV>(
        &self,
        _bars: &[T],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        wedge(
            structure,
            false,
            self.min_slope.get(),
            self.min_convergence.get(),
            self.max_touches.get(),
        )
    }

    fn validate_config(&self) -> Result<()> {
        if self.max_touches.get() < 2 {
            return Err(PatternError::InvalidValue("max_touches must be >= 2"));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static HEAD_AND_SHOULDERS_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "shoulder_tolerance",
        0.03,
        (0.01, 0.06, 0.01),
        "Max relative difference between shoulders",
    ),
    ParamMeta::ratio(
        "min_head_prominence",
        0.01,
        (0.0, 0.05, 0.01),
        "Min excess of the head over the higher shoulder",
    ),
];

static DOUBLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "price_tolerance",
        0.02,
        (0.01, 0.05, 0.005),
        "Max relative difference between the two tests",
    ),
    ParamMeta::ratio(
        "min_depth",
        0.02,
        (0.01, 0.10, 0.01),
        "Min depth of the reaction between the tests",
    ),
];

static TRIPLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "price_tolerance",
        0.025,
        (0.01, 0.05, 0.005),
        "Max deviation of each test from their mean",
    ),
    ParamMeta::ratio(
        "min_depth",
        0.02,
        (0.01, 0.10, 0.01),
        "Min depth of the reactions between the tests",
    ),
];

static ROUNDING_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("rim_tolerance", 0.10, (0.02, 0.20, 0.02), "Max rim height difference"),
    ParamMeta::ratio("min_depth", 0.05, (0.02, 0.30, 0.02), "Min bowl depth below the lower rim"),
    ParamMeta::ratio("min_curve_fit", 0.6, (0.3, 0.9, 0.1), "Min R² of the parabola fit"),
    ParamMeta::period(
        "max_span_multiple",
        4.0,
        (2.0, 8.0, 1.0),
        "Max length in units of the minimum pattern length",
    ),
];

static WEDGE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("min_slope", 0.02, (0.005, 0.08, 0.005), "Min move of each boundary"),
    ParamMeta::ratio(
        "min_convergence",
        0.2,
        (0.1, 0.6, 0.1),
        "Min narrowing relative to the opening width",
    ),
    ParamMeta::period("max_touches", 4.0, (2.0, 6.0, 1.0), "Max extrema per boundary"),
];

impl ParameterizedRecognizer for HeadAndShouldersRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        HEAD_AND_SHOULDERS_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            shoulder_tolerance: get_ratio(params, "shoulder_tolerance", 0.03)?,
            min_head_prominence: get_ratio(params, "min_head_prominence", 0.01)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        HEAD_AND_SHOULDERS.0
    }
}

impl ParameterizedRecognizer for DoubleTopRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            price_tolerance: get_ratio(params, "price_tolerance", 0.02)?,
            min_depth: get_ratio(params, "min_depth", 0.02)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        DOUBLE_TOP.0
    }
}

impl ParameterizedRecognizer for DoubleBottomRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        DOUBLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            price_tolerance: get_ratio(params, "price_tolerance", 0.02)?,
            min_depth: get_ratio(params, "min_depth", 0.02)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        DOUBLE_BOTTOM.0
    }
}

impl ParameterizedRecognizer for TripleTopRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        TRIPLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            price_tolerance: get_ratio(params, "price_tolerance", 0.025)?,
            min_depth: get_ratio(params, "min_depth", 0.02)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        TRIPLE_TOP.0
    }
}

impl ParameterizedRecognizer for TripleBottomRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        TRIPLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            price_tolerance: get_ratio(params, "price_tolerance", 0.025)?,
            min_depth: get_ratio(params, "min_depth", 0.02)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        TRIPLE_BOTTOM.0
    }
}

impl ParameterizedRecognizer for RoundingBottomRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        ROUNDING_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            rim_tolerance: get_ratio(params, "rim_tolerance", 0.10)?,
            min_depth: get_ratio(params, "min_depth", 0.05)?,
            min_curve_fit: get_ratio(params, "min_curve_fit", 0.6)?,
            max_span_multiple: get_period(params, "max_span_multiple", 4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        ROUNDING_BOTTOM.0
    }
}

impl ParameterizedRecognizer for RisingWedgeRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_slope: get_ratio(params, "min_slope", 0.02)?,
            min_convergence: get_ratio(params, "min_convergence", 0.2)?,
            max_touches: get_period(params, "max_touches", 4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        RISING_WEDGE.0
    }
}

impl ParameterizedRecognizer for FallingWedgeRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        WEDGE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_slope: get_ratio(params, "min_slope", 0.02)?,
            min_convergence: get_ratio(params, "min_convergence", 0.2)?,
            max_touches: get_period(params, "max_touches", 4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        FALLING_WEDGE.0
    }
}
