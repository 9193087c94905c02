//! Continuation formations: a pause before the prior move resumes.
//!
//! Triangles (ascending, descending, symmetrical), Bull/Bear Flag, Pennant,
//! Cup and Handle

use std::collections::HashMap;

use super::{
    helpers::{
        channels_from, highest, lowest, pole_into, prior_direction, project_target,
        protective_stop, scan_channels, spans_at_least, tilt, Channel, Lead, LineTilt, Pole,
        MIN_POLE_BARS,
    },
    reversal::{bowl_between, BowlLimits},
    PatternCandidate, PatternRecognizer,
};
use crate::{
    analysis::fit_trendline,
    params::{get_period, get_ratio, ParamMeta, ParameterizedRecognizer},
    Direction, PatternError, PatternId, PatternType, Period, PriceStructure, Ratio, Result, OHLCV,
};

impl_with_defaults!(
    TriangleRecognizer,
    FlagRecognizer,
    PennantRecognizer,
    CupAndHandleRecognizer,
);

pub const TRIANGLE: PatternId = PatternId("Triangle");
pub const ASCENDING_TRIANGLE: PatternId = PatternId("Ascending Triangle");
pub const DESCENDING_TRIANGLE: PatternId = PatternId("Descending Triangle");
pub const SYMMETRICAL_TRIANGLE: PatternId = PatternId("Symmetrical Triangle");
pub const FLAG: PatternId = PatternId("Flag");
pub const BULL_FLAG: PatternId = PatternId("Bull Flag");
pub const BEAR_FLAG: PatternId = PatternId("Bear Flag");
pub const PENNANT: PatternId = PatternId("Pennant");
pub const CUP_AND_HANDLE: PatternId = PatternId("Cup and Handle");

// ============================================================
// TRIANGLES
// ============================================================

/// Converging channel classified by which boundary is flat:
/// flat top + rising lows is ascending (bullish), falling highs + flat bottom
/// is descending (bearish), both sloping is symmetrical and takes the
/// direction of the move into it. A symmetrical triangle without a prior move
/// is not reported.
#[derive(Debug, Clone)]
pub struct TriangleRecognizer {
    /// Max relative move for a boundary to count as flat
    pub flat_tolerance: Ratio,
    pub min_convergence: Ratio,
    pub max_touches: Period,
}

impl Default for TriangleRecognizer {
    fn default() -> Self {
        Self {
            flat_tolerance: Ratio::new_const(0.02),
            min_convergence: Ratio::new_const(0.2),
            max_touches: Period::new_const(4),
        }
    }
}

impl PatternRecognizer for TriangleRecognizer {
    fn id(&self) -> PatternId {
        TRIANGLE
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.72
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure) -> Vec<PatternCandidate> {
        let flat = self.flat_tolerance.get();
        let min_len = structure.min_pattern_length;

        scan_channels(structure, Lead::Peaks, self.max_touches.get(), |ch| {
            if !spans_at_least(ch.start, ch.end, min_len) {
                return None;
            }
            let mut ch = ch.clone();
            let (name, signal) = match (tilt(ch.upper_change(), flat), tilt(ch.lower_change(), flat)) {
                (LineTilt::Flat, LineTilt::Rising) => {
                    ch.flatten_upper(flat);
                    (ASCENDING_TRIANGLE, Direction::Bullish)
                }
                (LineTilt::Falling, LineTilt::Flat) => {
                    ch.flatten_lower(flat);
                    (DESCENDING_TRIANGLE, Direction::Bearish)
                }
                // no move into it means no side to continue
                (LineTilt::Falling, LineTilt::Rising) => {
                    match prior_direction(bars, ch.start, min_len, flat) {
                        Direction::Neutral => return None,
                        signal => (SYMMETRICAL_TRIANGLE, signal),
                    }
                }
                _ => return None,
            };
            if !ch.is_converging(self.min_convergence.get()) {
                return None;
            }

            let (breakout, guard) = if signal.is_bearish() {
                (ch.lower.value_at(ch.end), highest(ch.upper.anchor_points.iter())?)
            } else {
                (ch.upper.value_at(ch.end), lowest(ch.lower.anchor_points.iter())?)
            };
            let height = ch.width_at(ch.start);

            Some(PatternCandidate {
                name,
                signal,
                start_index: ch.start,
                end_index: ch.end,
                key_points: ch.key_points(),
                trendlines: vec![ch.upper, ch.lower],
                breakout_price: breakout,
                target_price: project_target(breakout, height, signal),
                stop_loss_price: protective_stop(guard.price, signal),
            })
        })
    }

    fn validate_config(&self) -> Result<()> {
        if self.max_touches.get() < 2 {
            return Err(PatternError::InvalidValue("max_touches must be >= 2"));
        }
        Ok(())
    }
}

// ============================================================
// POLE FORMATIONS (flags, pennants)
// ============================================================

#[derive(Debug, Clone, Copy)]
struct PoleLimits {
    min_pole_move: f64,
    max_retracement: f64,
    max_touches: usize,
}

/// How far the consolidation gives back of the pole
fn retracement(pole: &Pole, ch: &Channel) -> Option<f64> {
    let height = pole.height();
    if height <= f64::EPSILON {
        return None;
    }
    let given_back = if pole.direction().is_bullish() {
        pole.tip.price - lowest(ch.lower.anchor_points.iter())?.price
    } else {
        highest(ch.upper.anchor_points.iter())?.price - pole.tip.price
    };
    Some(given_back / height)
}

/// Sharp pole into an extremum followed by a consolidation channel starting
/// at that extremum. `shape` decides whether the channel fits the family.
fn pole_formations<T: OHLCV>(
    bars: &[T],
    structure: &PriceStructure,
    limits: PoleLimits,
    shape: impl Fn(&Channel, Direction) -> bool,
    name: impl Fn(Direction) -> PatternId,
) -> Vec<PatternCandidate> {
    let min_len = structure.min_pattern_length;
    let lookback = (min_len / 2).max(MIN_POLE_BARS);
    let mut out = Vec::new();

    for (lead, tips) in [
        (Lead::Peaks, &structure.peaks),
        (Lead::Troughs, &structure.troughs),
    ] {
        let mut covered_until = None;
        for (i, tip) in tips.iter().enumerate() {
            if covered_until.is_some_and(|end| tip.index <= end) {
                continue;
            }
            let Some(pole) = pole_into(bars, tip, lookback) else {
                continue;
            };
            if pole.relative_move() < limits.min_pole_move {
                continue;
            }
            let signal = pole.direction();

            let found = channels_from(structure, lead, i, limits.max_touches)
                .into_iter()
                .rev()
                .find(|ch| {
                    spans_at_least(pole.base.index, ch.end, min_len)
                        && shape(ch, signal)
                        && retracement(&pole, ch).is_some_and(|r| r <= limits.max_retracement)
                });
            let Some(ch) = found else {
                continue;
            };

            let (breakout, guard) = if signal.is_bullish() {
                (ch.upper.value_at(ch.end), lowest(ch.lower.anchor_points.iter()))
            } else {
                (ch.lower.value_at(ch.end), highest(ch.upper.anchor_points.iter()))
            };
            let Some(guard) = guard else {
                continue;
            };
            covered_until = Some(ch.end);

            let mut key_points = vec![pole.base];
            key_points.extend(ch.key_points());
            out.push(PatternCandidate {
                name: name(signal),
                signal,
                start_index: pole.base.index,
                end_index: ch.end,
                trendlines: vec![ch.upper, ch.lower],
                key_points,
                breakout_price: breakout,
                target_price: project_target(breakout, pole.height(), signal),
                stop_loss_price: protective_stop(guard.price, signal),
            });
        }
    }
    out
}

/// Sharp pole followed by a small parallel channel drifting flat or against
/// the pole.
#[derive(Debug, Clone)]
pub struct FlagRecognizer {
    /// Min pole move relative to its base price
    pub min_pole_move: Ratio,
    /// Max share of the pole the flag may give back
    pub max_retracement: Ratio,
    /// Max difference between the boundary moves
    pub parallel_tolerance: Ratio,
    pub max_touches: Period,
}

impl Default for FlagRecognizer {
    fn default() -> Self {
        Self {
            min_pole_move: Ratio::new_const(0.05),
            max_retracement: Ratio::new_const(0.5),
            parallel_tolerance: Ratio::new_const(0.03),
            max_touches: Period::new_const(3),
        }
    }
}

impl PatternRecognizer for FlagRecognizer {
    fn id(&self) -> PatternId {
        FLAG
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.68
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure) -> Vec<PatternCandidate> {
        let tol = self.parallel_tolerance.get();
        let limits = PoleLimits {
            min_pole_move: self.min_pole_move.get(),
            max_retracement: self.max_retracement.get(),
            max_touches: self.max_touches.get(),
        };
        pole_formations(
            bars,
            structure,
            limits,
            |ch, signal| {
                let (up, down) = (ch.upper_change(), ch.lower_change());
                let drifts_against = if signal.is_bullish() {
                    up <= tol && down <= tol
                } else {
                    up >= -tol && down >= -tol
                };
                drifts_against && ch.is_parallel(tol)
            },
            |signal| if signal.is_bullish() { BULL_FLAG } else { BEAR_FLAG },
        )
    }
}

/// Sharp pole followed by a small converging consolidation.
#[derive(Debug, Clone)]
pub struct PennantRecognizer {
    pub min_pole_move: Ratio,
    pub max_retracement: Ratio,
    pub min_convergence: Ratio,
    pub max_touches: Period,
}

impl Default for PennantRecognizer {
    fn default() -> Self {
        Self {
            min_pole_move: Ratio::new_const(0.05),
            max_retracement: Ratio::new_const(0.5),
            min_convergence: Ratio::new_const(0.3),
            max_touches: Period::new_const(4),
        }
    }
}

impl PatternRecognizer for PennantRecognizer {
    fn id(&self) -> PatternId {
        PENNANT
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.65
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure) -> Vec<PatternCandidate> {
        let min_convergence = self.min_convergence.get();
        let limits = PoleLimits {
            min_pole_move: self.min_pole_move.get(),
            max_retracement: self.max_retracement.get(),
            max_touches: self.max_touches.get(),
        };
        pole_formations(
            bars,
            structure,
            limits,
            |ch, _| {
                ch.upper_change() < 0.0
                    && ch.lower_change() > 0.0
                    && ch.is_converging(min_convergence)
            },
            |_| PENNANT,
        )
    }
}

// ============================================================
// CUP AND HANDLE
// ============================================================

/// U-shaped cup between two rims at similar height, then a shallow pullback
/// (the handle) within half the cup's width.
#[derive(Debug, Clone)]
pub struct CupAndHandleRecognizer {
    pub rim_tolerance: Ratio,
    pub min_depth: Ratio,
    pub max_depth: Ratio,
    /// Max share of the cup depth the handle may retrace
    pub max_handle_retracement: Ratio,
    pub min_curve_fit: Ratio,
}

impl Default for CupAndHandleRecognizer {
    fn default() -> Self {
        Self {
            rim_tolerance: Ratio::new_const(0.05),
            min_depth: Ratio::new_const(0.08),
            max_depth: Ratio::new_const(0.5),
            max_handle_retracement: Ratio::new_const(0.5),
            min_curve_fit: Ratio::new_const(0.5),
        }
    }
}

impl PatternRecognizer for CupAndHandleRecognizer {
    fn id(&self) -> PatternId {
        CUP_AND_HANDLE
    }

    fn pattern_type(&self) -> PatternType {
        PatternType::Continuation
    }

    fn base_confidence(&self) -> f64 {
        0.78
    }

    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure) -> Vec<PatternCandidate> {
        let limits = BowlLimits {
            rim_tolerance: self.rim_tolerance.get(),
            min_depth: self.min_depth.get(),
            max_depth: self.max_depth.get(),
            min_curve_fit: self.min_curve_fit.get(),
        };
        let mut out = Vec::new();
        let mut covered_until = None;

        for (i, left) in structure.peaks.iter().enumerate() {
            if covered_until.is_some_and(|end| left.index <= end) {
                continue;
            }
            for right in &structure.peaks[i + 1..] {
                if right.index <= left.index + 2 {
                    continue;
                }
                let Some(bowl) = bowl_between(bars, structure, *left, *right, limits) else {
                    continue;
                };
                let depth = bowl.depth();
                let reach = right.index + (right.index - left.index) / 2;
                let Some(handle) = structure
                    .troughs
                    .iter()
                    .find(|t| t.index > right.index && t.index <= reach)
                    .copied()
                else {
                    continue;
                };
                let retrace = (right.price - handle.price) / depth;
                if retrace <= 0.0
                    || retrace > self.max_handle_retracement.get()
                    || handle.price <= bowl.bottom.price
                {
                    continue;
                }
                if !spans_at_least(left.index, handle.index, structure.min_pattern_length) {
                    continue;
                }

                let rim = fit_trendline(&[bowl.left, bowl.right]);
                let breakout = rim.value_at(handle.index);
                covered_until = Some(handle.index);
                out.push(PatternCandidate {
                    name: CUP_AND_HANDLE,
                    signal: Direction::Bullish,
                    start_index: bowl.left.index,
                    end_index: handle.index,
                    trendlines: vec![rim],
                    key_points: vec![bowl.left, bowl.bottom, bowl.right, handle],
                    breakout_price: breakout,
                    target_price: project_target(breakout, depth, Direction::Bullish),
                    stop_loss_price: protective_stop(handle.price, Direction::Bullish),
                });
                break;
            }
        }
        out
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_depth.get() >= self.max_depth.get() {
            return Err(PatternError::InvalidConfig(
                "cup min_depth must be below max_depth".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETER METADATA
// ============================================================

static TRIANGLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("flat_tolerance", 0.02, (0.005, 0.05, 0.005), "Max move of a flat boundary"),
    ParamMeta::ratio(
        "min_convergence",
        0.2,
        (0.1, 0.6, 0.1),
        "Min narrowing relative to the opening width",
    ),
    ParamMeta::period("max_touches", 4.0, (2.0, 6.0, 1.0), "Max extrema per boundary"),
];

static FLAG_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("min_pole_move", 0.05, (0.02, 0.15, 0.01), "Min pole move"),
    ParamMeta::ratio(
        "max_retracement",
        0.5,
        (0.2, 0.7, 0.1),
        "Max share of the pole given back",
    ),
    ParamMeta::ratio(
        "parallel_tolerance",
        0.03,
        (0.01, 0.06, 0.01),
        "Max difference between boundary moves",
    ),
    ParamMeta::period("max_touches", 3.0, (2.0, 5.0, 1.0), "Max extrema per boundary"),
];

static PENNANT_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("min_pole_move", 0.05, (0.02, 0.15, 0.01), "Min pole move"),
    ParamMeta::ratio(
        "max_retracement",
        0.5,
        (0.2, 0.7, 0.1),
        "Max share of the pole given back",
    ),
    ParamMeta::ratio("min_convergence", 0.3, (0.1, 0.7, 0.1), "Min narrowing of the pennant"),
    ParamMeta::period("max_touches", 4.0, (2.0, 6.0, 1.0), "Max extrema per boundary"),
];

static CUP_AND_HANDLE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("rim_tolerance", 0.05, (0.01, 0.10, 0.01), "Max rim height difference"),
    ParamMeta::ratio("min_depth", 0.08, (0.03, 0.20, 0.01), "Min cup depth"),
    ParamMeta::ratio("max_depth", 0.5, (0.2, 0.6, 0.05), "Max cup depth"),
    ParamMeta::ratio(
        "max_handle_retracement",
        0.5,
        (0.2, 0.6, 0.05),
        "Max share of the cup the handle retraces",
    ),
    ParamMeta::ratio("min_curve_fit", 0.5, (0.3, 0.9, 0.1), "Min R² of the cup parabola"),
];

impl ParameterizedRecognizer for TriangleRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        TRIANGLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            flat_tolerance: get_ratio(params, "flat_tolerance", 0.02)?,
            min_convergence: get_ratio(params, "min_convergence", 0.2)?,
            max_touches: get_period(params, "max_touches", 4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        TRIANGLE.0
    }
}

impl ParameterizedRecognizer for FlagRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        FLAG_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_pole_move: get_ratio(params, "min_pole_move", 0.05)?,
            max_retracement: get_ratio(params, "max_retracement", 0.5)?,
            parallel_tolerance: get_ratio(params, "parallel_tolerance", 0.03)?,
            max_touches: get_period(params, "max_touches", 3)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        FLAG.0
    }
}

impl ParameterizedRecognizer for PennantRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        PENNANT_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_pole_move: get_ratio(params, "min_pole_move", 0.05)?,
            max_retracement: get_ratio(params, "max_retracement", 0.5)?,
            min_convergence: get_ratio(params, "min_convergence", 0.3)?,
            max_touches: get_period(params, "max_touches", 4)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        PENNANT.0
    }
}

impl ParameterizedRecognizer for CupAndHandleRecognizer {
    fn param_meta() -> &'static [ParamMeta] {
        CUP_AND_HANDLE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            rim_tolerance: get_ratio(params, "rim_tolerance", 0.05)?,
            min_depth: get_ratio(params, "min_depth", 0.08)?,
            max_depth: get_ratio(params, "max_depth", 0.5)?,
            max_handle_retracement: get_ratio(params, "max_handle_retracement", 0.5)?,
            min_curve_fit: get_ratio(params, "min_curve_fit", 0.5)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        CUP_AND_HANDLE.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizers::fixtures::{close_to, structure, zigzag};

    fn run<R: PatternRecognizer>(recognizer: &R, vertices: &[(usize, f64)]) -> Vec<PatternCandidate> {
        let bars = zigzag(vertices);
        recognizer.recognize(&bars, &structure(&bars))
    }

    const BULL_FLAG_PATH: &[(usize, f64)] = &[
        (0, 100.0),
        (10, 120.0),
        (14, 116.0),
        (18, 119.0),
        (22, 115.0),
        (26, 118.0),
        (30, 114.0),
        (34, 130.0),
    ];

    // ============================================================
    // TRIANGLES
    // ============================================================

    #[test]
    fn test_descending_triangle() {
        let found = run(
            &TriangleRecognizer::default(),
            &[
                (0, 125.0),
                (6, 110.0),
                (12, 120.0),
                (18, 110.0),
                (24, 116.0),
                (30, 110.0),
                (36, 113.0),
                (44, 110.5),
            ],
        );
        assert_eq!(found.len(), 1);
        let tri = &found[0];

        assert_eq!(tri.name, DESCENDING_TRIANGLE);
        assert_eq!(tri.signal, Direction::Bearish);
        assert_eq!((tri.start_index, tri.end_index), (12, 36));
        assert_eq!(tri.trendlines[1].slope, 0.0);
        assert!(close_to(tri.breakout_price, 109.5));
        assert!(tri.target_price < tri.breakout_price);
        assert!(close_to(tri.stop_loss_price, 120.5 * 1.005));
    }

    #[test]
    fn test_symmetrical_triangle_follows_prior_move() {
        let found = run(
            &TriangleRecognizer::default(),
            &[
                (0, 80.0),
                (10, 110.0),
                (16, 96.0),
                (22, 106.0),
                (28, 100.0),
                (34, 104.0),
                (40, 101.0),
                (44, 103.0),
            ],
        );
        assert_eq!(found.len(), 1);
        let tri = &found[0];

        assert_eq!(tri.name, SYMMETRICAL_TRIANGLE);
        assert_eq!(tri.signal, Direction::Bullish);
        assert_eq!((tri.start_index, tri.end_index), (10, 40));
        // upper line at the last bar
        assert!(close_to(tri.breakout_price, 308.0 / 3.0));
        assert!(tri.target_price > tri.breakout_price);
        assert!(close_to(tri.stop_loss_price, 95.5 * 0.995));
    }

    #[test]
    fn test_symmetrical_triangle_without_prior_move_is_dropped() {
        let found = run(
            &TriangleRecognizer::default(),
            &[
                (0, 108.5),
                (10, 110.0),
                (16, 96.0),
                (22, 106.0),
                (28, 100.0),
                (34, 104.0),
                (40, 101.0),
                (44, 103.0),
            ],
        );
        assert!(found.is_empty());
    }

    // ============================================================
    // FLAGS AND PENNANTS
    // ============================================================

    #[test]
    fn test_bull_flag() {
        let found = run(&FlagRecognizer::default(), BULL_FLAG_PATH);
        assert_eq!(found.len(), 1);
        let flag = &found[0];

        assert_eq!(flag.name, BULL_FLAG);
        assert_eq!(flag.signal, Direction::Bullish);
        assert_eq!((flag.start_index, flag.end_index), (0, 30));
        assert_eq!(flag.key_points[0].index, 0);
        assert!(close_to(flag.breakout_price, 118.0));
        // pole of 21 projected from the breakout
        assert!(close_to(flag.target_price, 139.0));
        assert!(close_to(flag.stop_loss_price, 113.5 * 0.995));
    }

    #[test]
    fn test_bear_flag() {
        let found = run(
            &FlagRecognizer::default(),
            &[
                (0, 120.0),
                (10, 100.0),
                (14, 104.0),
                (18, 101.0),
                (22, 105.0),
                (26, 102.0),
                (30, 106.0),
                (34, 90.0),
            ],
        );
        assert_eq!(found.len(), 1);
        let flag = &found[0];

        assert_eq!(flag.name, BEAR_FLAG);
        assert_eq!(flag.signal, Direction::Bearish);
        assert_eq!((flag.start_index, flag.end_index), (0, 30));
        assert!(close_to(flag.breakout_price, 102.0));
        assert!(close_to(flag.target_price, 81.0));
        assert!(close_to(flag.stop_loss_price, 106.5 * 1.005));
    }

    #[test]
    fn test_flag_retracing_too_far_is_rejected() {
        // the consolidation gives back over two thirds of the pole
        let found = run(
            &FlagRecognizer::default(),
            &[
                (0, 100.0),
                (10, 120.0),
                (14, 108.0),
                (18, 119.0),
                (22, 107.0),
                (26, 118.0),
                (30, 106.0),
                (34, 130.0),
            ],
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_pennant() {
        let found = run(
            &PennantRecognizer::default(),
            &[
                (0, 100.0),
                (10, 120.0),
                (14, 112.0),
                (18, 118.0),
                (22, 114.0),
                (26, 116.5),
                (30, 115.0),
                (34, 125.0),
            ],
        );
        assert_eq!(found.len(), 1);
        let pennant = &found[0];

        assert_eq!(pennant.name, PENNANT);
        assert_eq!(pennant.signal, Direction::Bullish);
        assert_eq!((pennant.start_index, pennant.end_index), (0, 30));
        assert!(pennant.trendlines[0].slope < 0.0 && pennant.trendlines[1].slope > 0.0);
        assert!(close_to(pennant.target_price - pennant.breakout_price, 21.0));
        assert!(close_to(pennant.stop_loss_price, 111.5 * 0.995));
    }

    #[test]
    fn test_parallel_flag_is_not_a_pennant() {
        assert!(run(&PennantRecognizer::default(), BULL_FLAG_PATH).is_empty());
    }

    // ============================================================
    // CUP AND HANDLE
    // ============================================================

    #[test]
    fn test_cup_and_handle() {
        let found = run(
            &CupAndHandleRecognizer::default(),
            &[(0, 110.0), (5, 120.0), (17, 100.0), (29, 120.0), (33, 115.0), (37, 125.0)],
        );
        assert_eq!(found.len(), 1);
        let cup = &found[0];

        assert_eq!(cup.name, CUP_AND_HANDLE);
        assert_eq!(cup.signal, Direction::Bullish);
        assert_eq!((cup.start_index, cup.end_index), (5, 33));
        let marks: Vec<usize> = cup.key_points.iter().map(|p| p.index).collect();
        assert_eq!(marks, vec![5, 17, 29, 33]);
        assert!(close_to(cup.breakout_price, 120.5));
        // cup depth of 21 above the rim
        assert!(close_to(cup.target_price, 141.5));
        assert!(close_to(cup.stop_loss_price, 114.5 * 0.995));
    }

    #[test]
    fn test_deep_handle_is_rejected() {
        let found = run(
            &CupAndHandleRecognizer::default(),
            &[(0, 110.0), (5, 120.0), (17, 100.0), (29, 120.0), (33, 106.0), (37, 125.0)],
        );
        assert!(found.is_empty());
    }
}
