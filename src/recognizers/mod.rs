//! Geometric chart pattern recognizers
//!
//! Every recognizer works on one bar series plus its [`PriceStructure`] and
//! returns raw candidates. Scoring, filtering and overlap removal happen in the
//! [`crate::detector::PatternEngine`].
//!
//! # Pattern Families
//!
//! - **Reversal (8)**: Head and Shoulders (and inverse), Double Top/Bottom,
//!   Triple Top/Bottom, Rounding Bottom, Rising/Falling Wedge
//! - **Continuation (4)**: Triangles, Flags, Pennant, Cup and Handle

use crate::{
    Direction, ExtremumPoint, PatternId, PatternType, PriceStructure, Result, Trendline, OHLCV,
};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple recognizer types.
macro_rules! impl_with_defaults {
  ($($recognizer:ty),* $(,)?) => {
    $(impl $recognizer {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod continuation;
pub mod reversal;

pub use continuation::*;
pub use reversal::*;

// ============================================================
// CANDIDATE
// ============================================================

/// Raw geometric match, before quality scoring
#[derive(Debug, Clone)]
pub struct PatternCandidate {
    /// Emitted name; may differ from the recognizer id (e.g. "Inverse Head and Shoulders")
    pub name: PatternId,
    pub signal: Direction,
    pub start_index: usize,
    pub end_index: usize,
    pub trendlines: Vec<Trendline>,
    pub key_points: Vec<ExtremumPoint>,
    pub breakout_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
}

impl PatternCandidate {
    /// Number of bars covered, both ends included
    #[inline]
    pub fn span(&self) -> usize {
        self.end_index.saturating_sub(self.start_index) + 1
    }

    /// Mean fit quality of the candidate's trendlines
    pub fn mean_fit_quality(&self) -> f64 {
        if self.trendlines.is_empty() {
            return 0.0;
        }
        self.trendlines.iter().map(|t| t.fit_quality).sum::<f64>() / self.trendlines.len() as f64
    }
}

// ============================================================
// RECOGNIZER TRAITS
// ============================================================

/// Generic recognizer trait - for concrete types
pub trait PatternRecognizer: Send + Sync {
    /// Family identifier, used for exclusion and logging
    fn id(&self) -> PatternId;
    fn pattern_type(&self) -> PatternType;
    /// Fixed reliability prior of the family
    fn base_confidence(&self) -> f64;
    fn recognize<T: OHLCV>(&self, bars: &[T], structure: &PriceStructure)
        -> Vec<PatternCandidate>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Object-safe recognizer trait - for custom recognizers
pub trait DynPatternRecognizer: Send + Sync {
    fn id(&self) -> PatternId;
    fn pattern_type(&self) -> PatternType;
    fn base_confidence(&self) -> f64;
    fn recognize(&self, bars: &[&dyn OHLCV], structure: &PriceStructure)
        -> Vec<PatternCandidate>;
    fn validate_config(&self) -> Result<()>;
}

impl<R: PatternRecognizer> DynPatternRecognizer for R {
    fn id(&self) -> PatternId {
        PatternRecognizer::id(self)
    }

    fn pattern_type(&self) -> PatternType {
        PatternRecognizer::pattern_type(self)
    }

    fn base_confidence(&self) -> f64 {
        PatternRecognizer::base_confidence(self)
    }

    fn recognize(
        &self,
        bars: &[&dyn OHLCV],
        structure: &PriceStructure,
    ) -> Vec<PatternCandidate> {
        PatternRecognizer::recognize(self, bars, structure)
    }

    fn validate_config(&self) -> Result<()> {
        PatternRecognizer::validate_config(self)
    }
}

// ============================================================
// BUILTIN RECOGNIZERS - generated via macro
// ============================================================

macro_rules! define_builtin_recognizers {
    (
        $(
            $variant:ident($recognizer:ty)
        ),* $(,)?
    ) => {
        /// All builtin recognizers - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinRecognizer {
            $($variant($recognizer)),*
        }

        impl BuiltinRecognizer {
            #[inline]
            pub fn recognize<T: OHLCV>(
                &self,
                bars: &[T],
                structure: &PriceStructure,
            ) -> Vec<PatternCandidate> {
                match self {
                    $(Self::$variant(r) => PatternRecognizer::recognize(r, bars, structure)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(r) => PatternRecognizer::id(r)),*
                }
            }

            #[inline]
            pub fn pattern_type(&self) -> PatternType {
                match self {
                    $(Self::$variant(r) => PatternRecognizer::pattern_type(r)),*
                }
            }

            #[inline]
            pub fn base_confidence(&self) -> f64 {
                match self {
                    $(Self::$variant(r) => PatternRecognizer::base_confidence(r)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(r) => PatternRecognizer::validate_config(r)),*
                }
            }
        }
    };
}

define_builtin_recognizers! {
    // Reversal (8)
    HeadAndShoulders(HeadAndShouldersRecognizer),
    DoubleTop(DoubleTopRecognizer),
    DoubleBottom(DoubleBottomRecognizer),
    TripleTop(TripleTopRecognizer),
    TripleBottom(TripleBottomRecognizer),
    RoundingBottom(RoundingBottomRecognizer),
    RisingWedge(RisingWedgeRecognizer),
    FallingWedge(FallingWedgeRecognizer),

    // Continuation (4)
    Triangle(TriangleRecognizer),
    Flag(FlagRecognizer),
    Pennant(PennantRecognizer),
    CupAndHandle(CupAndHandleRecognizer),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, TimeZone, Utc};

    use crate::{Bar, PriceStructure, Timeframe};

    /// Daily bars with closes running linearly between `(index, close)`
    /// vertices; highs and lows sit 0.5 either side of the close.
    pub fn zigzag(vertices: &[(usize, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut closes = Vec::new();
        for w in vertices.windows(2) {
            let ((i0, p0), (i1, p1)) = (w[0], w[1]);
            for i in i0..i1 {
                closes.push(p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64);
            }
        }
        if let Some(&(_, last)) = vertices.last() {
            closes.push(last);
        }
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

    /// Look-around 3, formations of at least 20 bars
    pub fn structure(bars: &[Bar]) -> PriceStructure {
        PriceStructure::new(bars, 3, 20)
    }

    pub fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }
}
