//! # chartwise - multi-timeframe chart pattern detection
//!
//! Detects geometric chart formations (head-and-shoulders, double/triple tops,
//! triangles, wedges, flags, cup-and-handle, ...) on OHLCV bars, scores their
//! reliability, and cross-checks the same wall-clock window on several bar
//! granularities to separate one-timeframe coincidences from formations that are
//! confirmed at multiple resolutions.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartwise::prelude::*;
//! use chrono::{TimeZone, Utc};
//!
//! # fn main() -> chartwise::Result<()> {
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let hourly: Vec<Bar> = (0..24 * 90)
//!     .map(|i| {
//!         let price = 100.0 + (i as f64 / 40.0).sin() * 5.0;
//!         Bar::new(
//!             start + chrono::Duration::hours(i),
//!             price,
//!             price + 0.5,
//!             price - 0.5,
//!             price + 0.1,
//!             1_000.0,
//!             Timeframe::H1,
//!         )
//!     })
//!     .collect();
//!
//! let config = DetectionConfig {
//!     timeframes: vec![Timeframe::H4, Timeframe::D1],
//!     min_pattern_length: 10,
//!     peak_order: 3,
//!     ..DetectionConfig::default()
//! };
//!
//! let detector = MultiTimeframeDetector::new(
//!     EngineBuilder::new().with_all_defaults().build()?,
//!     config,
//! )?;
//! let patterns = detector.detect_multi_timeframe(&hourly)?;
//! for p in &patterns {
//!     assert!(p.adjusted_confidence <= 0.95);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod detector;
pub mod logging;
pub mod mtf;
pub mod params;
pub mod recognizers;
pub mod source;
pub mod timeframe;
pub mod volume;

pub use analysis::{ExtremumKind, ExtremumPoint, PriceStructure, Trendline};
pub use timeframe::{TimeRange, Timeframe};

pub mod prelude {
    pub use crate::{
        // Aggregation
        aggregate::{Aggregated, BarAggregator},
        // Analysis
        analysis::{find_extrema, fit_trendline, linear_regression, Regression},
        // Configuration
        config::{DetectionConfig, ScoringConfig},
        // Single timeframe
        detector::{detect_parallel, DetectParams, EngineBuilder, PatternEngine},
        // Multi timeframe
        mtf::{
            adjusted_confidence, scale_min_pattern_length, scale_peak_order,
            MultiTimeframeDetector, MultiTimeframePattern,
        },
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, ParameterizedRecognizer},
        // Recognizers
        recognizers::*,
        // Collaborators
        source::{BarSource, MemoryBarSource, MemorySink, PatternSink, RunMetadata},
        // Volume
        volume::{
            VolumeAnalyzer, VolumeContext, VolumeProfile, VolumeQuality, VolumeScore,
            VolumeTrend, VwapPosition,
        },
        // Types
        Bar,
        DetectedPattern,
        Direction,
        ExtremumKind,
        ExtremumPoint,
        OHLCVExt,
        PatternError,
        PatternId,
        PatternType,
        Period,
        PriceStructure,
        Ratio,
        Result,
        TimeRange,
        Timeframe,
        Trendline,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during aggregation, detection or reconciliation
#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Request timed out after {elapsed_ms} ms (limit {limit_ms} ms)")]
    Timeout { elapsed_ms: u128, limit_ms: u64 },

    #[error("Bar source failure: {0}")]
    Source(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn timestamp(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn timestamp(&self) -> DateTime<Utc> {
        (*self).timestamp()
    }

    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// (high + low + close) / 3, the price VWAP and volume profiles are built on
    #[inline]
    fn typical_price(&self) -> f64 {
        (self.high() + self.low() + self.close()) / 3.0
    }

    /// Validate OHLCV data consistency:
    /// `low <= min(open, close) <= max(open, close) <= high` and `volume >= 0`
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if self.low() > self.open().min(self.close()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "low above body",
            });
        }
        if self.high() < self.open().max(self.close()) {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "high below body",
            });
        }
        if self.volume() < 0.0 {
            return Err(PatternError::InvalidOHLCV {
                index: 0,
                reason: "negative volume",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate a whole series, reporting the offending bar index
pub fn validate_bars<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PatternError::InvalidOHLCV { reason, .. } => {
                PatternError::InvalidOHLCV { index: i, reason }
            }
            other => other,
        })?;
    }
    Ok(())
}

// ============================================================
// BAR
// ============================================================

/// One OHLCV record for a fixed time bucket. `timestamp` is the bucket start.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timeframe: Timeframe,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            timeframe,
        }
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// DETECTED PATTERN
// ============================================================

/// Unique identifier (display name) of a chart pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PatternId(pub &'static str);

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Direction/bias of a pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Whether a pattern forecasts a turn or a resumption of the prior move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Reversal,
    Continuation,
}

/// A formation found on one timeframe.
///
/// Read-only once produced; reconciliation across timeframes creates a new
/// [`mtf::MultiTimeframePattern`] rather than mutating it.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedPattern {
    pub pattern_name: PatternId,
    pub pattern_type: PatternType,
    pub signal: Direction,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_index: usize,
    pub end_index: usize,
    pub trendlines: Vec<Trendline>,
    pub key_points: Vec<ExtremumPoint>,
    pub breakout_price: f64,
    pub target_price: f64,
    pub stop_loss_price: f64,
    /// Fixed reliability prior of the pattern family
    pub base_confidence: f64,
    /// Weighted multi-factor quality 0.0..=1.0
    pub quality_score: f64,
    /// Confidence derived from `quality_score`, compared against `min_confidence`
    pub confidence: f64,
    pub timeframe: Timeframe,
}

impl DetectedPattern {
    /// Wall-clock interval covered, extended to the close of the last bar
    pub fn interval(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time + self.timeframe.duration())
    }
}

// ============================================================
// TESTS
// ============================================================
