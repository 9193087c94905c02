//! Bar granularities and time windows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::PatternError;

const SECONDS_PER_DAY: i64 = 86_400;
/// 1970-01-01 was a Thursday; weeks are aligned to Monday 00:00 UTC.
const WEEK_ALIGN_OFFSET: i64 = 3 * SECONDS_PER_DAY;

/// Bucket duration of a bar series, ordered from finest to coarsest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    /// Returns all timeframes from finest to coarsest.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
            Timeframe::W1,
        ]
    }

    pub fn seconds(self) -> i64 {
        match self {
            Timeframe::M15 => 15 * 60,
            Timeframe::H1 => 60 * 60,
            Timeframe::H4 => 4 * 60 * 60,
            Timeframe::D1 => SECONDS_PER_DAY,
            Timeframe::W1 => 7 * SECONDS_PER_DAY,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Natural bar density: how many bars of this timeframe cover one day.
    pub fn bars_per_day(self) -> f64 {
        SECONDS_PER_DAY as f64 / self.seconds() as f64
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn parse(value: &str) -> Result<Self, PatternError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "15m" | "15min" => Ok(Timeframe::M15),
            "1h" | "60m" | "hourly" => Ok(Timeframe::H1),
            "4h" | "240m" => Ok(Timeframe::H4),
            "1d" | "d" | "daily" => Ok(Timeframe::D1),
            "1w" | "w" | "weekly" => Ok(Timeframe::W1),
            _ => Err(PatternError::InvalidConfig(format!(
                "unknown timeframe: {value}"
            ))),
        }
    }

    /// Start of the bucket containing `ts`.
    ///
    /// Intraday buckets are aligned to the epoch, daily buckets to UTC midnight,
    /// weekly buckets to Monday 00:00 UTC.
    pub fn bucket_start(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let width = self.seconds();
        let start = match self {
            Timeframe::W1 => {
                (secs + WEEK_ALIGN_OFFSET).div_euclid(width) * width - WEEK_ALIGN_OFFSET
            }
            _ => secs.div_euclid(width) * width,
        };
        DateTime::from_timestamp(start, 0).unwrap_or(ts)
    }

    /// True when every bucket of `self` is an exact union of buckets of `finer`.
    pub fn is_multiple_of(self, finer: Timeframe) -> bool {
        self >= finer && self.seconds() % finer.seconds() == 0
    }

    /// Strictly finer timeframes, nearest first.
    pub fn finer(self) -> impl Iterator<Item = Timeframe> {
        Timeframe::all()
            .iter()
            .rev()
            .copied()
            .filter(move |tf| *tf < self)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Timeframe {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::parse(s)
    }
}

/// Half-open wall-clock window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration(&self) -> Duration {
        (self.end - self.start).max(Duration::zero())
    }

    /// Length of the intersection with `other`.
    pub fn overlap(&self, other: &TimeRange) -> Duration {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end - start).max(Duration::zero())
    }

    /// Intersection length as a fraction of the shorter of the two windows.
    ///
    /// Two empty windows at the same instant count as a full overlap.
    pub fn overlap_fraction(&self, other: &TimeRange) -> f64 {
        let shorter = self.duration().min(other.duration());
        if shorter <= Duration::zero() {
            return if self.start == other.start { 1.0 } else { 0.0 };
        }
        let overlap = self.overlap(other).num_seconds() as f64;
        (overlap / shorter.num_seconds() as f64).clamp(0.0, 1.0)
    }
}
