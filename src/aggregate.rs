//! Derive coarser bar series from a finer base series.
//!
//! Per bucket: open of the first bar, max of highs, min of lows, close of the
//! last bar, sum of volumes, timestamp = bucket start. A trailing bucket that the
//! base series does not cover to its end is never mixed with complete buckets:
//! [`BarAggregator::aggregate`] drops it, [`BarAggregator::aggregate_with_tail`]
//! returns it separately.

use tracing::trace;

use crate::{validate_bars, Bar, PatternError, Result, TimeRange, Timeframe};

/// Output of [`BarAggregator::aggregate_with_tail`]
#[derive(Debug, Clone, Default)]
pub struct Aggregated {
    /// Complete buckets, strictly increasing in timestamp
    pub bars: Vec<Bar>,
    /// Trailing bucket not fully covered by the base series
    pub partial: Option<Bar>,
}

impl Aggregated {
    pub fn total_volume(&self) -> f64 {
        self.bars.iter().map(|b| b.volume).sum::<f64>()
            + self.partial.map(|b| b.volume).unwrap_or(0.0)
    }
}

/// Pure bar aggregation. Holds no state beyond its validation switch.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    validate: bool,
}

impl Default for BarAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl BarAggregator {
    pub fn new() -> Self {
        Self { validate: true }
    }

    /// Skip OHLC/ordering checks for series already validated upstream.
    pub fn without_validation() -> Self {
        Self { validate: false }
    }

    /// Aggregate `base` into `target`, dropping an incomplete trailing bucket.
    pub fn aggregate(&self, base: &[Bar], target: Timeframe) -> Result<Vec<Bar>> {
        Ok(self.aggregate_with_tail(base, target)?.bars)
    }

    /// Aggregate only the base bars whose timestamp falls in `range`.
    ///
    /// An empty base series is an error; a non-empty series with nothing inside
    /// the window yields an empty result.
    pub fn aggregate_range(
        &self,
        base: &[Bar],
        target: Timeframe,
        range: &TimeRange,
    ) -> Result<Vec<Bar>> {
        if base.is_empty() {
            return Err(PatternError::InsufficientData { need: 1, got: 0 });
        }
        let windowed: Vec<Bar> = base
            .iter()
            .filter(|b| range.contains(b.timestamp))
            .copied()
            .collect();
        if windowed.is_empty() {
            trace!(target_tf = %target, "no base bars inside aggregation window");
            return Ok(Vec::new());
        }
        self.aggregate(&windowed, target)
    }

    /// Aggregate `base` into `target`, returning the trailing partial bucket separately.
    pub fn aggregate_with_tail(&self, base: &[Bar], target: Timeframe) -> Result<Aggregated> {
        let first = base
            .first()
            .ok_or(PatternError::InsufficientData { need: 1, got: 0 })?;
        let base_tf = first.timeframe;

        if !target.is_multiple_of(base_tf) {
            return Err(PatternError::InvalidConfig(format!(
                "cannot aggregate {base_tf} bars into {target}"
            )));
        }
        if self.validate {
            self.check_series(base, base_tf)?;
        }
        if target == base_tf {
            return Ok(Aggregated {
                bars: base.to_vec(),
                partial: None,
            });
        }

        let mut bars: Vec<Bar> = Vec::with_capacity(base.len() / 2 + 1);
        let mut current: Option<Bar> = None;

        for bar in base {
            let bucket = target.bucket_start(bar.timestamp);
            match current.as_mut() {
                Some(agg) if agg.timestamp == bucket => {
                    agg.high = agg.high.max(bar.high);
                    agg.low = agg.low.min(bar.low);
                    agg.close = bar.close;
                    agg.volume += bar.volume;
                }
                _ => {
                    if let Some(done) = current.take() {
                        bars.push(done);
                    }
                    current = Some(Bar::new(
                        bucket, bar.open, bar.high, bar.low, bar.close, bar.volume, target,
                    ));
                }
            }
        }

        let mut partial = None;
        if let Some(last) = current {
            let last_base = base[base.len() - 1];
            let covered_until = last_base.timestamp + base_tf.duration();
            let bucket_end = last.timestamp + target.duration();
            if covered_until >= bucket_end {
                bars.push(last);
            } else {
                trace!(
                    target_tf = %target,
                    bucket = %last.timestamp,
                    "trailing bucket incomplete"
                );
                partial = Some(last);
            }
        }

        Ok(Aggregated { bars, partial })
    }

    fn check_series(&self, base: &[Bar], base_tf: Timeframe) -> Result<()> {
        validate_bars(base)?;
        for (i, pair) in base.windows(2).enumerate() {
            if pair[1].timeframe != base_tf {
                return Err(PatternError::InvalidOHLCV {
                    index: i + 1,
                    reason: "mixed timeframes in base series",
                });
            }
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(PatternError::InvalidOHLCV {
                    index: i + 1,
                    reason: "timestamps not strictly increasing",
                });
            }
        }
        Ok(())
    }
}
