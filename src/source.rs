//! Seams to the collaborators around the engine: where bars come from and
//! where reconciled patterns go.
//!
//! The engine owns no storage. A [`BarSource`] either returns the stored bars
//! of a timeframe or reports them as not available (`Ok(None)`); the
//! orchestrator then falls back to a finer stored timeframe and aggregates.
//! A [`PatternSink`] receives the final records with the [`RunMetadata`] of the
//! request that produced them.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    config::DetectionConfig, mtf::MultiTimeframePattern, Bar, PatternError, Result, TimeRange,
    Timeframe,
};

// ============================================================
// BAR SOURCE
// ============================================================

/// Stored bar series, keyed by instrument and timeframe
pub trait BarSource: Sync {
    /// Bars of `timeframe` with timestamps in `range`, ordered by time.
    ///
    /// `Ok(None)` means the timeframe is not stored for this instrument.
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<Option<Vec<Bar>>>;
}

/// In-memory [`BarSource`]
#[derive(Debug, Clone, Default)]
pub struct MemoryBarSource {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl MemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bars` under their own timeframe. Bars must share one timeframe.
    pub fn insert(&mut self, instrument: impl Into<String>, bars: Vec<Bar>) -> Result<()> {
        let Some(first) = bars.first() else {
            return Err(PatternError::InsufficientData { need: 1, got: 0 });
        };
        let timeframe = first.timeframe;
        if bars.iter().any(|b| b.timeframe != timeframe) {
            return Err(PatternError::Source(format!(
                "mixed timeframes in series stored as {timeframe}"
            )));
        }
        self.series.insert((instrument.into(), timeframe), bars);
        Ok(())
    }

    pub fn with_series(mut self, instrument: impl Into<String>, bars: Vec<Bar>) -> Result<Self> {
        self.insert(instrument, bars)?;
        Ok(self)
    }

    pub fn stored_timeframes(&self, instrument: &str) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = self
            .series
            .keys()
            .filter(|(i, _)| i == instrument)
            .map(|(_, tf)| *tf)
            .collect();
        tfs.sort();
        tfs
    }
}

impl BarSource for MemoryBarSource {
    fn fetch_bars(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<Option<Vec<Bar>>> {
        Ok(self
            .series
            .get(&(instrument.to_string(), timeframe))
            .map(|bars| {
                bars.iter()
                    .filter(|b| range.contains(b.timestamp))
                    .copied()
                    .collect()
            }))
    }
}

// ============================================================
// PATTERN SINK
// ============================================================

/// Parameters a run was invoked with, published alongside its patterns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub requested_timeframes: Vec<Timeframe>,
    pub min_pattern_length: usize,
    pub peak_order: usize,
    pub min_confidence: f64,
    pub exclude_pattern_names: Vec<String>,
}

impl From<&DetectionConfig> for RunMetadata {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            requested_timeframes: config.timeframes.clone(),
            min_pattern_length: config.min_pattern_length,
            peak_order: config.peak_order,
            min_confidence: config.min_confidence,
            exclude_pattern_names: config.exclude_pattern_names.clone(),
        }
    }
}

/// Consumer of reconciled patterns. Identity and persistence are the sink's concern.
pub trait PatternSink {
    fn publish(&mut self, patterns: &[MultiTimeframePattern], metadata: &RunMetadata) -> Result<()>;
}

/// Collects published runs in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub runs: Vec<(RunMetadata, Vec<MultiTimeframePattern>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_patterns(&self) -> usize {
        self.runs.iter().map(|(_, p)| p.len()).sum()
    }
}

impl PatternSink for MemorySink {
    fn publish(&mut self, patterns: &[MultiTimeframePattern], metadata: &RunMetadata) -> Result<()> {
        self.runs.push((metadata.clone(), patterns.to_vec()));
        Ok(())
    }
}
