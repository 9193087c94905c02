//! Parameter metadata for pattern recognizers
//!
//! Geometric thresholds (price tolerances, convergence, pole size, ...) are
//! tunable. This module describes them so callers can:
//! - Run a grid search over recognizer thresholds
//! - Document and validate user-supplied values
//! - Build recognizers from a flat name/value map
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use chartwise::params::ParameterizedRecognizer;
//! use chartwise::prelude::*;
//!
//! for param in DoubleTopRecognizer::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut values = HashMap::new();
//! values.insert("price_tolerance", 0.015);
//! let tight = DoubleTopRecognizer::with_params(&values).unwrap();
//! assert_eq!(tight.price_tolerance.get(), 0.015);
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction of price or of a formation's height (0.0..=1.0)
  Ratio,
  /// Count of bars or extrema (positive integer)
  Period,
}

/// Metadata for a single recognizer parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "price_tolerance")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    if step <= 0.0 {
      return values;
    }
    let mut k = 0u32;
    loop {
      let v = min + step * f64::from(k);
      if v > max + step * 1e-9 {
        break;
      }
      values.push(v);
      k += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED RECOGNIZER TRAIT
// ============================================================

/// Recognizers whose thresholds can be discovered and set by name
pub trait ParameterizedRecognizer: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a recognizer from a name/value map
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Returns the pattern family name
  fn pattern_id_str() -> &'static str;

  /// Like [`ParameterizedRecognizer::with_params`] but rejects unknown names and
  /// values outside the documented ranges
  fn with_checked_params(params: &HashMap<&str, f64>) -> Result<Self> {
    check_params(Self::param_meta(), params)?;
    Self::with_params(params)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value.is_nan() || value < 0.0 {
    return Err(PatternError::InvalidValue("Period must be > 0"));
  }
  Period::new(value as usize)
}

/// Every supplied name must be described by `meta` and lie in its range
pub fn check_params(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for (name, value) in params {
    let m = meta
      .iter()
      .find(|m| m.name == *name)
      .ok_or_else(|| PatternError::InvalidConfig(format!("unknown parameter: {name}")))?;
    m.validate(*value)?;
  }
  Ok(())
}

// ============================================================
// TESTS
// ============================================================
