//! Threshold profile resolution for the numeric alerting rule.
//!
//! Configuration values are clamped to safe ranges rather than rejected:
//! resolution never fails, it degrades to defaults.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::PriorityCatalog;

const DEFAULT_BASE_CRITICAL_UNITS: f64 = 100.0;
const DEFAULT_WARNING_MULTIPLIER: f64 = 1.2;
const DEFAULT_STEP_DOWN_PERCENT: f64 = 0.10;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Global threshold configuration consumed by [`resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
  /// Baseline critical level in units, before priority weighting.
  pub base_critical_units: f64,
  /// Warning level as a multiple of the critical level; clamped to (1.0, 10.0].
  pub warning_multiplier:  f64,
  /// Width of each "critical worsening" bucket, as a fraction of the critical
  /// level; clamped to (0.0, 1.0].
  pub step_down_percent:   f64,
  /// Per-category absolute critical levels; an override replaces the weighted
  /// baseline entirely.
  pub overrides:           HashMap<String, f64>,
}

impl Default for ThresholdConfig {
  fn default() -> Self {
    Self {
      base_critical_units: DEFAULT_BASE_CRITICAL_UNITS,
      warning_multiplier:  DEFAULT_WARNING_MULTIPLIER,
      step_down_percent:   DEFAULT_STEP_DOWN_PERCENT,
      overrides:           HashMap::new(),
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Resolved numeric thresholds for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
  pub critical_units:  f64,
  pub warning_units:   f64,
  pub step_down_units: f64,
}

/// Compute the threshold profile for `category`.
///
/// An absolute override wins; otherwise the baseline is scaled by the
/// category's priority weight. The warning level is always strictly above the
/// critical level, and the step-down bucket width is at least one unit.
pub fn resolve(
  category: &str,
  config: &ThresholdConfig,
  priorities: &PriorityCatalog,
) -> ThresholdProfile {
  let base = positive_or(config.base_critical_units, DEFAULT_BASE_CRITICAL_UNITS);

  let critical_units = match config.overrides.get(category) {
    Some(&o) if o.is_finite() && o > 0.0 => o,
    _ => base * priorities.weight(category),
  };

  let multiplier = if config.warning_multiplier.is_finite()
    && config.warning_multiplier > 1.0
    && config.warning_multiplier <= 10.0
  {
    config.warning_multiplier
  } else {
    DEFAULT_WARNING_MULTIPLIER
  };

  let step_pct = if config.step_down_percent.is_finite()
    && config.step_down_percent > 0.0
    && config.step_down_percent <= 1.0
  {
    config.step_down_percent
  } else {
    DEFAULT_STEP_DOWN_PERCENT
  };

  ThresholdProfile {
    critical_units,
    warning_units: critical_units * multiplier,
    step_down_units: (critical_units * step_pct).max(1.0),
  }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
  if value.is_finite() && value > 0.0 { value } else { fallback }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn weighted_baseline() {
    // BaseCriticalUnits=100, weight(O-)=1.4 ⇒ CriticalUnits=140.
    let config = ThresholdConfig::default();
    let profile = resolve("blood-group-o-minus", &config, &PriorityCatalog::new());
    assert_eq!(profile.critical_units, 140.0);
    assert!((profile.warning_units - 168.0).abs() < 1e-9);
    assert_eq!(profile.step_down_units, 14.0);
  }

  #[test]
  fn override_replaces_weighted_baseline() {
    let mut config = ThresholdConfig::default();
    config.overrides.insert("blood-group-o-minus".into(), 200.0);
    let profile = resolve("blood-group-o-minus", &config, &PriorityCatalog::new());
    assert_eq!(profile.critical_units, 200.0);
  }

  #[test]
  fn invalid_inputs_degrade_to_defaults() {
    let config = ThresholdConfig {
      base_critical_units: -5.0,
      warning_multiplier:  0.5,
      step_down_percent:   f64::NAN,
      overrides:           HashMap::new(),
    };
    let profile = resolve("platelets", &config, &PriorityCatalog::new());
    assert_eq!(profile.critical_units, 100.0);
    assert!((profile.warning_units - 120.0).abs() < 1e-9);
    assert_eq!(profile.step_down_units, 10.0);
  }

  #[test]
  fn step_down_has_a_one_unit_floor() {
    let mut config = ThresholdConfig::default();
    config.overrides.insert("rare".into(), 4.0);
    let profile = resolve("rare", &config, &PriorityCatalog::new());
    // 4.0 × 0.10 = 0.4, floored to 1 unit.
    assert_eq!(profile.step_down_units, 1.0);
  }
}
