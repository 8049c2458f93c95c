//! Severity and priority catalogs — pure lookup tables.
//!
//! Both catalogs are built once at process start and injected by reference
//! wherever they are needed. They hold no mutable state and their lookups
//! never fail: unrecognized input degrades to a defined fallback.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── Severity ────────────────────────────────────────────────────────────────

/// The canonical severity scale for categorical reserve status.
///
/// `Unknown` is the bucket for raw codes the catalog does not recognize. It
/// participates in rank comparisons (between watch and warning territory) but
/// is never produced by a source mapping on purpose.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Normal,
  Watch,
  Warning,
  Critical,
  Unknown,
}

impl Severity {
  /// Ordering for transition comparison. `Unknown` ties with `Watch`: it is
  /// non-normal, but never outranks a recognized warning.
  pub fn rank(self) -> u8 {
    match self {
      Self::Normal => 0,
      Self::Watch => 1,
      Self::Unknown => 1,
      Self::Warning => 2,
      Self::Critical => 3,
    }
  }

  pub fn is_normal(self) -> bool { matches!(self, Self::Normal) }

  /// The stable key stored in event payloads and database columns.
  pub fn key(self) -> &'static str {
    match self {
      Self::Normal => "normal",
      Self::Watch => "watch",
      Self::Warning => "warning",
      Self::Critical => "critical",
      Self::Unknown => "unknown",
    }
  }
}

// ─── Severity catalog ────────────────────────────────────────────────────────

/// Maps raw source status codes to the canonical [`Severity`] scale.
#[derive(Debug, Clone)]
pub struct SeverityCatalog {
  map: HashMap<String, Severity>,
}

impl SeverityCatalog {
  /// Catalog with the spellings observed across known sources.
  pub fn new() -> Self {
    let entries: &[(&str, Severity)] = &[
      ("normal", Severity::Normal),
      ("stable", Severity::Normal),
      ("ok", Severity::Normal),
      ("watch", Severity::Watch),
      ("caution", Severity::Watch),
      ("attention", Severity::Watch),
      ("warning", Severity::Warning),
      ("low", Severity::Warning),
      ("alert", Severity::Warning),
      ("critical", Severity::Critical),
      ("severe", Severity::Critical),
      ("urgent", Severity::Critical),
    ];
    let map = entries
      .iter()
      .map(|(k, v)| (k.to_string(), *v))
      .collect();
    Self { map }
  }

  /// Normalize a raw status code. Unrecognized (or empty) input maps to
  /// [`Severity::Unknown`]; this never fails.
  pub fn normalize(&self, raw: &str) -> Severity {
    let key = raw.trim().to_ascii_lowercase();
    self.map.get(&key).copied().unwrap_or(Severity::Unknown)
  }
}

impl Default for SeverityCatalog {
  fn default() -> Self { Self::new() }
}

// ─── Priority catalog ────────────────────────────────────────────────────────

/// Relative notification priority per category, used only by the numeric
/// threshold rule to scale the critical-units baseline.
#[derive(Debug, Clone)]
pub struct PriorityCatalog {
  weights: HashMap<String, f64>,
}

impl PriorityCatalog {
  /// Default weights: universal-donor groups carry more weight because a
  /// shortage there affects every recipient group.
  pub fn new() -> Self {
    let entries: &[(&str, f64)] = &[
      ("blood-group-o-minus", 1.4),
      ("blood-group-o-plus", 1.2),
      ("blood-group-a-minus", 1.1),
      ("blood-group-b-minus", 1.1),
      ("blood-group-a-plus", 1.0),
      ("blood-group-b-plus", 1.0),
      ("blood-group-ab-minus", 1.0),
      ("blood-group-ab-plus", 0.8),
    ];
    let weights = entries
      .iter()
      .map(|(k, v)| (k.to_string(), *v))
      .collect();
    Self { weights }
  }

  /// Weight multiplier for a category key; 1.0 for unrecognized keys.
  pub fn weight(&self, category: &str) -> f64 {
    self.weights.get(category).copied().unwrap_or(1.0)
  }
}

impl Default for PriorityCatalog {
  fn default() -> Self { Self::new() }
}

/// Both catalogs bundled for injection.
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
  pub severity: SeverityCatalog,
  pub priority: PriorityCatalog,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_is_case_and_whitespace_insensitive() {
    let catalog = SeverityCatalog::new();
    assert_eq!(catalog.normalize("Critical"), Severity::Critical);
    assert_eq!(catalog.normalize("  LOW "), Severity::Warning);
    assert_eq!(catalog.normalize("stable"), Severity::Normal);
  }

  #[test]
  fn unrecognized_status_maps_to_unknown() {
    let catalog = SeverityCatalog::new();
    assert_eq!(catalog.normalize("???"), Severity::Unknown);
    assert_eq!(catalog.normalize(""), Severity::Unknown);
  }

  #[test]
  fn rank_is_totally_ordered_over_known_severities() {
    assert!(Severity::Normal.rank() < Severity::Watch.rank());
    assert!(Severity::Watch.rank() < Severity::Warning.rank());
    assert!(Severity::Warning.rank() < Severity::Critical.rank());
    // Unknown compares as non-normal but below warning.
    assert_eq!(Severity::Unknown.rank(), Severity::Watch.rank());
    assert!(Severity::Unknown.rank() > Severity::Normal.rank());
    assert!(Severity::Unknown.rank() < Severity::Critical.rank());
  }

  #[test]
  fn priority_weight_defaults_to_one() {
    let catalog = PriorityCatalog::new();
    assert_eq!(catalog.weight("blood-group-o-minus"), 1.4);
    assert_eq!(catalog.weight("platelets"), 1.0);
  }
}
