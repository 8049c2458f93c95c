//! Snapshot types — the immutable diff inputs for rule evaluation.
//!
//! A snapshot is one full read of all (region, category) observations from a
//! single source at a point in time. The core only ever sees snapshots in
//! pairs (previous, current), passed by reference and never mutated.

use std::{collections::HashMap, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One (region, category) observation. Depending on the source, the numeric
/// value, the categorical status, or both may be populated; rules tolerate
/// either being absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotItem {
  pub region_key:   String,
  pub region_name:  String,
  pub category:     String,
  /// Units on hand, if the source reports numbers.
  pub value:        Option<f64>,
  /// Raw status code as reported by the source, if any.
  pub status_key:   Option<String>,
  /// Human-readable status label as reported by the source.
  pub status_label: Option<String>,
}

/// A point-in-time read of all observations from one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
  pub source_key:     String,
  pub captured_at:    DateTime<Utc>,
  /// The date the data logically describes, which may lag capture time.
  pub reference_date: Option<NaiveDate>,
  pub items:          Vec<SnapshotItem>,
}

impl Snapshot {
  /// Index items by (region key, category) for diffing. Later duplicates of
  /// the same pair shadow earlier ones.
  pub fn by_pair(&self) -> HashMap<(&str, &str), &SnapshotItem> {
    self
      .items
      .iter()
      .map(|item| ((item.region_key.as_str(), item.category.as_str()), item))
      .collect()
  }
}

// ─── Adapter boundary ────────────────────────────────────────────────────────

/// The out-of-scope adapter that fetches and normalizes a third-party payload
/// into a [`Snapshot`]. Remote retry/backoff is the adapter's concern, not the
/// core's.
pub trait SnapshotSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn fetch_latest(
    &self,
  ) -> impl Future<Output = Result<Snapshot, Self::Error>> + Send + '_;
}
