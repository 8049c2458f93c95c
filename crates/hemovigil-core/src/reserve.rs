//! The current-reserve row — durable latest-known state per
//! (source, region, category).
//!
//! This is the single source of truth for "what is true now" and the left
//! side of every diff. Rows are upserted in place on every cycle and never
//! deleted; history lives in the event log, not here.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::{Snapshot, SnapshotItem};

/// Latest known state for one (source, region, category). At most one row
/// exists per natural key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reserve {
  pub reserve_id:     Uuid,
  pub source_key:     String,
  pub region_id:      Uuid,
  pub region_key:     String,
  pub category:       String,
  pub value:          Option<f64>,
  pub status_key:     Option<String>,
  pub status_label:   Option<String>,
  pub captured_at:    DateTime<Utc>,
  pub reference_date: Option<NaiveDate>,
  pub updated_at:     DateTime<Utc>,
}

/// Input to [`crate::store::ReserveStore::upsert_reserve`].
/// `reserve_id` and `updated_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct ReserveUpsert {
  pub source_key:     String,
  pub region_id:      Uuid,
  pub region_key:     String,
  pub category:       String,
  pub value:          Option<f64>,
  pub status_key:     Option<String>,
  pub status_label:   Option<String>,
  pub captured_at:    DateTime<Utc>,
  pub reference_date: Option<NaiveDate>,
}

/// Rebuild the "previous" snapshot from the persisted current-reserve rows.
/// The capture time is the most recent capture time among the rows.
pub fn snapshot_from_reserves(source_key: &str, reserves: &[Reserve]) -> Snapshot {
  let captured_at = reserves
    .iter()
    .map(|r| r.captured_at)
    .max()
    .unwrap_or_else(Utc::now);

  let items = reserves
    .iter()
    .map(|r| SnapshotItem {
      region_key:   r.region_key.clone(),
      region_name:  String::new(),
      category:     r.category.clone(),
      value:        r.value,
      status_key:   r.status_key.clone(),
      status_label: r.status_label.clone(),
    })
    .collect();

  Snapshot {
    source_key: source_key.to_owned(),
    captured_at,
    reference_date: None,
    items,
  }
}
