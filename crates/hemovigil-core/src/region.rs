//! Region and institution — the geographic scopes reserves are measured under.
//!
//! Regions are created lazily the first time a snapshot mentions them and are
//! immutable afterwards. Institutions exist so institution-scoped
//! subscriptions can resolve to a region at dispatch time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A geographic/administrative grouping under which reserves are measured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
  pub region_id:  Uuid,
  /// Stable key, unique per source (e.g. `pt-norte`).
  pub key:        String,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

/// A donation site or hospital tied to a region. Institution identity is never
/// matched against events directly — only its region is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
  pub institution_id: Uuid,
  pub name:           String,
  pub region_id:      Uuid,
  pub created_at:     DateTime<Utc>,
}
