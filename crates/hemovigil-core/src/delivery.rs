//! Delivery — the attempt record for one (event, subscription) pair.
//!
//! At most one delivery exists per pair. It is created on the first dispatch
//! attempt and mutated in place across retries within the same cycle; `sent`
//! and `failed` are terminal — no automatic retries happen in later cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
  Pending,
  Sent,
  Failed,
}

impl DeliveryStatus {
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
  pub delivery_id:     Uuid,
  pub event_id:        Uuid,
  pub subscription_id: Uuid,
  pub attempts:        u32,
  pub status:          DeliveryStatus,
  pub last_error:      Option<String>,
  pub created_at:      DateTime<Utc>,
  pub sent_at:         Option<DateTime<Utc>>,
}
