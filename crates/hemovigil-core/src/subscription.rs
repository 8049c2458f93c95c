//! Subscription — a durable notifier registration.
//!
//! Subscriptions are soft-deleted: the only mutation ever applied is
//! enabled → disabled, recorded with a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Scope & filter ──────────────────────────────────────────────────────────

/// What part of the world a subscription listens to. A region scope matches
/// events by region key; an institution scope matches through the
/// institution's region (institution identity itself is never compared).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum Scope {
  Region { region_key: String },
  Institution { institution_id: Uuid },
}

/// Category filter: a specific category key, or all of them. Serialized (and
/// stored) as plain text, with `*` as the wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
  #[default]
  All,
  One(String),
}

impl Serialize for CategoryFilter {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for CategoryFilter {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    Ok(Self::from_str(&s))
  }
}

impl CategoryFilter {
  pub fn matches(&self, category: &str) -> bool {
    match self {
      Self::All => true,
      Self::One(key) => key == category,
    }
  }

  /// Text form stored in the database; `*` is the wildcard.
  pub fn as_str(&self) -> &str {
    match self {
      Self::All => "*",
      Self::One(key) => key,
    }
  }

  pub fn from_str(s: &str) -> Self {
    if s == "*" { Self::All } else { Self::One(s.to_owned()) }
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
  pub subscription_id: Uuid,
  pub source_key:      String,
  /// Notifier channel type key (canonical or a tolerated legacy spelling).
  pub channel_type:    String,
  /// Channel-specific target address (webhook URL, chat id, ...).
  pub target:          String,
  pub scope:           Scope,
  pub category:        CategoryFilter,
  pub enabled:         bool,
  pub created_at:      DateTime<Utc>,
  pub disabled_at:     Option<DateTime<Utc>>,
}

/// Input to [`crate::store::ReserveStore::add_subscription`].
/// `subscription_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSubscription {
  pub source_key:   String,
  pub channel_type: String,
  pub target:       String,
  pub scope:        Scope,
  pub category:     CategoryFilter,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wildcard_matches_everything() {
    assert!(CategoryFilter::All.matches("blood-group-o-minus"));
    assert!(CategoryFilter::All.matches("platelets"));
  }

  #[test]
  fn specific_filter_matches_exactly() {
    let filter = CategoryFilter::One("blood-group-o-minus".into());
    assert!(filter.matches("blood-group-o-minus"));
    assert!(!filter.matches("blood-group-o-plus"));
  }

  #[test]
  fn filter_text_roundtrip() {
    assert_eq!(CategoryFilter::from_str("*"), CategoryFilter::All);
    assert_eq!(
      CategoryFilter::from_str("platelets"),
      CategoryFilter::One("platelets".into())
    );
    assert_eq!(CategoryFilter::All.as_str(), "*");
  }
}
