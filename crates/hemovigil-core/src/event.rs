//! Event types — the append-only log of detected state changes.
//!
//! An event is immutable once persisted. Its payload is a tagged union keyed
//! by the rule that produced it, and its idempotency key is a SHA-256 over
//! the stable signal fingerprint — not over the raw payload JSON, so field
//! reordering or added metadata never breaks deduplication.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::catalog::Severity;

pub const RULE_RESERVE_LEVEL: &str = "reserve-level";
pub const RULE_STATUS_TRANSITION: &str = "status-transition";

// ─── Signals & transitions ───────────────────────────────────────────────────

/// What kind of condition an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
  /// A reserve is at or below its critical level.
  CriticalActive,
  /// A categorical status moved to (or worsened within) a non-normal state.
  StatusAlert,
  /// A previously abnormal condition returned to normal.
  Recovery,
}

impl Signal {
  pub fn key(self) -> &'static str {
    match self {
      Self::CriticalActive => "critical-active",
      Self::StatusAlert => "status-alert",
      Self::Recovery => "recovery",
    }
  }
}

/// How the condition got there, relative to the previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
  // reserve-level rule
  InitialCritical,
  StillCritical,
  EnteredCritical,
  RecoveredFromCritical,
  // status-transition rule
  EnteredNonNormal,
  Worsened,
  RecoveredToNormal,
}

impl Transition {
  pub fn key(self) -> &'static str {
    match self {
      Self::InitialCritical => "initial-critical",
      Self::StillCritical => "still-critical",
      Self::EnteredCritical => "entered-critical",
      Self::RecoveredFromCritical => "recovered-from-critical",
      Self::EnteredNonNormal => "entered-non-normal",
      Self::Worsened => "worsened",
      Self::RecoveredToNormal => "recovered-to-normal",
    }
  }

  /// True for transitions that describe an ongoing abnormal condition rather
  /// than a fresh entry or a recovery. These are the transitions subject to
  /// steady-state suppression at dispatch time.
  pub fn is_steady_state(self) -> bool { matches!(self, Self::StillCritical) }

  /// True for transitions that announce a return to normal, which re-arm
  /// suppressed alerts.
  pub fn is_recovery(self) -> bool {
    matches!(self, Self::RecoveredFromCritical | Self::RecoveredToNormal)
  }
}

// ─── Level state ─────────────────────────────────────────────────────────────

/// State of a numeric reserve relative to its threshold profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LevelState {
  Normal,
  Warning,
  /// At or below the critical level. A larger bucket means further below:
  /// bucket = floor((critical − value) / step_down), clamped ≥ 0.
  Critical { bucket: u32 },
}

impl LevelState {
  pub fn is_critical(self) -> bool { matches!(self, Self::Critical { .. }) }

  /// Stable string form used in the idempotency fingerprint.
  pub fn fingerprint(self) -> String {
    match self {
      Self::Normal => "normal".into(),
      Self::Warning => "warning".into(),
      Self::Critical { bucket } => format!("critical:{bucket}"),
    }
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// Rule-specific transition detail, serialized as the event's JSON payload.
/// The variant tag doubles as the rule key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum EventPayload {
  ReserveLevel {
    signal:          Signal,
    transition:      Transition,
    previous:        Option<LevelState>,
    current:         LevelState,
    value:           f64,
    previous_value:  Option<f64>,
    critical_units:  f64,
    warning_units:   f64,
    step_down_units: f64,
    captured_at:     DateTime<Utc>,
  },
  StatusTransition {
    signal:       Signal,
    transition:   Transition,
    previous:     Severity,
    current:      Severity,
    previous_raw: Option<String>,
    current_raw:  Option<String>,
    captured_at:  DateTime<Utc>,
  },
}

impl EventPayload {
  pub fn rule_key(&self) -> &'static str {
    match self {
      Self::ReserveLevel { .. } => RULE_RESERVE_LEVEL,
      Self::StatusTransition { .. } => RULE_STATUS_TRANSITION,
    }
  }

  pub fn signal(&self) -> Signal {
    match self {
      Self::ReserveLevel { signal, .. } => *signal,
      Self::StatusTransition { signal, .. } => *signal,
    }
  }

  pub fn transition(&self) -> Transition {
    match self {
      Self::ReserveLevel { transition, .. } => *transition,
      Self::StatusTransition { transition, .. } => *transition,
    }
  }

  /// The fields that identify this signal across re-runs: current state,
  /// current value, and the capture time truncated to whole seconds (the
  /// finest unit sources report).
  fn fingerprint_fields(&self) -> [String; 4] {
    match self {
      Self::ReserveLevel { transition, current, value, captured_at, .. } => [
        transition.key().to_owned(),
        current.fingerprint(),
        format!("{value}"),
        captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
      ],
      Self::StatusTransition { transition, current, captured_at, .. } => [
        transition.key().to_owned(),
        current.key().to_owned(),
        "-".to_owned(),
        captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
      ],
    }
  }
}

// ─── Idempotency ─────────────────────────────────────────────────────────────

/// Compute the idempotency key for a detected change.
///
/// The hash covers the rule key, the scope keys, and the payload's signal
/// fingerprint — each field separated so concatenation ambiguity cannot
/// collide two distinct changes.
pub fn idempotency_key(
  source_key: &str,
  region_key: &str,
  category: &str,
  payload: &EventPayload,
) -> String {
  let mut hasher = Sha256::new();
  for field in [payload.rule_key(), source_key, region_key, category, payload.signal().key()] {
    hasher.update(field.as_bytes());
    hasher.update([0x1f]);
  }
  for field in payload.fingerprint_fields() {
    hasher.update(field.as_bytes());
    hasher.update([0x1f]);
  }
  hex::encode(hasher.finalize())
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An immutable record of a detected state change, linked to the
/// current-reserve row it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
  pub event_id:        Uuid,
  pub rule_key:        String,
  pub source_key:      String,
  pub region_key:      String,
  pub category:        String,
  pub signal:          Signal,
  pub transition:      Transition,
  /// The raw payload JSON as persisted. Decode with [`Event::decode_payload`].
  pub payload:         serde_json::Value,
  pub reserve_id:      Uuid,
  pub idempotency_key: String,
  pub created_at:      DateTime<Utc>,
}

impl Event {
  /// Parse the payload back into its typed form. Malformed payloads yield
  /// `None`; dispatch treats that as "no special metadata" and continues.
  pub fn decode_payload(&self) -> Option<EventPayload> {
    serde_json::from_value(self.payload.clone()).ok()
  }
}

/// Input to [`crate::store::ReserveStore::insert_event`].
/// `event_id` and `created_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
  pub source_key:      String,
  pub region_key:      String,
  pub category:        String,
  pub payload:         EventPayload,
  pub reserve_id:      Uuid,
  pub idempotency_key: String,
}

impl NewEvent {
  /// Build an event input from a detected change, computing its key.
  pub fn from_payload(
    source_key: &str,
    region_key: &str,
    category: &str,
    reserve_id: Uuid,
    payload: EventPayload,
  ) -> Self {
    let idempotency_key =
      idempotency_key(source_key, region_key, category, &payload);
    Self {
      source_key: source_key.to_owned(),
      region_key: region_key.to_owned(),
      category: category.to_owned(),
      payload,
      reserve_id,
      idempotency_key,
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn level_payload(value: f64, bucket: u32) -> EventPayload {
    EventPayload::ReserveLevel {
      signal:          Signal::CriticalActive,
      transition:      Transition::EnteredCritical,
      previous:        Some(LevelState::Normal),
      current:         LevelState::Critical { bucket },
      value,
      previous_value:  Some(150.0),
      critical_units:  140.0,
      warning_units:   168.0,
      step_down_units: 14.0,
      captured_at:     Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
    }
  }

  #[test]
  fn same_fingerprint_yields_same_key() {
    let a = idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &level_payload(90.0, 3));
    let b = idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &level_payload(90.0, 3));
    assert_eq!(a, b);
  }

  #[test]
  fn key_is_insensitive_to_non_fingerprint_fields() {
    let mut changed = level_payload(90.0, 3);
    if let EventPayload::ReserveLevel { previous_value, .. } = &mut changed {
      *previous_value = None;
    }
    let a = idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &level_payload(90.0, 3));
    let b = idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &changed);
    assert_eq!(a, b);
  }

  #[test]
  fn key_differs_across_scope_and_state() {
    let base = idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &level_payload(90.0, 3));
    let other_region =
      idempotency_key("ipst", "pt-centro", "blood-group-o-minus", &level_payload(90.0, 3));
    let other_bucket =
      idempotency_key("ipst", "pt-norte", "blood-group-o-minus", &level_payload(90.0, 4));
    assert_ne!(base, other_region);
    assert_ne!(base, other_bucket);
  }

  #[test]
  fn malformed_payload_decodes_to_none() {
    let event = Event {
      event_id:        Uuid::new_v4(),
      rule_key:        RULE_RESERVE_LEVEL.into(),
      source_key:      "ipst".into(),
      region_key:      "pt-norte".into(),
      category:        "blood-group-o-minus".into(),
      signal:          Signal::CriticalActive,
      transition:      Transition::EnteredCritical,
      payload:         serde_json::json!({ "rule": "not-a-rule" }),
      reserve_id:      Uuid::new_v4(),
      idempotency_key: "x".into(),
      created_at:      Utc::now(),
    };
    assert!(event.decode_payload().is_none());
  }
}
