//! Rule evaluators — stateless strategies that turn a (previous, current)
//! snapshot pair into semantic change detections.
//!
//! Two rules exist and the set is fixed by design; this is not a rules DSL.
//! Both emit detections ordered by (region key, category key) so downstream
//! idempotency keys and tests are deterministic.

use crate::{
  catalog::{PriorityCatalog, SeverityCatalog, Severity},
  event::{EventPayload, LevelState, Signal, Transition},
  snapshot::Snapshot,
  threshold::{self, ThresholdConfig, ThresholdProfile},
};

// ─── Detection ───────────────────────────────────────────────────────────────

/// One detected change for a (region, category) pair, not yet persisted.
#[derive(Debug, Clone)]
pub struct Detection {
  pub region_key: String,
  pub category:   String,
  pub payload:    EventPayload,
}

/// A change-detection strategy over a snapshot pair. Stateless per call.
pub trait Rule: Send + Sync {
  fn key(&self) -> &'static str;

  /// Evaluate the pair and return zero or more detections, ordered by
  /// (region key, category key).
  fn evaluate(&self, previous: &Snapshot, current: &Snapshot) -> Vec<Detection>;
}

fn sorted_current<'a>(current: &'a Snapshot) -> Vec<&'a crate::snapshot::SnapshotItem> {
  let mut items: Vec<_> = current.items.iter().collect();
  items.sort_by(|a, b| {
    (a.region_key.as_str(), a.category.as_str())
      .cmp(&(b.region_key.as_str(), b.category.as_str()))
  });
  items
}

// ─── Reserve-level rule ──────────────────────────────────────────────────────

/// Numeric threshold rule: a state machine over value thresholds.
///
/// States per (region, category): Normal (value > warning), Warning
/// (critical < value ≤ warning), Critical(bucket). Only entering/remaining in
/// Critical and leaving Critical emit; Normal↔Warning churn is silent.
pub struct ReserveLevelRule {
  config:     ThresholdConfig,
  priorities: PriorityCatalog,
}

impl ReserveLevelRule {
  pub fn new(config: ThresholdConfig, priorities: PriorityCatalog) -> Self {
    Self { config, priorities }
  }

  fn classify(value: f64, profile: &ThresholdProfile) -> LevelState {
    if value <= profile.critical_units {
      let bucket =
        ((profile.critical_units - value) / profile.step_down_units).floor();
      LevelState::Critical { bucket: bucket.max(0.0) as u32 }
    } else if value <= profile.warning_units {
      LevelState::Warning
    } else {
      LevelState::Normal
    }
  }
}

impl Rule for ReserveLevelRule {
  fn key(&self) -> &'static str { crate::event::RULE_RESERVE_LEVEL }

  fn evaluate(&self, previous: &Snapshot, current: &Snapshot) -> Vec<Detection> {
    let prior = previous.by_pair();
    let mut out = Vec::new();

    for item in sorted_current(current) {
      let Some(value) = item.value else { continue };
      let profile =
        threshold::resolve(&item.category, &self.config, &self.priorities);

      let current_state = Self::classify(value, &profile);
      let previous_value = prior
        .get(&(item.region_key.as_str(), item.category.as_str()))
        .and_then(|p| p.value);
      let previous_state =
        previous_value.map(|v| Self::classify(v, &profile));

      let (signal, transition) = match (previous_state, current_state) {
        (None, LevelState::Critical { .. }) => {
          (Signal::CriticalActive, Transition::InitialCritical)
        }
        (Some(LevelState::Critical { .. }), LevelState::Critical { .. }) => {
          (Signal::CriticalActive, Transition::StillCritical)
        }
        (Some(_), LevelState::Critical { .. }) => {
          (Signal::CriticalActive, Transition::EnteredCritical)
        }
        (Some(LevelState::Critical { .. }), _) => {
          (Signal::Recovery, Transition::RecoveredFromCritical)
        }
        _ => continue,
      };

      out.push(Detection {
        region_key: item.region_key.clone(),
        category:   item.category.clone(),
        payload:    EventPayload::ReserveLevel {
          signal,
          transition,
          previous: previous_state,
          current: current_state,
          value,
          previous_value,
          critical_units: profile.critical_units,
          warning_units: profile.warning_units,
          step_down_units: profile.step_down_units,
          captured_at: current.captured_at,
        },
      });
    }

    out
  }
}

// ─── Status-transition rule ──────────────────────────────────────────────────

/// Categorical status rule: a state machine over the canonical severity
/// scale. A missing prior observation counts as `normal`, so the first
/// sighting of a non-normal state is an alert rather than silently absorbed.
pub struct StatusTransitionRule {
  severities: SeverityCatalog,
}

impl StatusTransitionRule {
  pub fn new(severities: SeverityCatalog) -> Self { Self { severities } }
}

impl Rule for StatusTransitionRule {
  fn key(&self) -> &'static str { crate::event::RULE_STATUS_TRANSITION }

  fn evaluate(&self, previous: &Snapshot, current: &Snapshot) -> Vec<Detection> {
    let prior = previous.by_pair();
    let mut out = Vec::new();

    for item in sorted_current(current) {
      let Some(current_raw) = item.status_key.as_deref() else { continue };
      let current_sev = self.severities.normalize(current_raw);

      let previous_raw = prior
        .get(&(item.region_key.as_str(), item.category.as_str()))
        .and_then(|p| p.status_key.clone());
      let previous_sev = previous_raw
        .as_deref()
        .map(|raw| self.severities.normalize(raw))
        .unwrap_or(Severity::Normal);

      let (signal, transition) = match (previous_sev.is_normal(), current_sev.is_normal()) {
        (true, false) => (Signal::StatusAlert, Transition::EnteredNonNormal),
        (false, false) if current_sev.rank() > previous_sev.rank() => {
          (Signal::StatusAlert, Transition::Worsened)
        }
        (false, true) => (Signal::Recovery, Transition::RecoveredToNormal),
        _ => continue,
      };

      out.push(Detection {
        region_key: item.region_key.clone(),
        category:   item.category.clone(),
        payload:    EventPayload::StatusTransition {
          signal,
          transition,
          previous: previous_sev,
          current: current_sev,
          previous_raw,
          current_raw: Some(current_raw.to_owned()),
          captured_at: current.captured_at,
        },
      });
    }

    out
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
