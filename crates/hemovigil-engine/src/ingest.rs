//! The ingestion orchestrator — owns one polling cycle.
//!
//! A cycle: fetch the latest snapshot, upsert current-state rows, diff
//! against the previous state, evaluate rules, persist new events
//! idempotently, and hand the batch to the dispatch engine.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use hemovigil_core::{
  catalog::Catalogs,
  event::NewEvent,
  reserve::{ReserveUpsert, snapshot_from_reserves},
  rules::{Detection, ReserveLevelRule, Rule, StatusTransitionRule},
  snapshot::{Snapshot, SnapshotSource},
  store::ReserveStore,
  threshold::ThresholdConfig,
};
use hemovigil_notify::NotifierRegistry;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  config::DispatchConfig, dispatch::Dispatcher, error::EngineError,
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// What one cycle did — the engine's only required observability output.
#[derive(Debug, Clone, Copy)]
pub struct CycleOutcome {
  pub reserves_upserted: usize,
  pub events_inserted:   usize,
  pub deliveries_sent:   usize,
  pub duration:          Duration,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The fixed rule set: the numeric threshold rule and the categorical status
/// rule. Not a rules DSL by design.
pub fn standard_rules(
  thresholds: &ThresholdConfig,
  catalogs: &Catalogs,
) -> Vec<Box<dyn Rule>> {
  vec![
    Box::new(ReserveLevelRule::new(
      thresholds.clone(),
      catalogs.priority.clone(),
    )),
    Box::new(StatusTransitionRule::new(catalogs.severity.clone())),
  ]
}

/// Owns the pieces of the pipeline and runs cycles over them.
pub struct Engine<S, F> {
  store:    S,
  source:   F,
  rules:    Vec<Box<dyn Rule>>,
  registry: NotifierRegistry,
  dispatch: DispatchConfig,
}

impl<S, F> Engine<S, F>
where
  S: ReserveStore,
  F: SnapshotSource,
{
  pub fn new(
    store: S,
    source: F,
    rules: Vec<Box<dyn Rule>>,
    registry: NotifierRegistry,
    dispatch: DispatchConfig,
  ) -> Self {
    Self { store, source, rules, registry, dispatch }
  }

  /// Run one full cycle. Never aborts for per-pair notifier failures; only
  /// fetch errors, store errors, and cancellation surface here.
  pub async fn run_cycle(
    &self,
    cancel: &CancellationToken,
  ) -> Result<CycleOutcome, EngineError> {
    let started = Instant::now();

    let snapshot =
      self.source.fetch_latest().await.map_err(EngineError::fetch)?;
    if cancel.is_cancelled() {
      return Err(EngineError::Cancelled);
    }

    // The previous snapshot is rebuilt from the durable current state
    // before any upsert touches it.
    let reserves = self
      .store
      .list_reserves(&snapshot.source_key)
      .await
      .map_err(EngineError::store)?;
    let previous = snapshot_from_reserves(&snapshot.source_key, &reserves);

    let reserve_ids = self.upsert_current_state(&snapshot, cancel).await?;
    let reserves_upserted = reserve_ids.len();

    let detections = self.evaluate_rules(&previous, &snapshot, cancel)?;
    let inserted = self
      .persist_events(&snapshot, detections, &reserve_ids)
      .await?;

    let dispatcher =
      Dispatcher::new(&self.store, &self.registry, &self.dispatch);
    let deliveries_sent = dispatcher.dispatch(&inserted, cancel).await?;

    Ok(CycleOutcome {
      reserves_upserted,
      events_inserted: inserted.len(),
      deliveries_sent,
      duration: started.elapsed(),
    })
  }

  /// Upsert every observation, creating regions lazily on first sight.
  /// Returns the reserve row id per (region key, category) pair.
  async fn upsert_current_state(
    &self,
    snapshot: &Snapshot,
    cancel: &CancellationToken,
  ) -> Result<HashMap<(String, String), Uuid>, EngineError> {
    let mut reserve_ids = HashMap::new();

    for item in &snapshot.items {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }

      let region = self
        .store
        .ensure_region(&item.region_key, &item.region_name)
        .await
        .map_err(EngineError::store)?;

      let reserve = self
        .store
        .upsert_reserve(ReserveUpsert {
          source_key:     snapshot.source_key.clone(),
          region_id:      region.region_id,
          region_key:     item.region_key.clone(),
          category:       item.category.clone(),
          value:          item.value,
          status_key:     item.status_key.clone(),
          status_label:   item.status_label.clone(),
          captured_at:    snapshot.captured_at,
          reference_date: snapshot.reference_date,
        })
        .await
        .map_err(EngineError::store)?;

      reserve_ids.insert(
        (item.region_key.clone(), item.category.clone()),
        reserve.reserve_id,
      );
    }

    Ok(reserve_ids)
  }

  /// Run every rule over the pair and merge the detections into one
  /// deterministic order: (region key, category, rule key).
  fn evaluate_rules(
    &self,
    previous: &Snapshot,
    current: &Snapshot,
    cancel: &CancellationToken,
  ) -> Result<Vec<Detection>, EngineError> {
    let mut detections = Vec::new();
    for rule in &self.rules {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      detections.extend(rule.evaluate(previous, current));
    }

    detections.sort_by(|a, b| {
      (a.region_key.as_str(), a.category.as_str(), a.payload.rule_key())
        .cmp(&(b.region_key.as_str(), b.category.as_str(), b.payload.rule_key()))
    });
    Ok(detections)
  }

  /// Persist detections as events, skipping duplicates within the batch and
  /// keys already in the store. Re-running the same cycle inserts nothing.
  async fn persist_events(
    &self,
    snapshot: &Snapshot,
    detections: Vec<Detection>,
    reserve_ids: &HashMap<(String, String), Uuid>,
  ) -> Result<Vec<hemovigil_core::event::Event>, EngineError> {
    let mut batch = Vec::new();
    let mut seen = HashSet::new();
    for detection in detections {
      let pair =
        (detection.region_key.clone(), detection.category.clone());
      let Some(&reserve_id) = reserve_ids.get(&pair) else { continue };

      let input = NewEvent::from_payload(
        &snapshot.source_key,
        &detection.region_key,
        &detection.category,
        reserve_id,
        detection.payload,
      );
      if seen.insert(input.idempotency_key.clone()) {
        batch.push(input);
      }
    }

    let keys: Vec<String> =
      batch.iter().map(|e| e.idempotency_key.clone()).collect();
    let existing: HashSet<String> = self
      .store
      .existing_event_keys(&keys)
      .await
      .map_err(EngineError::store)?
      .into_iter()
      .collect();

    let mut inserted = Vec::new();
    for input in batch {
      if existing.contains(&input.idempotency_key) {
        continue;
      }
      inserted.push(
        self
          .store
          .insert_event(input)
          .await
          .map_err(EngineError::store)?,
      );
    }
    Ok(inserted)
  }

  /// The underlying store, for health reporting and tests.
  pub fn store(&self) -> &S { &self.store }
}
