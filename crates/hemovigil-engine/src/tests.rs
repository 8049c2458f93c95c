//! End-to-end cycle tests over an in-memory SQLite store, a scripted snapshot
//! source, and a scripted notifier.

use std::{
  convert::Infallible,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hemovigil_core::{
  catalog::Catalogs,
  delivery::DeliveryStatus,
  event::Event,
  snapshot::{Snapshot, SnapshotItem, SnapshotSource},
  store::ReserveStore,
  subscription::{CategoryFilter, NewSubscription, Scope},
  threshold::ThresholdConfig,
};
use hemovigil_notify::{Notifier, NotifierRegistry, SendOutcome};
use hemovigil_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  config::DispatchConfig,
  error::EngineError,
  ingest::{Engine, standard_rules},
};

// ─── Scripted source & notifier ──────────────────────────────────────────────

/// Replays a fixed sequence of snapshots, repeating the last one.
struct ScriptedSource {
  snapshots: Vec<Snapshot>,
  cursor:    AtomicUsize,
}

impl ScriptedSource {
  fn new(snapshots: Vec<Snapshot>) -> Self {
    assert!(!snapshots.is_empty());
    Self { snapshots, cursor: AtomicUsize::new(0) }
  }
}

impl SnapshotSource for ScriptedSource {
  type Error = Infallible;

  async fn fetch_latest(&self) -> Result<Snapshot, Infallible> {
    let index = self
      .cursor
      .fetch_add(1, Ordering::SeqCst)
      .min(self.snapshots.len() - 1);
    Ok(self.snapshots[index].clone())
  }
}

/// Records every send and replays scripted outcomes, succeeding once the
/// script runs out.
#[derive(Default)]
struct Recorder {
  outcomes: Mutex<Vec<SendOutcome>>,
  sent:     Mutex<Vec<String>>,
}

impl Recorder {
  fn transitions(&self) -> Vec<String> { self.sent.lock().unwrap().clone() }
}

struct ScriptedNotifier {
  recorder: Arc<Recorder>,
}

#[async_trait]
impl Notifier for ScriptedNotifier {
  fn type_key(&self) -> &'static str { "webhook" }

  async fn send(&self, event: &Event, _target: &str) -> SendOutcome {
    self
      .recorder
      .sent
      .lock()
      .unwrap()
      .push(event.transition.key().to_owned());
    let mut outcomes = self.recorder.outcomes.lock().unwrap();
    if outcomes.is_empty() {
      SendOutcome::sent_now()
    } else {
      outcomes.remove(0)
    }
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn at(hour: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()
}

fn level_item(region: &str, category: &str, value: f64) -> SnapshotItem {
  SnapshotItem {
    region_key:   region.to_owned(),
    region_name:  region.to_owned(),
    category:     category.to_owned(),
    value:        Some(value),
    status_key:   None,
    status_label: None,
  }
}

fn status_item(region: &str, category: &str, status: &str) -> SnapshotItem {
  SnapshotItem {
    region_key:   region.to_owned(),
    region_name:  region.to_owned(),
    category:     category.to_owned(),
    value:        None,
    status_key:   Some(status.to_owned()),
    status_label: Some(status.to_owned()),
  }
}

fn snapshot(captured_at: DateTime<Utc>, items: Vec<SnapshotItem>) -> Snapshot {
  Snapshot {
    source_key: "ipst".to_owned(),
    captured_at,
    reference_date: None,
    items,
  }
}

fn webhook_sub(region: &str) -> NewSubscription {
  NewSubscription {
    source_key:   "ipst".to_owned(),
    channel_type: "webhook".to_owned(),
    target:       "https://example.test/hook".to_owned(),
    scope:        Scope::Region { region_key: region.to_owned() },
    category:     CategoryFilter::All,
  }
}

/// An engine over the given store, with the threshold defaults, a scripted
/// source, and a single scripted webhook channel. Backoffs are 1 ms so retry
/// tests stay fast.
fn engine(
  store: SqliteStore,
  snapshots: Vec<Snapshot>,
  outcomes: Vec<SendOutcome>,
) -> (Engine<SqliteStore, ScriptedSource>, Arc<Recorder>) {
  let recorder = Arc::new(Recorder {
    outcomes: Mutex::new(outcomes),
    sent:     Mutex::new(Vec::new()),
  });

  let mut registry = NotifierRegistry::new();
  registry.register(Box::new(ScriptedNotifier { recorder: recorder.clone() }));

  let catalogs = Catalogs::default();
  let rules = standard_rules(&ThresholdConfig::default(), &catalogs);
  let dispatch = DispatchConfig { max_attempts: 3, backoff_ms: vec![1, 1, 1] };

  let engine =
    Engine::new(store, ScriptedSource::new(snapshots), rules, registry, dispatch);
  (engine, recorder)
}

// ─── Cycle idempotency ───────────────────────────────────────────────────────

#[tokio::test]
async fn rerunning_an_identical_snapshot_inserts_nothing_new() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  // The same capture replayed three times. With o-minus weighting the
  // critical level is 140, so 90 units is critical from the start.
  let capture =
    snapshot(at(8), vec![level_item("pt-norte", "blood-group-o-minus", 90.0)]);
  let (engine, _) =
    engine(store, vec![capture.clone(), capture.clone(), capture], vec![]);
  let cancel = CancellationToken::new();

  // First sight: initial-critical.
  let first = engine.run_cycle(&cancel).await.unwrap();
  assert_eq!(first.events_inserted, 1);
  assert_eq!(first.deliveries_sent, 1);

  // Second cycle diffs against the stored state: still-critical, a new
  // fingerprint even though the capture is unchanged.
  let second = engine.run_cycle(&cancel).await.unwrap();
  assert_eq!(second.events_inserted, 1);
  assert_eq!(second.deliveries_sent, 1);

  // Third cycle produces the same still-critical fingerprint; nothing new.
  let third = engine.run_cycle(&cancel).await.unwrap();
  assert_eq!(third.events_inserted, 0);
  assert_eq!(third.deliveries_sent, 0);
}

#[tokio::test]
async fn steady_alerts_suppress_until_recovery() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  let critical = |hour| {
    snapshot(at(hour), vec![level_item("pt-norte", "blood-group-o-minus", 90.0)])
  };
  let recovered =
    snapshot(at(11), vec![level_item("pt-norte", "blood-group-o-minus", 150.0)]);

  let (engine, recorder) = engine(
    store,
    vec![
      critical(8),
      critical(9),
      critical(10),
      recovered,
      critical(12),
      critical(13),
    ],
    vec![],
  );
  let cancel = CancellationToken::new();

  let mut sent_per_cycle = Vec::new();
  for _ in 0..6 {
    let outcome = engine.run_cycle(&cancel).await.unwrap();
    sent_per_cycle.push(outcome.deliveries_sent);
  }

  // The first still-critical goes out; the next is suppressed; recovery and
  // re-entry both announce; the still-critical after recovery re-arms.
  assert_eq!(sent_per_cycle, vec![1, 1, 0, 1, 1, 1]);
  assert_eq!(recorder.transitions(), vec![
    "initial-critical",
    "still-critical",
    "recovered-from-critical",
    "entered-critical",
    "still-critical",
  ]);
}

// ─── Retry behavior ──────────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_exhaust_the_attempt_cap() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let sub = store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, recorder) = engine(
    store.clone(),
    vec![capture],
    vec![
      SendOutcome::transient("503"),
      SendOutcome::transient("503"),
      SendOutcome::transient("503"),
    ],
  );

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.events_inserted, 1);
  assert_eq!(outcome.deliveries_sent, 0);
  assert_eq!(recorder.transitions().len(), 3);

  let deliveries =
    store.deliveries_for_subscription(sub.subscription_id).await.unwrap();
  assert_eq!(deliveries.len(), 1);
  assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
  assert_eq!(deliveries[0].attempts, 3);
  assert_eq!(deliveries[0].last_error.as_deref(), Some("503"));
}

#[tokio::test]
async fn transient_failure_then_success_marks_sent() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let sub = store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, _) = engine(
    store.clone(),
    vec![capture],
    vec![SendOutcome::transient("429")],
  );

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.deliveries_sent, 1);

  let deliveries =
    store.deliveries_for_subscription(sub.subscription_id).await.unwrap();
  assert_eq!(deliveries.len(), 1);
  assert_eq!(deliveries[0].status, DeliveryStatus::Sent);
  assert_eq!(deliveries[0].attempts, 2);
  assert!(deliveries[0].sent_at.is_some());
}

#[tokio::test]
async fn permanent_failure_stops_retrying() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let sub = store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, recorder) = engine(
    store.clone(),
    vec![capture],
    vec![SendOutcome::permanent("404 target gone")],
  );

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.deliveries_sent, 0);
  assert_eq!(recorder.transitions().len(), 1);

  let deliveries =
    store.deliveries_for_subscription(sub.subscription_id).await.unwrap();
  assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
  assert_eq!(deliveries[0].attempts, 1);
}

#[tokio::test]
async fn unknown_channel_type_fails_without_an_attempt() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let sub = store
    .add_subscription(NewSubscription {
      channel_type: "carrier-pigeon".to_owned(),
      ..webhook_sub("pt-norte")
    })
    .await
    .unwrap();

  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, recorder) = engine(store.clone(), vec![capture], vec![]);

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.deliveries_sent, 0);
  assert!(recorder.transitions().is_empty());

  let deliveries =
    store.deliveries_for_subscription(sub.subscription_id).await.unwrap();
  assert_eq!(deliveries[0].status, DeliveryStatus::Failed);
  assert_eq!(deliveries[0].attempts, 0);
  assert!(
    deliveries[0]
      .last_error
      .as_deref()
      .is_some_and(|e| e.contains("no notifier"))
  );
}

// ─── Matching ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn scope_and_category_filters_select_pairs() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store
    .add_subscription(NewSubscription {
      category: CategoryFilter::One("platelets".to_owned()),
      ..webhook_sub("pt-norte")
    })
    .await
    .unwrap();

  // Three critical observations; only (pt-norte, platelets) matches the
  // subscription.
  let capture = snapshot(at(8), vec![
    level_item("pt-norte", "platelets", 50.0),
    level_item("pt-norte", "blood-group-o-minus", 90.0),
    level_item("pt-centro", "platelets", 50.0),
  ]);
  let (engine, recorder) = engine(store, vec![capture], vec![]);

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.events_inserted, 3);
  assert_eq!(outcome.deliveries_sent, 1);
  assert_eq!(recorder.transitions(), vec!["initial-critical"]);
}

#[tokio::test]
async fn wildcard_subscription_gets_one_delivery_per_event() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let sub = store.add_subscription(webhook_sub("pt-norte")).await.unwrap();

  let capture = snapshot(at(8), vec![
    level_item("pt-norte", "platelets", 50.0),
    level_item("pt-norte", "blood-group-o-minus", 90.0),
  ]);
  let (engine, _) = engine(store.clone(), vec![capture], vec![]);

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.events_inserted, 2);
  assert_eq!(outcome.deliveries_sent, 2);

  let deliveries =
    store.deliveries_for_subscription(sub.subscription_id).await.unwrap();
  assert_eq!(deliveries.len(), 2);
  assert!(deliveries.iter().all(|d| d.status == DeliveryStatus::Sent));
  assert_ne!(deliveries[0].event_id, deliveries[1].event_id);
}

#[tokio::test]
async fn institution_scope_matches_through_its_region() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let region = store.ensure_region("pt-norte", "Norte").await.unwrap();
  let institution = store
    .add_institution("Hospital de Santo António", region.region_id)
    .await
    .unwrap();

  store
    .add_subscription(NewSubscription {
      scope: Scope::Institution { institution_id: institution.institution_id },
      ..webhook_sub("pt-norte")
    })
    .await
    .unwrap();
  // A subscription pointing at a vanished institution never matches.
  store
    .add_subscription(NewSubscription {
      scope: Scope::Institution { institution_id: Uuid::new_v4() },
      ..webhook_sub("pt-norte")
    })
    .await
    .unwrap();

  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, _) = engine(store, vec![capture], vec![]);

  let outcome = engine.run_cycle(&CancellationToken::new()).await.unwrap();
  assert_eq!(outcome.deliveries_sent, 1);
}

// ─── Status rule through the pipeline ────────────────────────────────────────

#[tokio::test]
async fn status_transitions_flow_through_dispatch() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  store.add_subscription(webhook_sub("pt-acores")).await.unwrap();

  let (engine, recorder) = engine(
    store,
    vec![
      snapshot(at(8), vec![status_item("pt-acores", "blood-group-a-plus", "low")]),
      snapshot(at(9), vec![status_item("pt-acores", "blood-group-a-plus", "stable")]),
    ],
    vec![],
  );
  let cancel = CancellationToken::new();

  let first = engine.run_cycle(&cancel).await.unwrap();
  assert_eq!(first.events_inserted, 1);
  assert_eq!(first.deliveries_sent, 1);

  let second = engine.run_cycle(&cancel).await.unwrap();
  assert_eq!(second.events_inserted, 1);
  assert_eq!(second.deliveries_sent, 1);

  assert_eq!(recorder.transitions(), vec![
    "entered-non-normal",
    "recovered-to-normal",
  ]);
}

// ─── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancelled_token_aborts_the_cycle() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let capture = snapshot(at(8), vec![level_item("pt-norte", "platelets", 50.0)]);
  let (engine, _) = engine(store, vec![capture], vec![]);

  let cancel = CancellationToken::new();
  cancel.cancel();

  let result = engine.run_cycle(&cancel).await;
  assert!(matches!(result, Err(EngineError::Cancelled)));
}
