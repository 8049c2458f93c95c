//! The `ReserveStore` trait — the persistence seam of the pipeline.
//!
//! Implemented by storage backends (e.g. `hemovigil-store-sqlite`). The
//! ingestion orchestrator and the dispatch engine depend on this abstraction,
//! never on a concrete backend.
//!
//! All methods return `Send` futures so the trait can be used from
//! multi-threaded async runtimes.

use std::future::Future;

use uuid::Uuid;

use crate::{
  delivery::Delivery,
  event::{Event, NewEvent},
  region::{Institution, Region},
  reserve::{Reserve, ReserveUpsert},
  subscription::{NewSubscription, Subscription},
};

/// Abstraction over the durable store: current-reserve rows, the event log,
/// subscriptions, and deliveries.
///
/// Idempotency keys and delivery uniqueness constraints make duplicate writes
/// safe to detect and ignore; implementations need no cross-cycle locking.
pub trait ReserveStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Regions & institutions ────────────────────────────────────────────

  /// Look up a region by key, creating it if this is the first time the key
  /// has been observed. Regions are immutable once created.
  fn ensure_region<'a>(
    &'a self,
    key: &'a str,
    name: &'a str,
  ) -> impl Future<Output = Result<Region, Self::Error>> + Send + 'a;

  fn get_region<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Region>, Self::Error>> + Send + 'a;

  /// Resolve a region by id — used to turn an institution scope into a
  /// region key at dispatch time.
  fn get_region_by_id(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Region>, Self::Error>> + Send + '_;

  fn add_institution<'a>(
    &'a self,
    name: &'a str,
    region_id: Uuid,
  ) -> impl Future<Output = Result<Institution, Self::Error>> + Send + 'a;

  fn get_institution(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Institution>, Self::Error>> + Send + '_;

  // ── Current-reserve rows ──────────────────────────────────────────────

  /// Insert or update the row for the upsert's natural key
  /// (source, region, category) and return the persisted state.
  fn upsert_reserve(
    &self,
    input: ReserveUpsert,
  ) -> impl Future<Output = Result<Reserve, Self::Error>> + Send + '_;

  fn get_reserve<'a>(
    &'a self,
    source_key: &'a str,
    region_key: &'a str,
    category: &'a str,
  ) -> impl Future<Output = Result<Option<Reserve>, Self::Error>> + Send + 'a;

  /// All current-reserve rows for a source — the previous snapshot's raw
  /// material.
  fn list_reserves<'a>(
    &'a self,
    source_key: &'a str,
  ) -> impl Future<Output = Result<Vec<Reserve>, Self::Error>> + Send + 'a;

  // ── Events — append-only ──────────────────────────────────────────────

  /// Which of `keys` already exist in the event log.
  fn existing_event_keys<'a>(
    &'a self,
    keys: &'a [String],
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Persist an event. Inserting a key that already exists is a no-op that
  /// returns the previously persisted event, so crash-and-rerun cycles never
  /// duplicate.
  fn insert_event(
    &self,
    input: NewEvent,
  ) -> impl Future<Output = Result<Event, Self::Error>> + Send + '_;

  fn get_event_by_key<'a>(
    &'a self,
    idempotency_key: &'a str,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + 'a;

  fn events_by_reserve(
    &self,
    reserve_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Event>, Self::Error>> + Send + '_;

  // ── Subscriptions ─────────────────────────────────────────────────────

  fn add_subscription(
    &self,
    input: NewSubscription,
  ) -> impl Future<Output = Result<Subscription, Self::Error>> + Send + '_;

  /// Soft-delete: flips `enabled` off and stamps `disabled_at`.
  fn disable_subscription(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_enabled_subscriptions<'a>(
    &'a self,
    source_key: &'a str,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + 'a;

  // ── Deliveries ────────────────────────────────────────────────────────

  /// Fetch the delivery for (event, subscription), creating a `pending` row
  /// with zero attempts if none exists yet.
  fn get_or_create_delivery(
    &self,
    event_id: Uuid,
    subscription_id: Uuid,
  ) -> impl Future<Output = Result<Delivery, Self::Error>> + Send + '_;

  /// Write back a mutated delivery (attempts, status, last error, sent-at).
  fn update_delivery<'a>(
    &'a self,
    delivery: &'a Delivery,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// All deliveries for a subscription, for delivery-health reporting.
  fn deliveries_for_subscription(
    &self,
    subscription_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Delivery>, Self::Error>> + Send + '_;

  /// Steady-state suppression query: whether the most recent `sent` delivery
  /// to this subscription for (region, category), among steady-state and
  /// recovery events, was a steady-state alert. When true, the condition has
  /// already been announced and has not recovered since.
  fn steady_alert_active<'a>(
    &'a self,
    subscription_id: Uuid,
    region_key: &'a str,
    category: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
