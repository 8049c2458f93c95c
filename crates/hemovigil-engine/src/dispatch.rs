//! The dispatch engine — turns a batch of freshly persisted events into
//! deliveries through the registered notifier channels.
//!
//! Each (event, subscription) pair is handled independently: one pair's
//! failure never blocks another, and nothing here aborts the cycle except
//! cancellation. Retries for a pair are strictly sequential; the backoff
//! sleep is the only suspension point between attempts.

use std::collections::HashMap;

use hemovigil_core::{
  delivery::DeliveryStatus,
  event::Event,
  store::ReserveStore,
  subscription::{Scope, Subscription},
};
use hemovigil_notify::{FailureKind, NotifierRegistry, SendOutcome};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{config::DispatchConfig, error::EngineError};

/// Dispatches one batch of events. Borrowed pieces only — the orchestrator
/// owns the store and registry.
pub struct Dispatcher<'a, S> {
  store:    &'a S,
  registry: &'a NotifierRegistry,
  config:   &'a DispatchConfig,
}

impl<'a, S: ReserveStore> Dispatcher<'a, S> {
  pub fn new(
    store: &'a S,
    registry: &'a NotifierRegistry,
    config: &'a DispatchConfig,
  ) -> Self {
    Self { store, registry, config }
  }

  /// Dispatch `events` to every matching enabled subscription. Returns the
  /// number of deliveries that reached `sent`.
  ///
  /// `events` must be the batch persisted this cycle; events fully handled in
  /// earlier cycles are never re-dispatched because their deliveries are
  /// already terminal.
  pub async fn dispatch(
    &self,
    events: &[Event],
    cancel: &CancellationToken,
  ) -> Result<usize, EngineError> {
    if events.is_empty() {
      return Ok(0);
    }

    let subscriptions = self.load_subscriptions(events).await?;
    let institution_regions =
      self.resolve_institution_regions(&subscriptions).await?;

    let mut sent_count = 0;
    for event in events {
      for subscription in &subscriptions {
        if !matches(event, subscription, &institution_regions) {
          continue;
        }
        if cancel.is_cancelled() {
          return Err(EngineError::Cancelled);
        }
        if self.deliver_pair(event, subscription, cancel).await? {
          sent_count += 1;
        }
      }
    }

    Ok(sent_count)
  }

  /// Enabled subscriptions for every source represented in the batch.
  async fn load_subscriptions(
    &self,
    events: &[Event],
  ) -> Result<Vec<Subscription>, EngineError> {
    let mut sources: Vec<&str> =
      events.iter().map(|e| e.source_key.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();

    let mut subscriptions = Vec::new();
    for source in sources {
      subscriptions.extend(
        self
          .store
          .list_enabled_subscriptions(source)
          .await
          .map_err(EngineError::store)?,
      );
    }
    Ok(subscriptions)
  }

  /// Region key per institution referenced by an institution-scoped
  /// subscription. A dangling reference resolves to no region and simply
  /// never matches.
  async fn resolve_institution_regions(
    &self,
    subscriptions: &[Subscription],
  ) -> Result<HashMap<Uuid, String>, EngineError> {
    let mut regions = HashMap::new();
    for subscription in subscriptions {
      let Scope::Institution { institution_id } = subscription.scope else {
        continue;
      };
      if regions.contains_key(&institution_id) {
        continue;
      }
      let institution = self
        .store
        .get_institution(institution_id)
        .await
        .map_err(EngineError::store)?;
      let Some(institution) = institution else { continue };
      let region = self
        .store
        .get_region_by_id(institution.region_id)
        .await
        .map_err(EngineError::store)?;
      if let Some(region) = region {
        regions.insert(institution_id, region.key);
      }
    }
    Ok(regions)
  }

  /// Handle one (event, subscription) pair end to end. Returns whether the
  /// delivery reached `sent`.
  async fn deliver_pair(
    &self,
    event: &Event,
    subscription: &Subscription,
    cancel: &CancellationToken,
  ) -> Result<bool, EngineError> {
    let mut delivery = self
      .store
      .get_or_create_delivery(event.event_id, subscription.subscription_id)
      .await
      .map_err(EngineError::store)?;

    // `sent` and `failed` are terminal; re-runs skip them.
    if delivery.status.is_terminal() {
      return Ok(false);
    }

    // Steady-state suppression: a condition that was already announced and
    // has not recovered is not announced again every cycle.
    if event.transition.is_steady_state()
      && self
        .store
        .steady_alert_active(
          subscription.subscription_id,
          &event.region_key,
          &event.category,
        )
        .await
        .map_err(EngineError::store)?
    {
      tracing::debug!(
        event = %event.event_id,
        subscription = %subscription.subscription_id,
        "steady-state alert suppressed"
      );
      return Ok(false);
    }

    let Some(notifier) = self.registry.get(&subscription.channel_type) else {
      delivery.status = DeliveryStatus::Failed;
      delivery.last_error = Some(format!(
        "no notifier registered for channel type {:?}",
        subscription.channel_type
      ));
      self
        .store
        .update_delivery(&delivery)
        .await
        .map_err(EngineError::store)?;
      tracing::warn!(
        subscription = %subscription.subscription_id,
        channel_type = %subscription.channel_type,
        "delivery failed: unknown channel type"
      );
      return Ok(false);
    };

    let cap = self.config.attempt_cap();
    for attempt in 1..=cap {
      if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
      }
      delivery.attempts = attempt;

      match notifier.send(event, &subscription.target).await {
        SendOutcome::Sent { at } => {
          delivery.status = DeliveryStatus::Sent;
          delivery.sent_at = Some(at);
          delivery.last_error = None;
          self
            .store
            .update_delivery(&delivery)
            .await
            .map_err(EngineError::store)?;
          return Ok(true);
        }
        SendOutcome::Failed { kind: FailureKind::Permanent, message } => {
          delivery.status = DeliveryStatus::Failed;
          delivery.last_error = Some(message);
          self
            .store
            .update_delivery(&delivery)
            .await
            .map_err(EngineError::store)?;
          return Ok(false);
        }
        SendOutcome::Failed { kind: FailureKind::Transient, message } => {
          delivery.last_error = Some(message);
          if attempt >= cap {
            delivery.status = DeliveryStatus::Failed;
          }
          self
            .store
            .update_delivery(&delivery)
            .await
            .map_err(EngineError::store)?;
          if attempt >= cap {
            return Ok(false);
          }

          tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(self.config.backoff_after(attempt)) => {}
          }
        }
      }
    }

    Ok(false)
  }
}

/// Scope and category matching for one (event, subscription) pair.
///
/// A region scope matches by region key. An institution scope matches iff the
/// institution's resolved region key equals the event's — the institution
/// itself is never compared.
fn matches(
  event: &Event,
  subscription: &Subscription,
  institution_regions: &HashMap<Uuid, String>,
) -> bool {
  if subscription.source_key != event.source_key {
    return false;
  }

  let scope_matches = match &subscription.scope {
    Scope::Region { region_key } => *region_key == event.region_key,
    Scope::Institution { institution_id } => institution_regions
      .get(institution_id)
      .is_some_and(|key| *key == event.region_key),
  };

  scope_matches && subscription.category.matches(&event.category)
}
