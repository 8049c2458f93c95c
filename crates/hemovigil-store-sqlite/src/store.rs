//! [`SqliteStore`] — the SQLite implementation of [`ReserveStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use hemovigil_core::{
  delivery::{Delivery, DeliveryStatus},
  event::{Event, NewEvent},
  region::{Institution, Region},
  reserve::{Reserve, ReserveUpsert},
  store::ReserveStore,
  subscription::{NewSubscription, Subscription},
};

use crate::{
  encode::{
    RawDelivery, RawEvent, RawInstitution, RawRegion, RawReserve,
    RawSubscription, encode_date, encode_delivery_status, encode_dt,
    encode_scope, encode_uuid,
  },
  schema::SCHEMA,
  Error, Result,
};

const EVENT_COLUMNS: &str = "event_id, rule_key, source_key, region_key, \
   category, signal, transition, payload_json, reserve_id, idempotency_key, \
   created_at";

const RESERVE_COLUMNS: &str = "reserve_id, source_key, region_id, region_key, \
   category, value, status_key, status_label, captured_at, reference_date, \
   updated_at";

const DELIVERY_COLUMNS: &str = "delivery_id, event_id, subscription_id, \
   attempts, status, last_error, created_at, sent_at";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEvent> {
  Ok(RawEvent {
    event_id:        row.get(0)?,
    rule_key:        row.get(1)?,
    source_key:      row.get(2)?,
    region_key:      row.get(3)?,
    category:        row.get(4)?,
    signal:          row.get(5)?,
    transition:      row.get(6)?,
    payload_json:    row.get(7)?,
    reserve_id:      row.get(8)?,
    idempotency_key: row.get(9)?,
    created_at:      row.get(10)?,
  })
}

fn reserve_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReserve> {
  Ok(RawReserve {
    reserve_id:     row.get(0)?,
    source_key:     row.get(1)?,
    region_id:      row.get(2)?,
    region_key:     row.get(3)?,
    category:       row.get(4)?,
    value:          row.get(5)?,
    status_key:     row.get(6)?,
    status_label:   row.get(7)?,
    captured_at:    row.get(8)?,
    reference_date: row.get(9)?,
    updated_at:     row.get(10)?,
  })
}

fn delivery_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDelivery> {
  Ok(RawDelivery {
    delivery_id:     row.get(0)?,
    event_id:        row.get(1)?,
    subscription_id: row.get(2)?,
    attempts:        row.get(3)?,
    status:          row.get(4)?,
    last_error:      row.get(5)?,
    created_at:      row.get(6)?,
    sent_at:         row.get(7)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A hemovigil reserve store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All writes
/// are serialized through the connection's worker thread, which is the
/// per-cycle commit boundary the pipeline relies on.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_event_by_key(&self, key: String) -> Result<Option<Event>> {
    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {EVENT_COLUMNS} FROM events WHERE idempotency_key = ?1"),
              rusqlite::params![key],
              event_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }
}

// ─── ReserveStore impl ───────────────────────────────────────────────────────

impl ReserveStore for SqliteStore {
  type Error = Error;

  // ── Regions & institutions ────────────────────────────────────────────────

  async fn ensure_region(&self, key: &str, name: &str) -> Result<Region> {
    if let Some(existing) = self.get_region(key).await? {
      return Ok(existing);
    }

    let region = Region {
      region_id:  Uuid::new_v4(),
      key:        key.to_owned(),
      name:       name.to_owned(),
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(region.region_id);
    let key_str  = region.key.clone();
    let name_str = region.name.clone();
    let at_str   = encode_dt(region.created_at);

    self
      .conn
      .call(move |conn| {
        // A concurrent insert of the same key loses harmlessly; the row that
        // made it in is re-read below.
        conn.execute(
          "INSERT OR IGNORE INTO regions (region_id, key, name, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, key_str, name_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    self
      .get_region(key)
      .await?
      .ok_or_else(|| Error::Decode(format!("region vanished after insert: {key:?}")))
  }

  async fn get_region(&self, key: &str) -> Result<Option<Region>> {
    let key_str = key.to_owned();

    let raw: Option<RawRegion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT region_id, key, name, created_at FROM regions WHERE key = ?1",
              rusqlite::params![key_str],
              |row| {
                Ok(RawRegion {
                  region_id:  row.get(0)?,
                  key:        row.get(1)?,
                  name:       row.get(2)?,
                  created_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRegion::into_region).transpose()
  }

  async fn get_region_by_id(&self, id: Uuid) -> Result<Option<Region>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRegion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT region_id, key, name, created_at FROM regions WHERE region_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawRegion {
                  region_id:  row.get(0)?,
                  key:        row.get(1)?,
                  name:       row.get(2)?,
                  created_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRegion::into_region).transpose()
  }

  async fn add_institution(&self, name: &str, region_id: Uuid) -> Result<Institution> {
    let institution = Institution {
      institution_id: Uuid::new_v4(),
      name:           name.to_owned(),
      region_id,
      created_at:     Utc::now(),
    };

    let id_str     = encode_uuid(institution.institution_id);
    let name_str   = institution.name.clone();
    let region_str = encode_uuid(region_id);
    let at_str     = encode_dt(institution.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO institutions (institution_id, name, region_id, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name_str, region_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(institution)
  }

  async fn get_institution(&self, id: Uuid) -> Result<Option<Institution>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawInstitution> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT institution_id, name, region_id, created_at
               FROM institutions WHERE institution_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawInstitution {
                  institution_id: row.get(0)?,
                  name:           row.get(1)?,
                  region_id:      row.get(2)?,
                  created_at:     row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawInstitution::into_institution).transpose()
  }

  // ── Current-reserve rows ──────────────────────────────────────────────────

  async fn upsert_reserve(&self, input: ReserveUpsert) -> Result<Reserve> {
    let new_id_str   = encode_uuid(Uuid::new_v4());
    let source_str   = input.source_key.clone();
    let region_id    = encode_uuid(input.region_id);
    let region_key   = input.region_key.clone();
    let category     = input.category.clone();
    let value        = input.value;
    let status_key   = input.status_key.clone();
    let status_label = input.status_label.clone();
    let captured_str = encode_dt(input.captured_at);
    let ref_date_str = input.reference_date.map(encode_date);
    let updated_str  = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO reserves (
             reserve_id, source_key, region_id, region_key, category,
             value, status_key, status_label, captured_at, reference_date,
             updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (source_key, region_key, category) DO UPDATE SET
             value          = excluded.value,
             status_key     = excluded.status_key,
             status_label   = excluded.status_label,
             captured_at    = excluded.captured_at,
             reference_date = excluded.reference_date,
             updated_at     = excluded.updated_at",
          rusqlite::params![
            new_id_str,
            source_str,
            region_id,
            region_key,
            category,
            value,
            status_key,
            status_label,
            captured_str,
            ref_date_str,
            updated_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .get_reserve(&input.source_key, &input.region_key, &input.category)
      .await?
      .ok_or_else(|| {
        Error::Decode(format!(
          "reserve vanished after upsert: {}/{}/{}",
          input.source_key, input.region_key, input.category
        ))
      })
  }

  async fn get_reserve(
    &self,
    source_key: &str,
    region_key: &str,
    category: &str,
  ) -> Result<Option<Reserve>> {
    let source_str = source_key.to_owned();
    let region_str = region_key.to_owned();
    let cat_str    = category.to_owned();

    let raw: Option<RawReserve> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RESERVE_COLUMNS} FROM reserves
                 WHERE source_key = ?1 AND region_key = ?2 AND category = ?3"
              ),
              rusqlite::params![source_str, region_str, cat_str],
              reserve_from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawReserve::into_reserve).transpose()
  }

  async fn list_reserves(&self, source_key: &str) -> Result<Vec<Reserve>> {
    let source_str = source_key.to_owned();

    let raws: Vec<RawReserve> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESERVE_COLUMNS} FROM reserves
           WHERE source_key = ?1
           ORDER BY region_key, category"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![source_str], reserve_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReserve::into_reserve).collect()
  }

  // ── Events — append-only ──────────────────────────────────────────────────

  async fn existing_event_keys(&self, keys: &[String]) -> Result<Vec<String>> {
    if keys.is_empty() {
      return Ok(Vec::new());
    }
    let keys_owned = keys.to_vec();

    let found: Vec<String> = self
      .conn
      .call(move |conn| {
        let placeholders =
          vec!["?"; keys_owned.len()].join(", ");
        let sql = format!(
          "SELECT idempotency_key FROM events WHERE idempotency_key IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(keys_owned.iter()), |row| {
            row.get::<_, String>(0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(found)
  }

  async fn insert_event(&self, input: NewEvent) -> Result<Event> {
    let event = Event {
      event_id:        Uuid::new_v4(),
      rule_key:        input.payload.rule_key().to_owned(),
      source_key:      input.source_key,
      region_key:      input.region_key,
      category:        input.category,
      signal:          input.payload.signal(),
      transition:      input.payload.transition(),
      payload:         serde_json::to_value(&input.payload)?,
      reserve_id:      input.reserve_id,
      idempotency_key: input.idempotency_key,
      created_at:      Utc::now(),
    };

    let id_str       = encode_uuid(event.event_id);
    let rule_str     = event.rule_key.clone();
    let source_str   = event.source_key.clone();
    let region_str   = event.region_key.clone();
    let cat_str      = event.category.clone();
    let signal_str   = event.signal.key().to_owned();
    let trans_str    = event.transition.key().to_owned();
    let payload_str  = event.payload.to_string();
    let reserve_str  = encode_uuid(event.reserve_id);
    let key_str      = event.idempotency_key.clone();
    let created_str  = encode_dt(event.created_at);

    self
      .conn
      .call(move |conn| {
        // Re-inserting an existing idempotency key is a no-op; the caller
        // gets the previously persisted event back.
        conn.execute(
          "INSERT INTO events (
             event_id, rule_key, source_key, region_key, category,
             signal, transition, payload_json, reserve_id, idempotency_key,
             created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (idempotency_key) DO NOTHING",
          rusqlite::params![
            id_str,
            rule_str,
            source_str,
            region_str,
            cat_str,
            signal_str,
            trans_str,
            payload_str,
            reserve_str,
            key_str,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .fetch_event_by_key(event.idempotency_key.clone())
      .await?
      .ok_or_else(|| {
        Error::Decode(format!(
          "event vanished after insert: {:?}",
          event.idempotency_key
        ))
      })
  }

  async fn get_event_by_key(&self, idempotency_key: &str) -> Result<Option<Event>> {
    self.fetch_event_by_key(idempotency_key.to_owned()).await
  }

  async fn events_by_reserve(&self, reserve_id: Uuid) -> Result<Vec<Event>> {
    let reserve_str = encode_uuid(reserve_id);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM events
           WHERE reserve_id = ?1
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![reserve_str], event_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn add_subscription(&self, input: NewSubscription) -> Result<Subscription> {
    let subscription = Subscription {
      subscription_id: Uuid::new_v4(),
      source_key:      input.source_key,
      channel_type:    input.channel_type,
      target:          input.target,
      scope:           input.scope,
      category:        input.category,
      enabled:         true,
      created_at:      Utc::now(),
      disabled_at:     None,
    };

    let id_str      = encode_uuid(subscription.subscription_id);
    let source_str  = subscription.source_key.clone();
    let channel_str = subscription.channel_type.clone();
    let target_str  = subscription.target.clone();
    let scope_str   = encode_scope(&subscription.scope)?;
    let cat_str     = subscription.category.as_str().to_owned();
    let at_str      = encode_dt(subscription.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subscriptions (
             subscription_id, source_key, channel_type, target, scope_json,
             category, enabled, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
          rusqlite::params![
            id_str, source_str, channel_str, target_str, scope_str, cat_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(subscription)
  }

  async fn disable_subscription(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE subscriptions SET enabled = 0, disabled_at = ?2
           WHERE subscription_id = ?1 AND enabled = 1",
          rusqlite::params![id_str, at_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::SubscriptionNotFound(id));
    }
    Ok(())
  }

  async fn list_enabled_subscriptions(&self, source_key: &str) -> Result<Vec<Subscription>> {
    let source_str = source_key.to_owned();

    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT subscription_id, source_key, channel_type, target,
                  scope_json, category, enabled, created_at, disabled_at
           FROM subscriptions
           WHERE source_key = ?1 AND enabled = 1
           ORDER BY created_at, subscription_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![source_str], |row| {
            Ok(RawSubscription {
              subscription_id: row.get(0)?,
              source_key:      row.get(1)?,
              channel_type:    row.get(2)?,
              target:          row.get(3)?,
              scope_json:      row.get(4)?,
              category:        row.get(5)?,
              enabled:         row.get(6)?,
              created_at:      row.get(7)?,
              disabled_at:     row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawSubscription::into_subscription)
      .collect()
  }

  // ── Deliveries ────────────────────────────────────────────────────────────

  async fn get_or_create_delivery(
    &self,
    event_id: Uuid,
    subscription_id: Uuid,
  ) -> Result<Delivery> {
    let new_id_str = encode_uuid(Uuid::new_v4());
    let event_str  = encode_uuid(event_id);
    let sub_str    = encode_uuid(subscription_id);
    let at_str     = encode_dt(Utc::now());
    let status_str = encode_delivery_status(DeliveryStatus::Pending).to_owned();

    let raw: RawDelivery = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO deliveries (
             delivery_id, event_id, subscription_id, attempts, status,
             created_at
           ) VALUES (?1, ?2, ?3, 0, ?4, ?5)
           ON CONFLICT (event_id, subscription_id) DO NOTHING",
          rusqlite::params![new_id_str, event_str, sub_str, status_str, at_str],
        )?;

        conn.query_row(
          &format!(
            "SELECT {DELIVERY_COLUMNS} FROM deliveries
             WHERE event_id = ?1 AND subscription_id = ?2"
          ),
          rusqlite::params![event_str, sub_str],
          delivery_from_row,
        )
        .map_err(Into::into)
      })
      .await?;

    raw.into_delivery()
  }

  async fn update_delivery(&self, delivery: &Delivery) -> Result<()> {
    let id_str     = encode_uuid(delivery.delivery_id);
    let attempts   = delivery.attempts;
    let status_str = encode_delivery_status(delivery.status).to_owned();
    let error_str  = delivery.last_error.clone();
    let sent_str   = delivery.sent_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE deliveries SET
             attempts = ?2, status = ?3, last_error = ?4, sent_at = ?5
           WHERE delivery_id = ?1",
          rusqlite::params![id_str, attempts, status_str, error_str, sent_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn deliveries_for_subscription(&self, subscription_id: Uuid) -> Result<Vec<Delivery>> {
    let sub_str = encode_uuid(subscription_id);

    let raws: Vec<RawDelivery> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DELIVERY_COLUMNS} FROM deliveries
           WHERE subscription_id = ?1
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![sub_str], delivery_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDelivery::into_delivery).collect()
  }

  async fn steady_alert_active(
    &self,
    subscription_id: Uuid,
    region_key: &str,
    category: &str,
  ) -> Result<bool> {
    let sub_str    = encode_uuid(subscription_id);
    let region_str = region_key.to_owned();
    let cat_str    = category.to_owned();

    let last: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT e.transition
               FROM deliveries d
               JOIN events e ON e.event_id = d.event_id
               WHERE d.subscription_id = ?1
                 AND d.status = 'sent'
                 AND e.region_key = ?2
                 AND e.category = ?3
                 AND e.transition IN
                   ('still-critical', 'recovered-from-critical', 'recovered-to-normal')
               ORDER BY e.created_at DESC, e.rowid DESC
               LIMIT 1",
              rusqlite::params![sub_str, region_str, cat_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(last.as_deref() == Some("still-critical"))
  }
}
