//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, dates as ISO 8601 dates.
//! Structured fields (subscription scope, event payloads) are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, Utc};
use hemovigil_core::{
  delivery::{Delivery, DeliveryStatus},
  event::{Event, Signal, Transition},
  region::{Institution, Region},
  reserve::Reserve,
  subscription::{CategoryFilter, Scope, Subscription},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|_| Error::DateParse(format!("bad date: {s:?}")))
}

// ─── Signal / Transition ─────────────────────────────────────────────────────

pub fn decode_signal(s: &str) -> Result<Signal> {
  match s {
    "critical-active" => Ok(Signal::CriticalActive),
    "status-alert" => Ok(Signal::StatusAlert),
    "recovery" => Ok(Signal::Recovery),
    other => Err(Error::Decode(format!("signal: {other:?}"))),
  }
}

pub fn decode_transition(s: &str) -> Result<Transition> {
  match s {
    "initial-critical" => Ok(Transition::InitialCritical),
    "still-critical" => Ok(Transition::StillCritical),
    "entered-critical" => Ok(Transition::EnteredCritical),
    "recovered-from-critical" => Ok(Transition::RecoveredFromCritical),
    "entered-non-normal" => Ok(Transition::EnteredNonNormal),
    "worsened" => Ok(Transition::Worsened),
    "recovered-to-normal" => Ok(Transition::RecoveredToNormal),
    other => Err(Error::Decode(format!("transition: {other:?}"))),
  }
}

// ─── Scope / delivery status ─────────────────────────────────────────────────

pub fn encode_scope(scope: &Scope) -> Result<String> {
  Ok(serde_json::to_string(scope)?)
}

pub fn decode_scope(s: &str) -> Result<Scope> { Ok(serde_json::from_str(s)?) }

pub fn encode_delivery_status(status: DeliveryStatus) -> &'static str {
  match status {
    DeliveryStatus::Pending => "pending",
    DeliveryStatus::Sent => "sent",
    DeliveryStatus::Failed => "failed",
  }
}

pub fn decode_delivery_status(s: &str) -> Result<DeliveryStatus> {
  match s {
    "pending" => Ok(DeliveryStatus::Pending),
    "sent" => Ok(DeliveryStatus::Sent),
    "failed" => Ok(DeliveryStatus::Failed),
    other => Err(Error::Decode(format!("delivery status: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `regions` row.
pub struct RawRegion {
  pub region_id:  String,
  pub key:        String,
  pub name:       String,
  pub created_at: String,
}

impl RawRegion {
  pub fn into_region(self) -> Result<Region> {
    Ok(Region {
      region_id:  decode_uuid(&self.region_id)?,
      key:        self.key,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawInstitution {
  pub institution_id: String,
  pub name:           String,
  pub region_id:      String,
  pub created_at:     String,
}

impl RawInstitution {
  pub fn into_institution(self) -> Result<Institution> {
    Ok(Institution {
      institution_id: decode_uuid(&self.institution_id)?,
      name:           self.name,
      region_id:      decode_uuid(&self.region_id)?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `reserves` row.
pub struct RawReserve {
  pub reserve_id:     String,
  pub source_key:     String,
  pub region_id:      String,
  pub region_key:     String,
  pub category:       String,
  pub value:          Option<f64>,
  pub status_key:     Option<String>,
  pub status_label:   Option<String>,
  pub captured_at:    String,
  pub reference_date: Option<String>,
  pub updated_at:     String,
}

impl RawReserve {
  pub fn into_reserve(self) -> Result<Reserve> {
    Ok(Reserve {
      reserve_id:     decode_uuid(&self.reserve_id)?,
      source_key:     self.source_key,
      region_id:      decode_uuid(&self.region_id)?,
      region_key:     self.region_key,
      category:       self.category,
      value:          self.value,
      status_key:     self.status_key,
      status_label:   self.status_label,
      captured_at:    decode_dt(&self.captured_at)?,
      reference_date: self
        .reference_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:        String,
  pub rule_key:        String,
  pub source_key:      String,
  pub region_key:      String,
  pub category:        String,
  pub signal:          String,
  pub transition:      String,
  pub payload_json:    String,
  pub reserve_id:      String,
  pub idempotency_key: String,
  pub created_at:      String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:        decode_uuid(&self.event_id)?,
      rule_key:        self.rule_key,
      source_key:      self.source_key,
      region_key:      self.region_key,
      category:        self.category,
      signal:          decode_signal(&self.signal)?,
      transition:      decode_transition(&self.transition)?,
      payload:         serde_json::from_str(&self.payload_json)?,
      reserve_id:      decode_uuid(&self.reserve_id)?,
      idempotency_key: self.idempotency_key,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `subscriptions` row.
pub struct RawSubscription {
  pub subscription_id: String,
  pub source_key:      String,
  pub channel_type:    String,
  pub target:          String,
  pub scope_json:      String,
  pub category:        String,
  pub enabled:         bool,
  pub created_at:      String,
  pub disabled_at:     Option<String>,
}

impl RawSubscription {
  pub fn into_subscription(self) -> Result<Subscription> {
    Ok(Subscription {
      subscription_id: decode_uuid(&self.subscription_id)?,
      source_key:      self.source_key,
      channel_type:    self.channel_type,
      target:          self.target,
      scope:           decode_scope(&self.scope_json)?,
      category:        CategoryFilter::from_str(&self.category),
      enabled:         self.enabled,
      created_at:      decode_dt(&self.created_at)?,
      disabled_at:     self
        .disabled_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
    })
  }
}

/// Raw strings read directly from a `deliveries` row.
pub struct RawDelivery {
  pub delivery_id:     String,
  pub event_id:        String,
  pub subscription_id: String,
  pub attempts:        u32,
  pub status:          String,
  pub last_error:      Option<String>,
  pub created_at:      String,
  pub sent_at:         Option<String>,
}

impl RawDelivery {
  pub fn into_delivery(self) -> Result<Delivery> {
    Ok(Delivery {
      delivery_id:     decode_uuid(&self.delivery_id)?,
      event_id:        decode_uuid(&self.event_id)?,
      subscription_id: decode_uuid(&self.subscription_id)?,
      attempts:        self.attempts,
      status:          decode_delivery_status(&self.status)?,
      last_error:      self.last_error,
      created_at:      decode_dt(&self.created_at)?,
      sent_at:         self.sent_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
