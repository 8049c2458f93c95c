//! Webhook channel — POSTs the event as JSON to a subscriber-owned URL.

use std::time::Duration;

use async_trait::async_trait;
use hemovigil_core::event::Event;
use serde::Serialize;

use crate::channel::{
  Notifier, SendOutcome, classify_status, classify_transport,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The JSON body delivered to webhook targets.
#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
  event_id:   &'a uuid::Uuid,
  rule:       &'a str,
  source:     &'a str,
  region:     &'a str,
  category:   &'a str,
  signal:     &'a str,
  transition: &'a str,
  detail:     &'a serde_json::Value,
  created_at: chrono::DateTime<chrono::Utc>,
}

pub struct WebhookNotifier {
  client: reqwest::Client,
}

impl WebhookNotifier {
  pub fn new() -> Self {
    let client = reqwest::Client::builder()
      .timeout(DEFAULT_TIMEOUT)
      .build()
      .unwrap_or_default();
    Self { client }
  }

  pub fn with_client(client: reqwest::Client) -> Self { Self { client } }
}

impl Default for WebhookNotifier {
  fn default() -> Self { Self::new() }
}

#[async_trait]
impl Notifier for WebhookNotifier {
  fn type_key(&self) -> &'static str { "webhook" }

  async fn send(&self, event: &Event, target: &str) -> SendOutcome {
    let body = WebhookBody {
      event_id:   &event.event_id,
      rule:       &event.rule_key,
      source:     &event.source_key,
      region:     &event.region_key,
      category:   &event.category,
      signal:     event.signal.key(),
      transition: event.transition.key(),
      detail:     &event.payload,
      created_at: event.created_at,
    };

    let response = match self.client.post(target).json(&body).send().await {
      Ok(response) => response,
      Err(e) => {
        return SendOutcome::Failed {
          kind:    classify_transport(&e),
          message: format!("webhook request failed: {e}"),
        };
      }
    };

    match classify_status(response.status()) {
      None => SendOutcome::sent_now(),
      Some(kind) => SendOutcome::Failed {
        kind,
        message: format!("webhook returned {}", response.status()),
      },
    }
  }
}
