//! Chat-bot channel — renders the event as a short human-readable message
//! and posts it to a bot API, addressed by chat id.

use std::time::Duration;

use async_trait::async_trait;
use hemovigil_core::event::{Event, EventPayload, Signal};
use serde::Serialize;

use crate::channel::{
  Notifier, SendOutcome, classify_status, classify_transport,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  chat_id: &'a str,
  text:    String,
}

pub struct ChatBotNotifier {
  client:   reqwest::Client,
  /// Base URL of the bot API; messages go to `{api_base}/messages`.
  api_base: String,
}

impl ChatBotNotifier {
  pub fn new(api_base: impl Into<String>) -> Self {
    let client = reqwest::Client::builder()
      .timeout(DEFAULT_TIMEOUT)
      .build()
      .unwrap_or_default();
    Self { client, api_base: api_base.into() }
  }

  /// Render the event into message text. Malformed payloads still produce a
  /// usable message from the event envelope alone.
  fn render(event: &Event) -> String {
    let headline = match event.signal {
      Signal::CriticalActive => "Reserve critical",
      Signal::StatusAlert => "Reserve status alert",
      Signal::Recovery => "Reserve recovered",
    };

    let detail = match event.decode_payload() {
      Some(EventPayload::ReserveLevel { value, critical_units, .. }) => {
        format!("{value:.0} units on hand (critical level {critical_units:.0})")
      }
      Some(EventPayload::StatusTransition { previous, current, .. }) => {
        format!("status {} -> {}", previous.key(), current.key())
      }
      None => event.transition.key().to_owned(),
    };

    format!(
      "{headline}: {} / {} - {detail}",
      event.region_key, event.category
    )
  }
}

#[async_trait]
impl Notifier for ChatBotNotifier {
  fn type_key(&self) -> &'static str { "chat-bot" }

  async fn send(&self, event: &Event, target: &str) -> SendOutcome {
    let message = ChatMessage { chat_id: target, text: Self::render(event) };
    let url = format!("{}/messages", self.api_base.trim_end_matches('/'));

    let response = match self.client.post(&url).json(&message).send().await {
      Ok(response) => response,
      Err(e) => {
        return SendOutcome::Failed {
          kind:    classify_transport(&e),
          message: format!("chat-bot request failed: {e}"),
        };
      }
    };

    match classify_status(response.status()) {
      None => SendOutcome::sent_now(),
      Some(kind) => SendOutcome::Failed {
        kind,
        message: format!("chat-bot API returned {}", response.status()),
      },
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use hemovigil_core::event::{
    LevelState, Signal, Transition, RULE_RESERVE_LEVEL,
  };
  use uuid::Uuid;

  use super::*;

  fn event(payload: serde_json::Value) -> Event {
    Event {
      event_id:        Uuid::new_v4(),
      rule_key:        RULE_RESERVE_LEVEL.into(),
      source_key:      "ipst".into(),
      region_key:      "pt-norte".into(),
      category:        "blood-group-o-minus".into(),
      signal:          Signal::CriticalActive,
      transition:      Transition::EnteredCritical,
      payload,
      reserve_id:      Uuid::new_v4(),
      idempotency_key: "k".into(),
      created_at:      Utc::now(),
    }
  }

  #[test]
  fn renders_numeric_detail() {
    let payload = serde_json::to_value(EventPayload::ReserveLevel {
      signal:          Signal::CriticalActive,
      transition:      Transition::EnteredCritical,
      previous:        Some(LevelState::Normal),
      current:         LevelState::Critical { bucket: 3 },
      value:           90.0,
      previous_value:  Some(150.0),
      critical_units:  140.0,
      warning_units:   168.0,
      step_down_units: 14.0,
      captured_at:     Utc::now(),
    })
    .unwrap();

    let text = ChatBotNotifier::render(&event(payload));
    assert!(text.starts_with("Reserve critical"));
    assert!(text.contains("pt-norte / blood-group-o-minus - "));
    assert!(text.contains("90 units"));
    assert!(text.is_ascii());
  }

  #[test]
  fn malformed_payload_still_renders() {
    let text = ChatBotNotifier::render(&event(serde_json::json!({"rule": "???"})));
    assert!(text.contains("entered-critical"));
  }
}
