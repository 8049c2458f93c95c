//! The notifier channel contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hemovigil_core::event::Event;
use reqwest::StatusCode;

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// How a failed send should be treated by the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
  /// Worth retrying after a backoff: rate limiting, server errors, timeouts.
  Transient,
  /// Retrying cannot help: bad credentials, unknown target, malformed address.
  Permanent,
}

/// The result of one send attempt.
#[derive(Debug, Clone)]
pub enum SendOutcome {
  Sent { at: DateTime<Utc> },
  Failed { kind: FailureKind, message: String },
}

impl SendOutcome {
  pub fn sent_now() -> Self { Self::Sent { at: Utc::now() } }

  pub fn transient(message: impl Into<String>) -> Self {
    Self::Failed { kind: FailureKind::Transient, message: message.into() }
  }

  pub fn permanent(message: impl Into<String>) -> Self {
    Self::Failed { kind: FailureKind::Permanent, message: message.into() }
  }
}

/// Classify an HTTP response status. `None` means success.
pub fn classify_status(status: StatusCode) -> Option<FailureKind> {
  if status.is_success() {
    return None;
  }
  let transient = status == StatusCode::REQUEST_TIMEOUT
    || status == StatusCode::TOO_MANY_REQUESTS
    || status.is_server_error();
  Some(if transient { FailureKind::Transient } else { FailureKind::Permanent })
}

/// Classify a reqwest transport error: request-building failures (a malformed
/// target address) cannot be retried; timeouts and connection problems can.
pub fn classify_transport(error: &reqwest::Error) -> FailureKind {
  if error.is_builder() {
    FailureKind::Permanent
  } else {
    FailureKind::Transient
  }
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// A pluggable transport that sends one formatted event to one target.
///
/// Implementations must not fail for ordinary remote errors — those belong in
/// the returned [`SendOutcome`]. Only cancellation may interrupt a send, and
/// that is handled outside the channel, between attempts.
#[async_trait]
pub trait Notifier: Send + Sync {
  /// Canonical channel type key, matched (after alias normalization) against
  /// a subscription's `channel_type`.
  fn type_key(&self) -> &'static str;

  async fn send(&self, event: &Event, target: &str) -> SendOutcome;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn success_statuses_classify_as_none() {
    assert_eq!(classify_status(StatusCode::OK), None);
    assert_eq!(classify_status(StatusCode::NO_CONTENT), None);
  }

  #[test]
  fn rate_limits_and_server_errors_are_transient() {
    assert_eq!(
      classify_status(StatusCode::TOO_MANY_REQUESTS),
      Some(FailureKind::Transient)
    );
    assert_eq!(
      classify_status(StatusCode::REQUEST_TIMEOUT),
      Some(FailureKind::Transient)
    );
    assert_eq!(
      classify_status(StatusCode::BAD_GATEWAY),
      Some(FailureKind::Transient)
    );
  }

  #[test]
  fn client_errors_are_permanent() {
    assert_eq!(
      classify_status(StatusCode::UNAUTHORIZED),
      Some(FailureKind::Permanent)
    );
    assert_eq!(
      classify_status(StatusCode::NOT_FOUND),
      Some(FailureKind::Permanent)
    );
    assert_eq!(
      classify_status(StatusCode::BAD_REQUEST),
      Some(FailureKind::Permanent)
    );
  }
}
