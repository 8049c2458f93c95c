//! Configuration surface consumed by the engine and the daemon binary.

use std::{path::PathBuf, time::Duration};

use hemovigil_core::threshold::ThresholdConfig;
use serde::{Deserialize, Serialize};

// ─── Dispatch ────────────────────────────────────────────────────────────────

/// Retry policy for notification dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
  /// Send attempts per (event, subscription) pair, including the first.
  pub max_attempts: u32,
  /// Sleep before retry N+1, in milliseconds; the last entry repeats if the
  /// attempt cap exceeds the schedule length.
  pub backoff_ms:   Vec<u64>,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self { max_attempts: 3, backoff_ms: vec![500, 1000, 2000] }
  }
}

impl DispatchConfig {
  /// Effective attempt cap; a misconfigured zero still allows one attempt.
  pub fn attempt_cap(&self) -> u32 { self.max_attempts.max(1) }

  /// Backoff to sleep after failed attempt `attempt` (1-based).
  pub fn backoff_after(&self, attempt: u32) -> Duration {
    let index = (attempt.max(1) - 1) as usize;
    let ms = self
      .backoff_ms
      .get(index)
      .or(self.backoff_ms.last())
      .copied()
      .unwrap_or(500);
    Duration::from_millis(ms)
  }
}

// ─── Daemon ──────────────────────────────────────────────────────────────────

fn default_poll_interval_secs() -> u64 { 900 }

/// Full configuration for the `hemovigild` binary, read from TOML and the
/// `HEMOVIGIL_` environment prefix.
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
  /// Path to the SQLite database file.
  pub db_path:      PathBuf,
  /// URL returning the latest snapshot as JSON.
  pub snapshot_url: String,

  #[serde(default = "default_poll_interval_secs")]
  pub poll_interval_secs:     u64,
  /// Reserved for periodic re-alerting of long-standing conditions; the
  /// steady-state suppression path does not consume it yet.
  #[serde(default)]
  pub reminder_interval_secs: Option<u64>,

  #[serde(default)]
  pub thresholds: ThresholdConfig,
  #[serde(default)]
  pub dispatch:   DispatchConfig,

  /// Base URL of the chat-bot API; the chat channel is only registered when
  /// this is set.
  #[serde(default)]
  pub chat_api_base: Option<String>,
}

impl DaemonConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_secs.max(1))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
