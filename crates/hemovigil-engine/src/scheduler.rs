//! The polling scheduler — one long-lived loop, one cycle at a time.

use std::time::Duration;

use hemovigil_core::{snapshot::SnapshotSource, store::ReserveStore};
use tokio_util::sync::CancellationToken;

use crate::{error::EngineError, ingest::Engine};

/// Run cycles until cancelled. Cycles never overlap: the next one starts
/// only after the current one finishes and the interval elapses.
///
/// A failed cycle is logged and the loop keeps going; nothing short of
/// cancellation stops ingestion.
pub async fn run<S, F>(
  engine: &Engine<S, F>,
  poll_interval: Duration,
  cancel: CancellationToken,
) where
  S: ReserveStore,
  F: SnapshotSource,
{
  loop {
    if cancel.is_cancelled() {
      break;
    }

    match engine.run_cycle(&cancel).await {
      Ok(outcome) => {
        tracing::info!(
          reserves = outcome.reserves_upserted,
          events = outcome.events_inserted,
          sent = outcome.deliveries_sent,
          elapsed_ms = outcome.duration.as_millis() as u64,
          "cycle complete"
        );
      }
      Err(EngineError::Cancelled) => break,
      Err(e) => {
        tracing::warn!(error = %e, "cycle failed; will retry next interval");
      }
    }

    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = tokio::time::sleep(poll_interval) => {}
    }
  }

  tracing::info!("scheduler stopped");
}
