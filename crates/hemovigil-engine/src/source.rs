//! HTTP snapshot source — fetches a JSON document already shaped as a
//! [`Snapshot`].
//!
//! Field mapping from third-party payloads is an adapter concern and lives
//! outside this repository; this source only deserializes the normalized
//! form so the daemon is runnable end to end.

use std::time::Duration;

use hemovigil_core::snapshot::{Snapshot, SnapshotSource};
use thiserror::Error;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("snapshot request failed: {0}")]
  Http(#[from] reqwest::Error),
}

pub struct HttpSnapshotSource {
  client: reqwest::Client,
  url:    String,
}

impl HttpSnapshotSource {
  pub fn new(url: impl Into<String>) -> Self {
    let client = reqwest::Client::builder()
      .timeout(FETCH_TIMEOUT)
      .build()
      .unwrap_or_default();
    Self { client, url: url.into() }
  }
}

impl SnapshotSource for HttpSnapshotSource {
  type Error = SourceError;

  async fn fetch_latest(&self) -> Result<Snapshot, SourceError> {
    let snapshot = self
      .client
      .get(&self.url)
      .send()
      .await?
      .error_for_status()?
      .json::<Snapshot>()
      .await?;
    Ok(snapshot)
  }
}
