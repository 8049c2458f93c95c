//! Error type for the engine.

use thiserror::Error;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("snapshot fetch failed: {0}")]
  Fetch(#[source] BoxedError),

  #[error("store error: {0}")]
  Store(#[source] BoxedError),

  /// Shutdown was requested. The cycle aborts without committing in-flight
  /// delivery mutations; nothing is marked failed.
  #[error("cycle cancelled")]
  Cancelled,
}

impl EngineError {
  pub fn fetch(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Fetch(Box::new(e))
  }

  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}
