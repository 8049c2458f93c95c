//! The hemovigil pipeline engine: ingestion orchestration, notification
//! dispatch, and the polling scheduler that drives both.
//!
//! The engine is generic over the [`hemovigil_core::store::ReserveStore`] and
//! [`hemovigil_core::snapshot::SnapshotSource`] seams; the daemon binary
//! wires in the SQLite store and an HTTP snapshot source.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod scheduler;
pub mod source;

pub use config::{DaemonConfig, DispatchConfig};
pub use dispatch::Dispatcher;
pub use error::EngineError;
pub use ingest::{CycleOutcome, Engine};

#[cfg(test)]
mod tests;
