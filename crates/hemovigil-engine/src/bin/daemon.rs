//! hemovigild — the hemovigil ingestion daemon.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and polls the snapshot source until interrupted.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use hemovigil_core::catalog::Catalogs;
use hemovigil_engine::{
  DaemonConfig, Engine, ingest::standard_rules, scheduler,
  source::HttpSnapshotSource,
};
use hemovigil_notify::{ChatBotNotifier, NotifierRegistry, WebhookNotifier};
use hemovigil_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "hemovigil reserve-monitoring daemon")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HEMOVIGIL"))
    .build()
    .context("failed to read config file")?;

  let daemon_cfg: DaemonConfig = settings
    .try_deserialize()
    .context("failed to deserialise DaemonConfig")?;

  // Open SQLite store.
  let store = SqliteStore::open(&daemon_cfg.db_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", daemon_cfg.db_path))?;

  // Catalogs are built once and shared by reference through the rules.
  let catalogs = Catalogs::default();
  let rules = standard_rules(&daemon_cfg.thresholds, &catalogs);

  let mut registry = NotifierRegistry::new();
  registry.register(Box::new(WebhookNotifier::new()));
  if let Some(api_base) = &daemon_cfg.chat_api_base {
    registry.register(Box::new(ChatBotNotifier::new(api_base.clone())));
  }

  let source = HttpSnapshotSource::new(daemon_cfg.snapshot_url.clone());
  let engine = Engine::new(
    store,
    source,
    rules,
    registry,
    daemon_cfg.dispatch.clone(),
  );

  // Cooperative shutdown on Ctrl-C.
  let cancel = CancellationToken::new();
  let shutdown = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::info!("shutdown requested");
      shutdown.cancel();
    }
  });

  tracing::info!(
    url = %daemon_cfg.snapshot_url,
    interval_secs = daemon_cfg.poll_interval_secs,
    "starting ingestion loop"
  );
  scheduler::run(&engine, daemon_cfg.poll_interval(), cancel).await;

  Ok(())
}
