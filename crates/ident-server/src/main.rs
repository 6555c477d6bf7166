//! ident-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! configured contact store and serves the identity API over HTTP.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use ident_core::{memory::MemoryStore, resolver::Resolver, store::ContactStore};
use ident_server::{ServerConfig, StoreLocation};
use ident_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Contact identity resolution server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to read config from {:?}", cli.config))?;

  match cfg.store_location() {
    StoreLocation::Memory => {
      tracing::warn!("using in-memory store; contacts are lost on exit");
      serve(MemoryStore::new(), &cfg).await
    }
    StoreLocation::Sqlite(path) => {
      let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("failed to open store at {path:?}"))?;
      store
        .set_busy_timeout(Duration::from_millis(cfg.tx_timeout_ms))
        .await
        .context("failed to set busy timeout")?;
      tracing::info!(path = %path.display(), "opened sqlite store");
      serve(store, &cfg).await
    }
  }
}

async fn serve<S>(store: S, cfg: &ServerConfig) -> anyhow::Result<()>
where
  S: ContactStore + 'static,
{
  let resolver = Resolver::with_policy(Arc::new(store), cfg.retry_policy());
  let app = ident_api::api_router(resolver);

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
