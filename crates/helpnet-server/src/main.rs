//! HelpNet server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `HELPNET_*`
//! environment overrides, opens the SQLite store, and serves the JSON API
//! under `/api`. When an urgency center is configured, the urgency monitor
//! runs alongside until shutdown.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use helpnet_server::{Assembled, assemble, config};
use helpnet_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "HelpNet API server")]
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
  let server_cfg = config::load(&cli.config)?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let Assembled { state, monitor } = assemble(&server_cfg, store)?;

  let (stop, stopped) = watch::channel(false);
  let monitor = monitor.map(|monitor| {
    let mut stopped = stopped.clone();
    tokio::spawn(monitor.run(async move {
      let _ = stopped.changed().await;
    }))
  });

  let app = Router::new().nest("/api", helpnet_api::api_router(state));
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      shutdown_signal().await;
      let _ = stop.send(true);
    })
    .await
    .context("server error")?;

  if let Some(handle) = monitor {
    handle.await.context("urgency monitor panicked")?;
  }
  Ok(())
}

async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => tracing::info!("shutting down"),
    Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c; shutting down"),
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
