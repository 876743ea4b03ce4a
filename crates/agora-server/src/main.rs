//! agora-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `AGORA_SERVER_*` environment variables, opens the SQLite store, and serves
//! the RPC API over HTTP.
//!
//! Nested keys use a double underscore, e.g.
//! `AGORA_SERVER_SERVICES__POST_STORE=rrkah-fqaaa-aaaaa-aaaaq-cai`.

use std::path::{Path, PathBuf};

use agora_api::AppState;
use agora_core::wire::RootKey;
use agora_server::ServerConfig;
use agora_store_sqlite::SqliteStore;
use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Agora RPC server")]
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

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

  let root_key = match &server_cfg.root_key {
    Some(hex) => RootKey::from_hex(hex).context("root_key must be 32 bytes of hex")?,
    None => {
      let key = RootKey::generate();
      tracing::warn!("no root_key configured; generated an ephemeral one");
      key
    }
  };
  tracing::info!(fingerprint = %root_key.fingerprint(), "trust root ready");

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let state = AppState::new(store, root_key, server_cfg.services.clone());
  let app = agora_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Resolve a leading `~/` against `$HOME`.
fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
