//! `agora`: command-line client for the Agora social network.
//!
//! Each page of the application is a subcommand. The process owns one
//! Gateway and one session context; the session identity is a key file
//! created by `agora login` and removed by `agora logout`.
//!
//! # Usage
//!
//! ```
//! agora login
//! agora register --username alice --display-name "Alice"
//! agora post "hello, world"
//! agora feed --limit 10
//! agora --config ~/.config/agora/config.toml follow bob
//! AGORA_MODE=production AGORA_ROOT_KEY=... agora feed
//! ```

mod commands;
mod render;

use std::{path::PathBuf, sync::Arc};

use agora_gateway::{
  Gateway, GatewayConfig, HttpConnector, Mode,
  auth::{AuthContext, KeyFileAuthClient},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use commands::Command;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

/// Flags override `AGORA_*` environment variables, which override the config
/// file, which overrides defaults.
#[derive(Parser, Debug)]
#[command(name = "agora", version, about = "Command-line client for Agora")]
struct Args {
  /// Path to a TOML config file.
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Server endpoint (default depends on --mode).
  #[arg(long)]
  host: Option<String>,

  #[arg(long, value_enum)]
  mode: Option<ModeArg>,

  /// Hex-encoded root key; required in production mode.
  #[arg(long)]
  root_key: Option<String>,

  /// Where the session identity key is kept.
  #[arg(long, value_name = "FILE")]
  key_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
  Development,
  Production,
}

impl From<ModeArg> for Mode {
  fn from(value: ModeArg) -> Self {
    match value {
      ModeArg::Development => Mode::Development,
      ModeArg::Production => Mode::Production,
    }
  }
}

impl Args {
  fn apply(&self, config: &mut GatewayConfig) {
    if let Some(mode) = self.mode {
      config.mode = mode.into();
    }
    if let Some(host) = &self.host {
      config.host = Some(host.clone());
    }
    if let Some(root_key) = &self.root_key {
      config.root_key = Some(root_key.clone());
    }
    if let Some(key_file) = &self.key_file {
      config.key_file = Some(key_file.clone());
    }
  }
}

fn default_key_file() -> PathBuf {
  match std::env::var_os("HOME") {
    Some(home) => PathBuf::from(home).join(".config/agora/identity.key"),
    None => PathBuf::from("agora-identity.key"),
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let mut config = GatewayConfig::load(args.config.as_deref()).with_context(|| {
    match &args.config {
      Some(path) => format!("loading config file {}", path.display()),
      None => "reading AGORA_* environment".to_string(),
    }
  })?;
  args.apply(&mut config);
  let key_file = config.key_file.clone().unwrap_or_else(default_key_file);

  let gateway = Arc::new(Gateway::new(HttpConnector::new(&config), config));
  let session = AuthContext::restore(KeyFileAuthClient::new(key_file), gateway)
    .await
    .context("restoring session")?;

  commands::run(&session, args.command).await
}
