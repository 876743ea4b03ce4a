//! Agora RPC server.
//!
//! Serves [`agora_api`] under `/api` over a single SQLite store that plays
//! all three services.

use std::path::{Path, PathBuf};

use agora_api::{AppState, Backend, api_router};
use agora_core::wire::ServiceIds;
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Prefix of the environment variables [`ServerConfig::load`] reads. Kept
/// apart from the client's `AGORA_*` so the two can share a shell.
pub const ENV_PREFIX: &str = "AGORA_SERVER";

/// Runtime server configuration, deserialised from `config.toml` and
/// `AGORA_SERVER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Hex-encoded root key. A fresh key is generated at startup when absent,
  /// which suits development clients that fetch it from `/api/status`.
  #[serde(default)]
  pub root_key:   Option<String>,
  #[serde(default)]
  pub services:   ServiceIds,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 4943 }

fn default_store_path() -> PathBuf { PathBuf::from("agora.db") }

impl ServerConfig {
  /// Layer `path` (skipped when absent) and `AGORA_SERVER_*` environment
  /// variables over the defaults.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    Self::load_with(path, environment())
  }

  fn load_with(path: &Path, env: config::Environment) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()?
      .try_deserialize()
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix(ENV_PREFIX)
    .prefix_separator("_")
    .separator("__")
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: Backend + Clone,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}
