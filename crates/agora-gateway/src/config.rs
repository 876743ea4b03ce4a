//! Gateway configuration.

use std::path::{Path, PathBuf};

use agora_core::wire::ServiceIds;
use serde::{Deserialize, Serialize};

/// Host used in development when none is configured.
pub const DEVELOPMENT_HOST: &str = "http://127.0.0.1:4943";

/// Host used in production when none is configured.
pub const PRODUCTION_HOST: &str = "https://ic0.app";

/// Deployment mode. Development fetches the root key from the server at
/// bootstrap; production requires it up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  #[default]
  Development,
  Production,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
  #[serde(default)]
  pub mode:                 Mode,
  /// Overrides the mode's default host.
  #[serde(default)]
  pub host:                 Option<String>,
  /// Hex-encoded root key. Required in production.
  #[serde(default)]
  pub root_key:             Option<String>,
  #[serde(default = "default_timeout")]
  pub request_timeout_secs: u64,
  #[serde(default)]
  pub services:             ServiceIds,
  /// Where [`KeyFileAuthClient`](crate::auth::KeyFileAuthClient) keeps the
  /// session key. The client picks a default when unset.
  #[serde(default)]
  pub key_file:             Option<PathBuf>,
}

/// Prefix of the environment variables [`GatewayConfig::load`] reads.
pub const ENV_PREFIX: &str = "AGORA";

fn default_timeout() -> u64 { 30 }

impl Default for GatewayConfig {
  fn default() -> Self {
    Self {
      mode:                 Mode::default(),
      host:                 None,
      root_key:             None,
      request_timeout_secs: default_timeout(),
      services:             ServiceIds::default(),
      key_file:             None,
    }
  }
}

impl GatewayConfig {
  pub fn production(root_key: impl Into<String>) -> Self {
    Self {
      mode: Mode::Production,
      root_key: Some(root_key.into()),
      ..Self::default()
    }
  }

  pub fn with_host(mut self, host: impl Into<String>) -> Self {
    self.host = Some(host.into());
    self
  }

  /// The endpoint the transport is addressed at.
  pub fn host(&self) -> &str {
    match (&self.host, self.mode) {
      (Some(host), _) => host,
      (None, Mode::Development) => DEVELOPMENT_HOST,
      (None, Mode::Production) => PRODUCTION_HOST,
    }
  }

  /// Layer a config file (if given, it must exist) and `AGORA_*`
  /// environment variables over the defaults. Nested keys use `__`, e.g.
  /// `AGORA_SERVICES__POST_STORE`.
  pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
    Self::load_with(path, environment())
  }

  fn load_with(
    path: Option<&Path>,
    env: config::Environment,
  ) -> Result<Self, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
      builder = builder.add_source(config::File::from(path));
    }
    builder.add_source(env).build()?.try_deserialize()
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix(ENV_PREFIX)
    .prefix_separator("_")
    .separator("__")
}
