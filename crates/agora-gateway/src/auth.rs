//! Identity provider seam and the session context built on it.
//!
//! [`AuthClient`] is the consumed interface of an identity provider: `login`
//! resolves with an identity or without one (cancelled), `logout` clears the
//! session. [`AuthContext`] keeps a [`Gateway`] bound to whatever identity
//! the provider currently holds.

use std::{future::Future, path::PathBuf, sync::Arc};

use agora_core::{Identity, Principal};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use tokio::io::AsyncWriteExt as _;

use crate::{
  error::{AuthError, SessionError},
  gateway::Gateway,
  transport::Connector,
};

pub trait AuthClient: Send + Sync {
  /// Start a session. `None` means the user backed out.
  fn login(
    &self,
  ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send + '_;

  fn logout(&self) -> impl Future<Output = Result<(), AuthError>> + Send + '_;

  fn is_authenticated(
    &self,
  ) -> impl Future<Output = Result<bool, AuthError>> + Send + '_;

  /// The session identity, or the anonymous identity when logged out.
  fn identity(&self) -> impl Future<Output = Result<Identity, AuthError>> + Send + '_;
}

// ─── Key file ────────────────────────────────────────────────────────────────

/// A local stand-in for a delegation provider: the identity key lives in a
/// file that login creates and logout removes.
#[derive(Debug, Clone)]
pub struct KeyFileAuthClient {
  path: PathBuf,
}

impl KeyFileAuthClient {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &std::path::Path { &self.path }

  async fn load(&self) -> Result<Option<Identity>, AuthError> {
    let raw = match tokio::fs::read_to_string(&self.path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e.into()),
    };
    let bytes = B64
      .decode(raw.trim())
      .map_err(|e| AuthError::Corrupt(e.to_string()))?;
    let key: [u8; 32] = bytes
      .try_into()
      .map_err(|b: Vec<u8>| AuthError::Corrupt(format!("expected 32 bytes, got {}", b.len())))?;
    Ok(Some(Identity::from_key(key)))
  }

  async fn store(&self, identity: &Identity) -> Result<(), AuthError> {
    let Some(key) = identity.key() else {
      return Err(AuthError::Corrupt("cannot store the anonymous identity".to_string()));
    };
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    // Owner-only: the file holds a secret key.
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(&self.path).await?;
    file.write_all(format!("{}\n", B64.encode(key)).as_bytes()).await?;
    file.flush().await?;
    Ok(())
  }
}

impl AuthClient for KeyFileAuthClient {
  /// Reuse the stored key, or generate and store a new one.
  async fn login(&self) -> Result<Option<Identity>, AuthError> {
    if let Some(identity) = self.load().await? {
      return Ok(Some(identity));
    }
    let identity = Identity::generate();
    self.store(&identity).await?;
    tracing::info!(principal = %identity.principal(), "created identity key");
    Ok(Some(identity))
  }

  async fn logout(&self) -> Result<(), AuthError> {
    match tokio::fs::remove_file(&self.path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  async fn is_authenticated(&self) -> Result<bool, AuthError> {
    Ok(self.load().await?.is_some())
  }

  async fn identity(&self) -> Result<Identity, AuthError> {
    Ok(self.load().await?.unwrap_or_default())
  }
}

// ─── Session context ─────────────────────────────────────────────────────────

/// Owns the identity provider and keeps the Gateway bound to its identity.
pub struct AuthContext<A, C: Connector> {
  client:  A,
  gateway: Arc<Gateway<C>>,
}

impl<A: AuthClient, C: Connector> AuthContext<A, C> {
  /// Query the provider once and bind any existing session.
  pub async fn restore(client: A, gateway: Arc<Gateway<C>>) -> Result<Self, SessionError> {
    if client.is_authenticated().await? {
      let identity = client.identity().await?;
      tracing::info!(principal = %identity.principal(), "restored session");
      gateway.update_identity(identity).await?;
    }
    Ok(Self { client, gateway })
  }

  pub fn gateway(&self) -> &Arc<Gateway<C>> { &self.gateway }

  /// Returns the new principal, or `None` if the provider resolved without
  /// an identity (the Gateway is left as it was).
  pub async fn login(&self) -> Result<Option<Principal>, SessionError> {
    let Some(identity) = self.client.login().await? else {
      return Ok(None);
    };
    let principal = identity.principal().clone();
    self.gateway.update_identity(identity).await?;
    Ok(Some(principal))
  }

  pub async fn logout(&self) -> Result<(), SessionError> {
    self.client.logout().await?;
    self.gateway.clear_identity().await?;
    Ok(())
  }

  pub async fn is_authenticated(&self) -> Result<bool, SessionError> {
    Ok(self.client.is_authenticated().await?)
  }

  pub async fn principal(&self) -> Principal { self.gateway.principal().await }
}
