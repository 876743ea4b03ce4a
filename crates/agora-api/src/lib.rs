//! RPC surface for the three Agora services.
//!
//! Exposes an axum [`Router`] backed by any store implementing
//! [`UserDirectory`], [`PostStore`] and [`SocialGraph`]. Every request must
//! present the fingerprint of the server's [`RootKey`]; the caller is whoever
//! signed the request (see [`caller`]).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", agora_api::api_router(state))
//! ```
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/status` | Root key and server version |
//! | `POST` | `/rpc/{service_id}/{method}` | Body: JSON array of arguments |

pub mod caller;
pub mod error;
pub mod rpc;
pub mod status;

use std::sync::Arc;

use agora_core::{
  service::{PostStore, SocialGraph, UserDirectory},
  wire::{RootKey, ServiceIds},
};
use axum::{
  Router,
  routing::{get, post},
};

pub use caller::ReplayGuard;
pub use error::ApiError;

/// A store that serves all three services.
pub trait Backend: UserDirectory + PostStore + SocialGraph + 'static {}

impl<S> Backend for S where S: UserDirectory + PostStore + SocialGraph + 'static {}

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub root_key: Arc<RootKey>,
  pub services: Arc<ServiceIds>,
  pub replay:   Arc<ReplayGuard>,
}

impl<S> AppState<S> {
  pub fn new(store: S, root_key: RootKey, services: ServiceIds) -> Self {
    Self {
      store:    Arc::new(store),
      root_key: Arc::new(root_key),
      services: Arc::new(services),
      replay:   Arc::new(ReplayGuard::default()),
    }
  }
}

/// Build a fully-materialised API router for `state`.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: Backend + Clone,
{
  Router::new()
    .route("/status", get(status::handler::<S>))
    .route("/rpc/{service_id}/{method}", post(rpc::handler::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
