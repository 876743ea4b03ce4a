//! `GET /status`

use agora_core::wire::StatusReply;
use axum::{Json, extract::State};

use crate::{AppState, Backend};

/// Publishes the root key so development clients can trust it.
pub async fn handler<S>(State(state): State<AppState<S>>) -> Json<StatusReply>
where
  S: Backend,
{
  Json(StatusReply {
    root_key: state.root_key.to_hex(),
    version:  env!("CARGO_PKG_VERSION").to_string(),
  })
}
