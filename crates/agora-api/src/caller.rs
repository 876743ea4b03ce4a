//! Request attribution.
//!
//! An RPC request is accepted only if it trusts this server's root key. Its
//! caller is the principal whose key signed it, or the anonymous principal
//! when it carries no signature. A signature is checked against the endpoint,
//! method and exact body bytes it arrived with, and is accepted once.

use std::{
  collections::HashMap,
  sync::{Mutex, PoisonError},
};

use agora_core::{
  Principal,
  signature::{CallSignature, SignatureError},
  wire::{Method, ROOT_HEADER, Service},
};
use axum::{
  body::Bytes,
  extract::{FromRequest, FromRequestParts, Path, Request},
  http::request::Parts,
};
use chrono::Utc;
use serde_json::Value;

use crate::{AppState, Backend, error::ApiError};

/// One authenticated RPC call: who made it, what it targets, and its
/// positional arguments.
#[derive(Debug, Clone)]
pub struct Caller {
  pub principal: Principal,
  pub service:   Service,
  pub method:    Method,
  pub args:      Value,
}

impl<S> FromRequest<AppState<S>> for Caller
where
  S: Backend,
{
  type Rejection = ApiError;

  async fn from_request(
    req: Request,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (mut parts, body) = req.into_parts();
    require_root(&parts, state)?;

    let Path((service_id, name)) =
      Path::<(String, String)>::from_request_parts(&mut parts, state)
        .await
        .map_err(|e| ApiError::NotFound(e.body_text()))?;
    let service = state
      .services
      .resolve(&service_id)
      .ok_or_else(|| ApiError::NotFound(format!("no service {service_id}")))?;
    let method = name
      .parse::<Method>()
      .ok()
      .filter(|m| m.service() == service)
      .ok_or_else(|| ApiError::NotFound(format!("{service} has no method {name}")))?;

    let signature = CallSignature::from_headers(|name| {
      parts.headers.get(name).and_then(|v| v.to_str().ok())
    })
    .map_err(unauthorized)?;

    let body = Bytes::from_request(Request::from_parts(parts, body), state)
      .await
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let principal = match signature {
      None => Principal::anonymous(),
      Some(signature) => {
        let principal = signature
          .verify(&service_id, method, &body)
          .map_err(unauthorized)?;
        if !state.replay.admit(&signature) {
          return Err(ApiError::Unauthorized("signed call was replayed".to_string()));
        }
        principal
      }
    };

    let args = serde_json::from_slice(&body)
      .map_err(|e| ApiError::BadRequest(format!("invalid arguments: {e}")))?;

    Ok(Caller { principal, service, method, args })
  }
}

fn require_root<S>(parts: &Parts, state: &AppState<S>) -> Result<(), ApiError> {
  let presented = parts
    .headers
    .get(ROOT_HEADER)
    .and_then(|v| v.to_str().ok());
  if presented != Some(state.root_key.fingerprint().as_str()) {
    return Err(ApiError::Unauthorized(
      "request does not trust this server's root key".to_string(),
    ));
  }
  Ok(())
}

fn unauthorized(e: SignatureError) -> ApiError { ApiError::Unauthorized(e.to_string()) }

/// Signatures seen and not yet expired.
#[derive(Debug, Default)]
pub struct ReplayGuard {
  seen: Mutex<HashMap<String, i64>>,
}

impl ReplayGuard {
  /// Record `signature`. Returns `false` if it was already presented.
  pub fn admit(&self, signature: &CallSignature) -> bool {
    let now = Utc::now().timestamp();
    let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
    seen.retain(|_, expiry| *expiry >= now);
    seen
      .insert(signature.signature.clone(), signature.expiry)
      .is_none()
  }
}
