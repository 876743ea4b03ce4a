//! Reply normalization.
//!
//! A fallible method's reply is a [`RemoteResult`] whose `Err` arm becomes
//! [`GatewayError::Business`]. Anything that does not decode into the
//! expected shape is a transport fault, so a refusal is never reported as
//! success and a protocol fault is never reported as a refusal.

use agora_core::wire::RemoteResult;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult, TransportError};

pub fn fallible<T: DeserializeOwned>(reply: Value) -> GatewayResult<T> {
  match decode::<RemoteResult<T>>(reply)? {
    RemoteResult::Ok(value) => Ok(value),
    RemoteResult::Err(reason) => Err(GatewayError::Business(reason)),
  }
}

pub fn plain<T: DeserializeOwned>(reply: Value) -> GatewayResult<T> {
  Ok(decode(reply)?)
}

fn decode<T: DeserializeOwned>(reply: Value) -> Result<T, TransportError> {
  serde_json::from_value(reply).map_err(|e| TransportError::Malformed(e.to_string()))
}
