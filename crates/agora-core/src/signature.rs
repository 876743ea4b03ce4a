//! Signed calls.
//!
//! A call made under a non-anonymous [`Identity`] carries four headers: the
//! sender's ed25519 public key, an expiry, a random nonce and a signature
//! over the target endpoint, method, expiry, nonce and body. The receiver
//! derives the caller's [`Principal`] from the verified public key, so a
//! principal can only be claimed by whoever holds its key. Calls without any
//! of the headers are anonymous.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, VerifyingKey};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{Identity, Principal, wire::Method};

/// Hex-encoded ed25519 public key of the sender.
pub const SENDER_HEADER: &str = "x-agora-sender";

/// Unix time in seconds after which the call must be refused.
pub const EXPIRY_HEADER: &str = "x-agora-expiry";

/// Hex-encoded random bytes; no two calls share a signature.
pub const NONCE_HEADER: &str = "x-agora-nonce";

/// Hex-encoded ed25519 signature.
pub const SIGNATURE_HEADER: &str = "x-agora-signature";

/// How long a freshly signed call stays valid.
pub const CALL_TTL_SECS: i64 = 300;

/// Tolerated clock drift between signer and verifier.
const MAX_SKEW_SECS: i64 = 60;

const NONCE_BYTES: usize = 16;

const DOMAIN: &[u8] = b"agora-call-v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
  #[error("signed call is missing the {0} header")]
  Incomplete(&'static str),

  #[error("malformed {0}")]
  Malformed(&'static str),

  #[error("signed call has expired")]
  Expired,

  #[error("signed call expires too far in the future")]
  TooFarAhead,

  #[error("signature does not match the call")]
  Mismatch,
}

/// The authentication headers of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
  pub sender:    String,
  pub expiry:    i64,
  pub nonce:     String,
  pub signature: String,
}

impl CallSignature {
  /// Sign a call to `method` on `endpoint` carrying `body`. Returns `None`
  /// for the anonymous identity, whose calls go unsigned.
  pub fn sign(
    identity: &Identity,
    endpoint: &str,
    method: Method,
    body: &[u8],
  ) -> Option<Self> {
    Self::sign_at(identity, endpoint, method, body, Utc::now())
  }

  pub fn sign_at(
    identity: &Identity,
    endpoint: &str,
    method: Method,
    body: &[u8],
    now: DateTime<Utc>,
  ) -> Option<Self> {
    let public = identity.public_key()?;
    let mut nonce = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    let nonce = hex::encode(nonce);
    let expiry = now.timestamp() + CALL_TTL_SECS;

    let digest = call_digest(endpoint, method, expiry, &nonce, body);
    let signature = identity.sign(&digest)?;
    Some(Self {
      sender: hex::encode(public.as_bytes()),
      expiry,
      nonce,
      signature: hex::encode(signature.to_bytes()),
    })
  }

  /// `(header, value)` pairs to attach to the request.
  pub fn headers(&self) -> [(&'static str, String); 4] {
    [
      (SENDER_HEADER, self.sender.clone()),
      (EXPIRY_HEADER, self.expiry.to_string()),
      (NONCE_HEADER, self.nonce.clone()),
      (SIGNATURE_HEADER, self.signature.clone()),
    ]
  }

  /// Read the headers back through `get`. `Ok(None)` when none are present.
  pub fn from_headers<'h>(
    get: impl Fn(&'static str) -> Option<&'h str>,
  ) -> Result<Option<Self>, SignatureError> {
    let names = [SENDER_HEADER, EXPIRY_HEADER, NONCE_HEADER, SIGNATURE_HEADER];
    let values = names.map(|name| get(name));
    if values.iter().all(Option::is_none) {
      return Ok(None);
    }
    let [sender, expiry, nonce, signature] = values;
    let require = |value: Option<&'h str>, name| {
      value.map(str::to_string).ok_or(SignatureError::Incomplete(name))
    };
    let expiry = require(expiry, EXPIRY_HEADER)?
      .parse()
      .map_err(|_| SignatureError::Malformed("expiry"))?;
    Ok(Some(Self {
      sender: require(sender, SENDER_HEADER)?,
      expiry,
      nonce: require(nonce, NONCE_HEADER)?,
      signature: require(signature, SIGNATURE_HEADER)?,
    }))
  }

  /// Check the signature against the call it arrived with and return the
  /// principal that signed it.
  pub fn verify(
    &self,
    endpoint: &str,
    method: Method,
    body: &[u8],
  ) -> Result<Principal, SignatureError> {
    self.verify_at(endpoint, method, body, Utc::now())
  }

  pub fn verify_at(
    &self,
    endpoint: &str,
    method: Method,
    body: &[u8],
    now: DateTime<Utc>,
  ) -> Result<Principal, SignatureError> {
    let now = now.timestamp();
    if self.expiry < now {
      return Err(SignatureError::Expired);
    }
    if self.expiry - now > CALL_TTL_SECS + MAX_SKEW_SECS {
      return Err(SignatureError::TooFarAhead);
    }

    let sender: [u8; 32] = decode_hex(&self.sender, "sender")?;
    let sender = VerifyingKey::from_bytes(&sender)
      .map_err(|_| SignatureError::Malformed("sender"))?;
    let signature: [u8; 64] = decode_hex(&self.signature, "signature")?;
    let signature = Signature::from_bytes(&signature);

    let digest = call_digest(endpoint, method, self.expiry, &self.nonce, body);
    sender
      .verify_strict(&digest, &signature)
      .map_err(|_| SignatureError::Mismatch)?;
    Ok(Principal::from_public_key(&sender))
  }
}

fn decode_hex<const N: usize>(
  value: &str,
  what: &'static str,
) -> Result<[u8; N], SignatureError> {
  hex::decode(value)
    .ok()
    .and_then(|bytes| bytes.try_into().ok())
    .ok_or(SignatureError::Malformed(what))
}

/// Length-prefixed fields, then the body hash.
fn call_digest(
  endpoint: &str,
  method: Method,
  expiry: i64,
  nonce: &str,
  body: &[u8],
) -> [u8; 32] {
  let expiry = expiry.to_be_bytes();
  let mut hasher = Sha256::new();
  hasher.update(DOMAIN);
  for field in [endpoint.as_bytes(), method.name().as_bytes(), &expiry[..], nonce.as_bytes()] {
    hasher.update((field.len() as u64).to_be_bytes());
    hasher.update(field);
  }
  hasher.update(Sha256::digest(body));
  hasher.finalize().into()
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  const ENDPOINT: &str = "rrkah-fqaaa-aaaaa-aaaaq-cai";

  fn signed(identity: &Identity, body: &[u8]) -> CallSignature {
    CallSignature::sign(identity, ENDPOINT, Method::CreatePost, body).unwrap()
  }

  #[test]
  fn verified_signature_names_the_signer() {
    let alice = Identity::generate();
    let sig = signed(&alice, b"[1]");
    let principal = sig.verify(ENDPOINT, Method::CreatePost, b"[1]").unwrap();
    assert_eq!(&principal, alice.principal());
  }

  #[test]
  fn anonymous_identity_does_not_sign() {
    let sig = CallSignature::sign(&Identity::anonymous(), ENDPOINT, Method::GetPost, b"[]");
    assert!(sig.is_none());
  }

  #[test]
  fn any_change_to_the_call_breaks_the_signature() {
    let sig = signed(&Identity::generate(), b"[1]");
    assert_eq!(
      sig.verify(ENDPOINT, Method::CreatePost, b"[2]"),
      Err(SignatureError::Mismatch)
    );
    assert_eq!(
      sig.verify(ENDPOINT, Method::DeletePost, b"[1]"),
      Err(SignatureError::Mismatch)
    );
    assert_eq!(
      sig.verify("ryjl3-tyaaa-aaaaa-aaaba-cai", Method::CreatePost, b"[1]"),
      Err(SignatureError::Mismatch)
    );

    let mut later = sig.clone();
    later.expiry += 10;
    assert_eq!(
      later.verify(ENDPOINT, Method::CreatePost, b"[1]"),
      Err(SignatureError::Mismatch)
    );
  }

  #[test]
  fn swapped_sender_is_rejected() {
    let alice = Identity::generate();
    let mallory = Identity::generate();
    let mut sig = signed(&mallory, b"[]");
    sig.sender = hex::encode(alice.public_key().unwrap().as_bytes());
    assert_eq!(
      sig.verify(ENDPOINT, Method::CreatePost, b"[]"),
      Err(SignatureError::Mismatch)
    );
  }

  #[test]
  fn expiry_window_is_enforced() {
    let now = Utc::now();
    let id = Identity::generate();
    let sig = CallSignature::sign_at(&id, ENDPOINT, Method::LikePost, b"[]", now).unwrap();

    let late = now + chrono::Duration::seconds(CALL_TTL_SECS + 1);
    assert_eq!(
      sig.verify_at(ENDPOINT, Method::LikePost, b"[]", late),
      Err(SignatureError::Expired)
    );

    let early = now - chrono::Duration::seconds(MAX_SKEW_SECS + 1);
    assert_eq!(
      sig.verify_at(ENDPOINT, Method::LikePost, b"[]", early),
      Err(SignatureError::TooFarAhead)
    );
  }

  #[test]
  fn headers_round_trip() {
    let sig = signed(&Identity::generate(), b"[]");
    let map: HashMap<&str, String> = sig.headers().into_iter().collect();
    let back = CallSignature::from_headers(|name| map.get(name).map(String::as_str))
      .unwrap()
      .unwrap();
    assert_eq!(back, sig);

    assert_eq!(CallSignature::from_headers(|_| None), Ok(None));
    assert_eq!(
      CallSignature::from_headers(|name| (name == SENDER_HEADER).then_some("ab")),
      Err(SignatureError::Incomplete(EXPIRY_HEADER))
    );
  }
}
