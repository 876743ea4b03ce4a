//! Principals and identities.
//!
//! A [`Principal`] is the opaque, globally unique name of an authenticated
//! party. An [`Identity`] is the ed25519 key that proves it; the principal is
//! derived from the public half of the key, never chosen.

use std::{fmt, str::FromStr};

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// Textual form of the anonymous principal.
const ANONYMOUS: &str = "anonymous";

/// Number of digest bytes kept when deriving a principal from a key.
const PRINCIPAL_BYTES: usize = 16;

// ─── Principal ───────────────────────────────────────────────────────────────

/// An opaque identifier for an authenticated identity.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
  /// The principal attributed to calls made without an identity.
  pub fn anonymous() -> Self { Self(ANONYMOUS.to_string()) }

  /// Derive the principal owned by the holder of `key`.
  pub fn from_public_key(key: &VerifyingKey) -> Self {
    let digest = Sha256::digest(key.as_bytes());
    Self(hex::encode(&digest[..PRINCIPAL_BYTES]))
  }

  pub fn is_anonymous(&self) -> bool { self.0 == ANONYMOUS }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Principal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Principal {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let valid = s == ANONYMOUS
      || (s.len() == PRINCIPAL_BYTES * 2
        && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    if valid {
      Ok(Self(s.to_string()))
    } else {
      Err(Error::InvalidPrincipal(s.to_string()))
    }
  }
}

impl TryFrom<String> for Principal {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Principal> for String {
  fn from(value: Principal) -> Self { value.0 }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// Key material for a principal. At most one identity is active per session.
///
/// The key is an ed25519 secret seed. Two identities are equal when they
/// carry the same seed (and therefore the same principal).
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
  principal: Principal,
  key:       Option<[u8; 32]>,
}

impl Identity {
  /// The identity used before login and after logout.
  pub fn anonymous() -> Self {
    Self {
      principal: Principal::anonymous(),
      key:       None,
    }
  }

  /// Generate a fresh identity from the operating system's RNG.
  pub fn generate() -> Self {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    Self::from_key(key)
  }

  pub fn from_key(key: [u8; 32]) -> Self {
    let public = SigningKey::from_bytes(&key).verifying_key();
    Self {
      principal: Principal::from_public_key(&public),
      key:       Some(key),
    }
  }

  pub fn principal(&self) -> &Principal { &self.principal }

  /// The secret seed, as stored in key files.
  pub fn key(&self) -> Option<&[u8; 32]> { self.key.as_ref() }

  pub fn public_key(&self) -> Option<VerifyingKey> {
    self.key.map(|k| SigningKey::from_bytes(&k).verifying_key())
  }

  /// Sign `message`. The anonymous identity cannot sign.
  pub fn sign(&self, message: &[u8]) -> Option<Signature> {
    self.key.map(|k| SigningKey::from_bytes(&k).sign(message))
  }

  pub fn is_anonymous(&self) -> bool { self.key.is_none() }
}

impl Default for Identity {
  fn default() -> Self { Self::anonymous() }
}

impl fmt::Debug for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Identity")
      .field("principal", &self.principal)
      .field("key", &self.key.map(|_| "<redacted>"))
      .finish()
  }
}
