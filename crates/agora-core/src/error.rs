//! Error types for `agora-core`.
//!
//! The `Display` strings double as the rejection reasons sent to clients, so
//! they are written for humans.

use thiserror::Error;

use crate::validate::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("Anonymous users cannot {0}")]
  Anonymous(&'static str),

  #[error("User already exists")]
  UserExists,

  #[error("Username already taken")]
  UsernameTaken,

  #[error("User not found")]
  UserNotFound,

  #[error("Post not found")]
  PostNotFound,

  #[error("You can only {0} your own posts")]
  NotAuthor(&'static str),

  #[error("You cannot follow yourself")]
  SelfFollow,

  #[error("invalid principal: {0:?}")]
  InvalidPrincipal(String),

  #[error(transparent)]
  Invalid(#[from] ValidationError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
