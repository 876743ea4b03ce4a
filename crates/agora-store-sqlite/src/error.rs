//! Error type for `agora-store-sqlite`.

use agora_core::service::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain refusal; travels back to the caller as a business error.
  #[error(transparent)]
  Core(#[from] agora_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value no longer decodes into its domain type.
  #[error("corrupt row: {0}")]
  Corrupt(String),
}

impl ServiceError for Error {
  fn rejection(&self) -> Option<&agora_core::Error> {
    match self {
      Error::Core(e) => Some(e),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
