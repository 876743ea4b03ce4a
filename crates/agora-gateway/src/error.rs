//! Error types for `agora-gateway`.

use thiserror::Error;

/// A fault at the call layer: the reply never arrived, or arrived in a shape
/// the protocol does not allow.
#[derive(Debug, Error)]
pub enum TransportError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The remote end answered with a non-success status.
  #[error("remote rejected the call ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("malformed reply: {0}")]
  Malformed(String),
}

impl TransportError {
  /// Whether repeating the same call may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      TransportError::Http(e) => !e.is_builder() && !e.is_decode(),
      TransportError::Rejected { status, .. } => *status >= 500,
      TransportError::Malformed(_) => false,
    }
  }
}

/// The outcome of a failed Gateway operation.
#[derive(Debug, Error)]
pub enum GatewayError {
  /// Bootstrap failed; the Gateway stays uninitialized until the next call
  /// retries it.
  #[error("initialization failed: {0}")]
  Initialization(String),

  /// The remote service refused the request for a domain reason.
  #[error("{0}")]
  Business(String),

  #[error("transport failure: {0}")]
  Transport(#[from] TransportError),
}

impl GatewayError {
  pub fn is_business(&self) -> bool { matches!(self, GatewayError::Business(_)) }

  /// Whether the caller may retry the operation unchanged.
  pub fn is_retryable(&self) -> bool {
    match self {
      GatewayError::Initialization(_) => true,
      GatewayError::Business(_) => false,
      GatewayError::Transport(e) => e.is_retryable(),
    }
  }

  /// A short message a UI can show as-is.
  pub fn user_message(&self) -> String {
    match self {
      GatewayError::Initialization(_) => {
        "Could not connect to the network. Please try again.".to_string()
      }
      GatewayError::Business(reason) => reason.clone(),
      GatewayError::Transport(_) => {
        "Something went wrong. Please try again.".to_string()
      }
    }
  }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure of the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("corrupt key file: {0}")]
  Corrupt(String),
}

/// Failure of a session transition (login, logout, restore).
#[derive(Debug, Error)]
pub enum SessionError {
  #[error(transparent)]
  Auth(#[from] AuthError),

  #[error(transparent)]
  Gateway(#[from] GatewayError),
}
