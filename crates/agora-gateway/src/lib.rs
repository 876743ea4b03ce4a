//! Client-side access to the three Agora services.
//!
//! A [`Gateway`] binds one transport to one identity and exposes one typed
//! operation per remote method. It bootstraps lazily on first use, performs
//! the trust-root handshake in development mode, and rebinds its per-service
//! handles whenever the active identity changes.
//!
//! Replies are normalized into [`GatewayResult`]: business refusals become
//! [`GatewayError::Business`], while transport faults stay
//! [`GatewayError::Transport`] and are never re-encoded as refusals.
//!
//! ```rust,ignore
//! let config = GatewayConfig::load(None)?;
//! let gateway = Gateway::new(HttpConnector::new(&config), config);
//! let posts = gateway.get_recent_posts(Page::default()).await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod transport;
pub mod views;

mod normalize;

pub use config::{GatewayConfig, Mode};
pub use error::{AuthError, GatewayError, GatewayResult, SessionError, TransportError};
pub use gateway::{Gateway, State};
pub use transport::{Agent, Call, Connector, HttpConnector};

#[cfg(test)]
mod tests;
