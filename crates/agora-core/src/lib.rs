//! Core types and trait definitions for the Agora social network.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Every other crate depends on it: the SQLite backend implements its service
//! traits, the API exposes them, and the gateway consumes the same records
//! over the wire.

pub mod error;
pub mod graph;
pub mod post;
pub mod principal;
pub mod profile;
pub mod service;
pub mod signature;
pub mod validate;
pub mod wire;

pub use error::{Error, Result};
pub use principal::{Identity, Principal};
