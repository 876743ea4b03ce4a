//! SQLite backend for the three Agora services.
//!
//! A single [`SqliteStore`] implements the User Directory, the Post Store and
//! the Social Graph. It wraps [`tokio_rusqlite`] so all database access runs
//! on a dedicated thread without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
