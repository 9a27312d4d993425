//! SQLite backend for the poll's document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Live subscriptions are fed from the
//! same thread, right after each commit, so listeners observe changes in
//! commit order. Commits made through other connections to the same file are
//! picked up by polling `PRAGMA data_version`.

mod encode;
mod hub;
mod schema;
mod store;
mod watch;

pub mod error;

pub use error::{Error, Result};
pub use store::{DEFAULT_MAX_ATTEMPTS, SqliteStore};
pub use watch::DEFAULT_WATCH_INTERVAL;
