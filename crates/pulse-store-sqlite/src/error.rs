//! Error type for `pulse-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] pulse_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The optimistic tally transaction kept losing to concurrent writers.
  #[error("tally for {statement_id:?} still contended after {attempts} attempts")]
  Contention { statement_id: String, attempts: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
