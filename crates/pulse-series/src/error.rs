//! Error type for `pulse-series`.
//!
//! Only whole-source failures surface here; row-level problems are counted in
//! [`crate::IngestStats`] instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("dataset is missing required column {0:?}")]
  MissingColumn(&'static str),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("fetching {url} returned status {status}")]
  Status { url: String, status: u16 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
