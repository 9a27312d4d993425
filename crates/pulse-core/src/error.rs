//! Error types for `pulse-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("voter id must not be empty")]
  EmptyVoterId,

  #[error("statement id must not be empty")]
  EmptyStatementId,

  #[error("identifier {0:?} contains a '/'")]
  InvalidIdentifier(String),

  #[error("unknown vote choice: {0:?}")]
  UnknownChoice(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
