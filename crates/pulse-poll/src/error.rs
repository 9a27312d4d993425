//! Error type for `pulse-poll`, generic over the store's error.

use pulse_core::vote::Choice;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error<E>
where
  E: std::error::Error + 'static,
{
  #[error("store error: {0}")]
  Store(#[source] E),

  /// The voter's record was written but the aggregate was not updated.
  /// `previous` is the choice the caller should fall back to.
  #[error("vote recorded but the tally update failed: {source}")]
  Tally {
    previous: Option<Choice>,
    #[source]
    source:   E,
  },

  /// A cast for the same voter and statement has not settled yet.
  #[error("a previous vote is still being applied")]
  VoteInFlight,
}

pub type Result<T, E> = std::result::Result<T, Error<E>>;
