//! JSON HTTP API for the overdose-trends dashboard.
//!
//! Exposes an axum [`Router`] over a loaded [`SeriesIndex`] and, when a vote
//! store is configured, a [`VoteAggregator`] backed by any
//! [`pulse_core::store::VoteStore`]. Without a store the vote endpoints
//! answer `503` and the series endpoints are unaffected.

pub mod error;
pub mod series;
pub mod votes;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use pulse_core::store::VoteStore;
use pulse_poll::VoteAggregator;
use pulse_series::SeriesIndex;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Voting configuration: the aggregator plus the statement text used when a
/// tally has to be created.
pub struct PollState<S> {
  pub aggregator:     VoteAggregator<S>,
  pub statement_text: String,
}

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub series: Arc<SeriesIndex>,
  pub poll:   Option<Arc<PollState<S>>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { series: Arc::clone(&self.series), poll: self.poll.clone() }
  }
}

impl<S> AppState<S> {
  pub fn new(series: SeriesIndex, poll: Option<PollState<S>>) -> Self {
    Self { series: Arc::new(series), poll: poll.map(Arc::new) }
  }

  /// The poll, or [`ApiError::NotConfigured`] in degraded mode.
  pub fn poll(&self) -> Result<&PollState<S>, ApiError> {
    self.poll.as_deref().ok_or(ApiError::NotConfigured)
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: VoteStore + 'static,
{
  Router::new()
    // Series
    .route("/catalog", get(series::catalog::<S>))
    .route("/series", get(series::series::<S>))
    // Votes
    .route("/voters", post(votes::new_voter))
    .route("/votes/{statement}", get(votes::tally::<S>).post(votes::cast::<S>))
    .route("/votes/{statement}/stream", get(votes::stream::<S>))
    .route("/votes/{statement}/voters/{voter}", get(votes::user_vote::<S>))
    .with_state(state)
}
