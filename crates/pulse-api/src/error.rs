//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use pulse_core::vote::Choice;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  /// The same voter already has a vote being applied.
  #[error("conflict: {0}")]
  Conflict(String),

  /// No vote store is configured; series endpoints keep working.
  #[error("voting is not configured")]
  NotConfigured,

  /// The voter's choice was stored but the tally was not updated. The
  /// client should keep showing `previous`.
  #[error("vote failed: {message}")]
  VoteFailed {
    previous: Option<Choice>,
    message:  String,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::NotConfigured => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
      ApiError::VoteFailed { previous, message } => {
        let body = json!({ "error": message, "choice": previous });
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
      }
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<pulse_core::Error> for ApiError {
  fn from(e: pulse_core::Error) -> Self { ApiError::BadRequest(e.to_string()) }
}

impl<E> From<pulse_poll::Error<E>> for ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(e: pulse_poll::Error<E>) -> Self {
    match e {
      pulse_poll::Error::Store(e) => ApiError::Store(Box::new(e)),
      pulse_poll::Error::Tally { previous, source } => {
        ApiError::VoteFailed { previous, message: source.to_string() }
      }
      e @ pulse_poll::Error::VoteInFlight => ApiError::Conflict(e.to_string()),
    }
  }
}
