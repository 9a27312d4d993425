//! Handlers for the statement poll.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/voters` | Mint a voter id for the client to persist |
//! | `GET`  | `/votes/{statement}` | Current tally; rebuilt from voter records if missing |
//! | `POST` | `/votes/{statement}` | Body: `{"voter_id":"...","choice":"support"}` |
//! | `GET`  | `/votes/{statement}/stream` | Server-sent tally snapshots |
//! | `GET`  | `/votes/{statement}/voters/{voter}` | The voter's own choice |
//!
//! All but `/voters` answer `503` when voting is not configured. A cast
//! answers `409` while the same voter's previous cast is still running.

use std::convert::Infallible;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::{
    IntoResponse,
    sse::{Event, KeepAlive, Sse},
  },
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt as _};
use pulse_core::{
  store::VoteStore,
  vote::{AggregateTally, Choice, StatementId, VoterId},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppState, error::ApiError};

// ─── Bodies ──────────────────────────────────────────────────────────────────

/// Tally as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct TallyBody {
  pub statement_id:    StatementId,
  pub statement:       String,
  pub support:         i64,
  pub against:         i64,
  pub total:           i64,
  pub support_percent: i64,
  pub against_percent: i64,
  pub updated_at:      DateTime<Utc>,
}

impl From<&AggregateTally> for TallyBody {
  fn from(t: &AggregateTally) -> Self {
    Self {
      statement_id:    t.statement_id.clone(),
      statement:       t.statement.clone(),
      support:         t.counts.support,
      against:         t.counts.against,
      total:           t.counts.total(),
      support_percent: t.counts.support_percent(),
      against_percent: t.counts.against_percent(),
      updated_at:      t.updated_at,
    }
  }
}

// ─── Voters ──────────────────────────────────────────────────────────────────

/// `POST /voters`
pub async fn new_voter() -> impl IntoResponse {
  let voter = VoterId::generate();
  tracing::debug!(%voter, "voter id minted");
  (StatusCode::CREATED, Json(json!({ "voter_id": voter })))
}

// ─── Tally ───────────────────────────────────────────────────────────────────

/// `GET /votes/{statement}`
pub async fn tally<S: VoteStore>(
  State(state): State<AppState<S>>,
  Path(statement): Path<String>,
) -> Result<Json<TallyBody>, ApiError> {
  let poll = state.poll()?;
  let statement = StatementId::new(statement)?;
  let tally = poll
    .aggregator
    .ensure_tally(&statement, &poll.statement_text)
    .await?;
  Ok(Json(TallyBody::from(&tally)))
}

/// `GET /votes/{statement}/stream`
///
/// The first event carries the current tally; one event follows per
/// committed change. The subscription is released when the client goes
/// away.
pub async fn stream<S: VoteStore + 'static>(
  State(state): State<AppState<S>>,
  Path(statement): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
  let poll = state.poll()?;
  let statement = StatementId::new(statement)?;
  let subscription = poll
    .aggregator
    .subscribe_tally(&statement, &poll.statement_text)
    .await?;

  let events = subscription.filter_map(|tally| async move {
    let tally = tally?;
    match Event::default().event("tally").json_data(TallyBody::from(&tally)) {
      Ok(event) => Some(Ok(event)),
      Err(e) => {
        tracing::warn!(error = %e, "could not encode tally event");
        None
      }
    }
  });

  Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ─── Own vote ────────────────────────────────────────────────────────────────

/// `GET /votes/{statement}/voters/{voter}`
pub async fn user_vote<S: VoteStore>(
  State(state): State<AppState<S>>,
  Path((statement, voter)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
  let poll = state.poll()?;
  let statement = StatementId::new(statement)?;
  let voter = VoterId::new(voter)?;
  let choice = poll.aggregator.get_user_vote(&voter, &statement).await?;
  Ok(Json(json!({ "choice": choice })))
}

// ─── Cast ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CastBody {
  pub voter_id:       VoterId,
  pub choice:         Choice,
  pub statement_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CastResponse {
  pub choice:   Choice,
  pub previous: Option<Choice>,
  pub tally:    TallyBody,
}

/// `POST /votes/{statement}`
pub async fn cast<S: VoteStore>(
  State(state): State<AppState<S>>,
  Path(statement): Path<String>,
  Json(body): Json<CastBody>,
) -> Result<Json<CastResponse>, ApiError> {
  let poll = state.poll()?;
  let statement = StatementId::new(statement)?;
  let text = body.statement_text.as_deref().unwrap_or(&poll.statement_text);

  let receipt = poll
    .aggregator
    .cast_vote(&body.voter_id, &statement, body.choice, text)
    .await?;

  Ok(Json(CastResponse {
    choice:   receipt.choice(),
    previous: receipt.previous,
    tally:    TallyBody::from(&receipt.tally),
  }))
}
