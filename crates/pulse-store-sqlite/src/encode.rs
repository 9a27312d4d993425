//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and choices as their lowercase
//! wire form.

use chrono::{DateTime, Utc};
use pulse_core::vote::{AggregateTally, Choice, StatementId, TallyCounts, UserVoteRecord, VoterId};
use rusqlite::{Connection, OptionalExtension as _, Row};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── votes rows ──────────────────────────────────────────────────────────────

pub const TALLY_COLUMNS: &str =
  "statement_id, support, against, statement, version, created_at, updated_at";

/// A `votes` row as read from SQLite, before decoding.
#[derive(Debug)]
pub struct RawTally {
  pub statement_id: String,
  pub support:      i64,
  pub against:      i64,
  pub statement:    String,
  pub version:      i64,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawTally {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      statement_id: row.get(0)?,
      support:      row.get(1)?,
      against:      row.get(2)?,
      statement:    row.get(3)?,
      version:      row.get(4)?,
      created_at:   row.get(5)?,
      updated_at:   row.get(6)?,
    })
  }

  pub fn counts(&self) -> TallyCounts { TallyCounts::new(self.support, self.against) }

  pub fn into_tally(self) -> Result<AggregateTally> {
    Ok(AggregateTally {
      statement_id: StatementId::new(self.statement_id)?,
      counts:       TallyCounts::new(self.support, self.against),
      statement:    self.statement,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub fn read_tally(conn: &Connection, statement_id: &str) -> rusqlite::Result<Option<RawTally>> {
  conn
    .query_row(
      &format!("SELECT {TALLY_COLUMNS} FROM votes WHERE statement_id = ?1"),
      rusqlite::params![statement_id],
      RawTally::from_row,
    )
    .optional()
}

// ─── user_votes rows ─────────────────────────────────────────────────────────

pub const USER_VOTE_COLUMNS: &str = "voter_id, statement_id, vote, created_at, updated_at";

/// A `user_votes` row as read from SQLite, before decoding.
#[derive(Debug)]
pub struct RawUserVote {
  pub voter_id:     String,
  pub statement_id: String,
  pub vote:         String,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawUserVote {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      voter_id:     row.get(0)?,
      statement_id: row.get(1)?,
      vote:         row.get(2)?,
      created_at:   row.get(3)?,
      updated_at:   row.get(4)?,
    })
  }

  pub fn into_record(self) -> Result<UserVoteRecord> {
    Ok(UserVoteRecord {
      voter_id:     VoterId::new(self.voter_id)?,
      statement_id: StatementId::new(self.statement_id)?,
      choice:       Choice::parse(&self.vote)?,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}

pub fn read_user_vote(
  conn:         &Connection,
  voter_id:     &str,
  statement_id: &str,
) -> rusqlite::Result<Option<RawUserVote>> {
  conn
    .query_row(
      &format!(
        "SELECT {USER_VOTE_COLUMNS} FROM user_votes WHERE voter_id = ?1 AND statement_id = ?2"
      ),
      rusqlite::params![voter_id, statement_id],
      RawUserVote::from_row,
    )
    .optional()
}
