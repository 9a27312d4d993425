//! Poll types: voters, statements, per-voter records and aggregate tallies.
//!
//! Two kinds of document exist per statement. A [`UserVoteRecord`] holds one
//! voter's current choice and is only ever written by that voter. An
//! [`AggregateTally`] holds the shared counters and is only mutated through
//! a [`TallyDelta`] applied atomically by the store, or overwritten by
//! reconciliation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Choice ──────────────────────────────────────────────────────────────────

/// One of the two poll options.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Choice {
  Support,
  Against,
}

impl Choice {
  /// Parse the stored/wire form (`"support"` or `"against"`).
  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownChoice(s.to_owned()))
  }
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

fn validate_id(raw: String, empty: Error) -> Result<String> {
  if raw.trim().is_empty() {
    return Err(empty);
  }
  if raw.contains('/') {
    return Err(Error::InvalidIdentifier(raw));
  }
  Ok(raw)
}

/// An opaque, client-persisted pseudonymous token for one browser profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterId(String);

impl VoterId {
  pub fn new(raw: impl Into<String>) -> Result<Self> {
    validate_id(raw.into(), Error::EmptyVoterId).map(Self)
  }

  /// Mint a fresh identity of the form `user_<unix-millis>_<9 chars>`.
  pub fn generate() -> Self {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    Self(format!("user_{millis}_{}", &suffix[..9]))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for VoterId {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::new(raw) }
}

impl From<VoterId> for String {
  fn from(id: VoterId) -> Self { id.0 }
}

impl fmt::Display for VoterId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Identifies the statement being voted on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatementId(String);

impl StatementId {
  pub fn new(raw: impl Into<String>) -> Result<Self> {
    validate_id(raw.into(), Error::EmptyStatementId).map(Self)
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for StatementId {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::new(raw) }
}

impl From<StatementId> for String {
  fn from(id: StatementId) -> Self { id.0 }
}

impl fmt::Display for StatementId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Display id of a voter's record: `{voter}_{statement}`. Both parts may
/// contain `_`, so stores key records on the pair instead.
pub fn user_vote_document_id(voter: &VoterId, statement: &StatementId) -> String {
  format!("{voter}_{statement}")
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// A voter's current choice for one statement. Overwritten on every change;
/// `created_at` is kept from the first write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVoteRecord {
  #[serde(rename = "userId")]
  pub voter_id:     VoterId,
  #[serde(rename = "statementId")]
  pub statement_id: StatementId,
  #[serde(rename = "vote")]
  pub choice:       Choice,
  #[serde(rename = "createdAt")]
  pub created_at:   DateTime<Utc>,
  #[serde(rename = "updatedAt")]
  pub updated_at:   DateTime<Utc>,
}

impl UserVoteRecord {
  pub fn document_id(&self) -> String {
    user_vote_document_id(&self.voter_id, &self.statement_id)
  }
}

/// A voter's record as just written, with the choice it replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedVote {
  pub previous: Option<Choice>,
  pub record:   UserVoteRecord,
}

/// The shared counters for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateTally {
  #[serde(rename = "statementId")]
  pub statement_id: StatementId,
  #[serde(flatten)]
  pub counts:       TallyCounts,
  pub statement:    String,
  #[serde(rename = "createdAt")]
  pub created_at:   DateTime<Utc>,
  #[serde(rename = "updatedAt")]
  pub updated_at:   DateTime<Utc>,
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// A pair of counters. Signed: a tally that drifted through failed
/// transactions may go below zero until reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyCounts {
  pub support: i64,
  pub against: i64,
}

impl TallyCounts {
  pub fn new(support: i64, against: i64) -> Self { Self { support, against } }

  /// Count the choices of a full scan of user records.
  pub fn from_choices(choices: impl IntoIterator<Item = Choice>) -> Self {
    choices.into_iter().fold(Self::default(), |mut acc, choice| {
      *acc.get_mut(choice) += 1;
      acc
    })
  }

  pub fn get(&self, choice: Choice) -> i64 {
    match choice {
      Choice::Support => self.support,
      Choice::Against => self.against,
    }
  }

  fn get_mut(&mut self, choice: Choice) -> &mut i64 {
    match choice {
      Choice::Support => &mut self.support,
      Choice::Against => &mut self.against,
    }
  }

  pub fn total(&self) -> i64 { self.support + self.against }

  /// Rounded share of support; 0 when nobody has voted.
  pub fn support_percent(&self) -> i64 {
    let total = self.total();
    if total <= 0 {
      return 0;
    }
    (self.support as f64 * 100.0 / total as f64).round() as i64
  }

  pub fn against_percent(&self) -> i64 {
    if self.total() <= 0 { 0 } else { 100 - self.support_percent() }
  }

  pub fn apply(self, delta: TallyDelta) -> Self {
    Self {
      support: self.support + delta.support,
      against: self.against + delta.against,
    }
  }
}

/// The counter change produced by one vote action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyDelta {
  pub support: i64,
  pub against: i64,
}

impl TallyDelta {
  /// The delta for a voter moving from `previous` to `next`:
  ///
  /// - first vote: `+1` on `next`;
  /// - switch: `-1` on `previous`, `+1` on `next`;
  /// - same choice again: no change.
  pub fn for_vote(previous: Option<Choice>, next: Choice) -> Self {
    let mut counts = TallyCounts::default();
    match previous {
      Some(prev) if prev == next => {}
      Some(prev) => {
        *counts.get_mut(prev) -= 1;
        *counts.get_mut(next) += 1;
      }
      None => *counts.get_mut(next) += 1,
    }
    Self { support: counts.support, against: counts.against }
  }

  pub fn is_noop(&self) -> bool { self.support == 0 && self.against == 0 }
}
