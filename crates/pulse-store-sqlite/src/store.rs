//! [`SqliteStore`], the SQLite implementation of [`VoteStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use pulse_core::{
  store::VoteStore,
  subscription::Subscription,
  vote::{
    AggregateTally, Choice, RecordedVote, StatementId, TallyCounts, TallyDelta, UserVoteRecord,
    VoterId,
  },
};
use rusqlite::{ErrorCode, TransactionBehavior};

use crate::{
  Error, Result,
  encode::{RawTally, RawUserVote, USER_VOTE_COLUMNS, encode_dt, read_tally, read_user_vote},
  hub::{Hub, user_vote_key},
  schema::SCHEMA,
  watch::{DEFAULT_WATCH_INTERVAL, Watcher},
};

/// How many times the optimistic tally update is attempted before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A poll store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection and listener registry are
/// reference-counted. A file-backed store also watches for commits made
/// through other connections (another process, or another `SqliteStore` on
/// the same path) and delivers them to its subscribers.
#[derive(Clone)]
pub struct SqliteStore {
  conn:                    tokio_rusqlite::Connection,
  pub(crate) hub:          Hub,
  pub(crate) max_attempts: u32,
  _watcher:                Option<Arc<Watcher>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self::init(conn).await?;
    Ok(store.with_watch_interval(DEFAULT_WATCH_INTERVAL))
  }

  /// Open an in-memory store, for tests. No other connection can reach it,
  /// so nothing is watched.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  /// Bound the optimistic retries of [`VoteStore::apply_tally_delta`].
  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts.max(1);
    self
  }

  /// Poll for commits from other connections every `interval`. Spawns a
  /// task, so it must be called inside a tokio runtime.
  pub fn with_watch_interval(mut self, interval: Duration) -> Self {
    let interval = interval.max(Duration::from_millis(1));
    self._watcher = Some(Arc::new(Watcher::spawn(self.conn.clone(), self.hub.clone(), interval)));
    self
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      hub: Hub::default(),
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      _watcher: None,
    })
  }
}

fn decode_recorded(previous: Option<RawUserVote>, stored: RawUserVote) -> Result<RecordedVote> {
  let previous = previous.map(|raw| Choice::parse(&raw.vote)).transpose()?;
  Ok(RecordedVote { previous, record: stored.into_record()? })
}

// ─── Optimistic tally update ─────────────────────────────────────────────────

enum DeltaOutcome {
  Applied(Result<AggregateTally>),
  Contended,
}

fn is_busy(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}

/// One compare-and-set attempt. Returns `Ok(None)` when the row changed
/// between the read and the write; the transaction is then rolled back.
fn try_apply_delta(
  conn:           &mut rusqlite::Connection,
  statement_id:   &str,
  statement_text: &str,
  delta:          TallyDelta,
) -> rusqlite::Result<Option<RawTally>> {
  let tx      = conn.transaction()?;
  let current = read_tally(&tx, statement_id)?;
  let now     = encode_dt(Utc::now());

  let written = match &current {
    None => {
      let counts = TallyCounts::default().apply(delta);
      tx.execute(
        "INSERT INTO votes (statement_id, support, against, statement, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
         ON CONFLICT(statement_id) DO NOTHING",
        rusqlite::params![statement_id, counts.support, counts.against, statement_text, now],
      )?
    }
    Some(raw) => {
      let counts = raw.counts().apply(delta);
      tx.execute(
        "UPDATE votes
         SET support = ?1, against = ?2, version = version + 1, updated_at = ?3
         WHERE statement_id = ?4 AND version = ?5",
        rusqlite::params![counts.support, counts.against, now, statement_id, raw.version],
      )?
    }
  };

  if written == 0 {
    return Ok(None);
  }

  let stored = read_tally(&tx, statement_id)?;
  tx.commit()?;
  Ok(stored)
}

// ─── VoteStore impl ──────────────────────────────────────────────────────────

impl VoteStore for SqliteStore {
  type Error = Error;

  // ── userVotes ─────────────────────────────────────────────────────────────

  async fn get_user_vote(
    &self,
    voter:     &VoterId,
    statement: &StatementId,
  ) -> Result<Option<UserVoteRecord>> {
    let voter_id     = voter.as_str().to_owned();
    let statement_id = statement.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| Ok(read_user_vote(conn, &voter_id, &statement_id)?))
      .await?;

    raw.map(RawUserVote::into_record).transpose()
  }

  async fn put_user_vote(
    &self,
    voter:     &VoterId,
    statement: &StatementId,
    choice:    Choice,
  ) -> Result<RecordedVote> {
    let voter_id     = voter.as_str().to_owned();
    let statement_id = statement.as_str().to_owned();
    let vote         = choice.as_ref().to_owned();
    let now          = encode_dt(Utc::now());
    let hub          = self.hub.clone();

    self
      .conn
      .call(move |conn| {
        // Take the write lock up front so the read below cannot go stale.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let previous = read_user_vote(&tx, &voter_id, &statement_id)?;
        tx.execute(
          "INSERT INTO user_votes (voter_id, statement_id, vote, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT(voter_id, statement_id) DO UPDATE SET
             vote       = excluded.vote,
             updated_at = excluded.updated_at",
          rusqlite::params![voter_id, statement_id, vote, now],
        )?;
        let stored = read_user_vote(&tx, &voter_id, &statement_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;

        let recorded = decode_recorded(previous, stored);
        if let Ok(recorded) = &recorded {
          hub.publish_user_vote(&user_vote_key(&voter_id, &statement_id), &recorded.record);
        }
        Ok(recorded)
      })
      .await?
  }

  async fn list_user_votes(&self, statement: &StatementId) -> Result<Vec<UserVoteRecord>> {
    let statement_id = statement.as_str().to_owned();

    let raws: Vec<RawUserVote> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {USER_VOTE_COLUMNS} FROM user_votes WHERE statement_id = ?1 ORDER BY voter_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![statement_id], RawUserVote::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawUserVote::into_record).collect()
  }

  // ── votes ─────────────────────────────────────────────────────────────────

  async fn get_tally(&self, statement: &StatementId) -> Result<Option<AggregateTally>> {
    let statement_id = statement.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| Ok(read_tally(conn, &statement_id)?))
      .await?;

    raw.map(RawTally::into_tally).transpose()
  }

  async fn seed_tally(
    &self,
    statement:      &StatementId,
    statement_text: &str,
    counts:         TallyCounts,
  ) -> Result<AggregateTally> {
    let statement_id = statement.as_str().to_owned();
    let text         = statement_text.to_owned();
    let now          = encode_dt(Utc::now());
    let hub          = self.hub.clone();

    self
      .conn
      .call(move |conn| {
        let created = conn.execute(
          "INSERT INTO votes (statement_id, support, against, statement, version, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
           ON CONFLICT(statement_id) DO NOTHING",
          rusqlite::params![statement_id, counts.support, counts.against, text, now],
        )?;

        let tally = read_tally(conn, &statement_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?
          .into_tally();
        if created == 1
          && let Ok(tally) = &tally
        {
          hub.publish_tally(&statement_id, tally);
        }
        Ok(tally)
      })
      .await?
  }

  async fn apply_tally_delta(
    &self,
    statement:      &StatementId,
    statement_text: &str,
    delta:          TallyDelta,
  ) -> Result<AggregateTally> {
    let statement_id = statement.as_str().to_owned();
    let text         = statement_text.to_owned();
    let max_attempts = self.max_attempts;
    let hub          = self.hub.clone();

    let id = statement_id.clone();
    let outcome = self
      .conn
      .call(move |conn| {
        for attempt in 1..=max_attempts {
          match try_apply_delta(conn, &id, &text, delta) {
            Ok(Some(raw)) => {
              let tally = raw.into_tally();
              if let Ok(tally) = &tally {
                hub.publish_tally(&id, tally);
              }
              tracing::debug!(statement = %id, attempt, ?delta, "tally updated");
              return Ok(DeltaOutcome::Applied(tally));
            }
            Ok(None) => {
              tracing::debug!(statement = %id, attempt, "tally version moved, retrying");
            }
            Err(e) if is_busy(&e) => {
              tracing::debug!(statement = %id, attempt, "tally locked by another writer, retrying");
            }
            Err(e) => return Err(e.into()),
          }
        }
        Ok(DeltaOutcome::Contended)
      })
      .await?;

    match outcome {
      DeltaOutcome::Applied(tally) => tally,
      DeltaOutcome::Contended => {
        tracing::warn!(statement = %statement_id, max_attempts, "tally update gave up");
        Err(Error::Contention { statement_id, attempts: max_attempts })
      }
    }
  }

  async fn overwrite_tally(
    &self,
    statement:      &StatementId,
    statement_text: &str,
    counts:         TallyCounts,
  ) -> Result<AggregateTally> {
    let statement_id = statement.as_str().to_owned();
    let text         = statement_text.to_owned();
    let now          = encode_dt(Utc::now());
    let hub          = self.hub.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO votes (statement_id, support, against, statement, version, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)
           ON CONFLICT(statement_id) DO UPDATE SET
             support    = excluded.support,
             against    = excluded.against,
             statement  = excluded.statement,
             version    = votes.version + 1,
             updated_at = excluded.updated_at",
          rusqlite::params![statement_id, counts.support, counts.against, text, now],
        )?;

        let tally = read_tally(conn, &statement_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?
          .into_tally();
        if let Ok(tally) = &tally {
          hub.publish_tally(&statement_id, tally);
        }
        Ok(tally)
      })
      .await?
  }

  // ── Live reads ────────────────────────────────────────────────────────────

  async fn subscribe_tally(
    &self,
    statement: &StatementId,
  ) -> Result<Subscription<Option<AggregateTally>>> {
    let statement_id = statement.as_str().to_owned();
    let hub          = self.hub.clone();

    self
      .conn
      .call(move |conn| {
        let current = read_tally(conn, &statement_id)?
          .map(RawTally::into_tally)
          .transpose();
        Ok(current.map(|initial| hub.subscribe_tally(statement_id, initial)))
      })
      .await?
  }

  async fn subscribe_user_vote(
    &self,
    voter:     &VoterId,
    statement: &StatementId,
  ) -> Result<Subscription<Option<UserVoteRecord>>> {
    let voter_id     = voter.as_str().to_owned();
    let statement_id = statement.as_str().to_owned();
    let hub          = self.hub.clone();

    self
      .conn
      .call(move |conn| {
        let current = read_user_vote(conn, &voter_id, &statement_id)?
          .map(RawUserVote::into_record)
          .transpose();
        let key = user_vote_key(&voter_id, &statement_id);
        Ok(current.map(|initial| hub.subscribe_user_vote(key, initial)))
      })
      .await?
  }
}
