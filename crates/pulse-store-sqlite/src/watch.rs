//! Delivery of commits made through other connections to the same file.
//!
//! SQLite bumps `PRAGMA data_version` whenever another connection (in this
//! process or any other) commits. A background task polls it on the store's
//! own connection and, when it moves, re-reads every watched document and
//! hands the result to the [`Hub`], which delivers only what changed.

use std::time::Duration;

use rusqlite::Connection;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
  encode::{RawTally, RawUserVote, read_tally, read_user_vote},
  hub::{Hub, split_user_vote_key},
};

/// How often the data version is polled when nobody sets an interval.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(200);

/// Owns the polling task; aborts it on drop.
pub(crate) struct Watcher {
  task: JoinHandle<()>,
}

impl Drop for Watcher {
  fn drop(&mut self) { self.task.abort(); }
}

impl Watcher {
  pub fn spawn(conn: tokio_rusqlite::Connection, hub: Hub, interval: Duration) -> Self {
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut seen: Option<i64> = None;

      loop {
        ticker.tick().await;
        if hub.is_idle() {
          continue;
        }

        let hub = hub.clone();
        let result = conn
          .call(move |conn| {
            let version = data_version(conn)?;
            if seen != Some(version) {
              refresh(conn, &hub)?;
            }
            Ok(version)
          })
          .await;

        match result {
          Ok(version) => seen = Some(version),
          Err(e) => tracing::warn!(error = %e, "could not check for external commits"),
        }
      }
    });
    Self { task }
  }
}

fn data_version(conn: &Connection) -> rusqlite::Result<i64> {
  conn.query_row("PRAGMA data_version", [], |row| row.get(0))
}

/// Re-read every watched document and offer it to the hub.
fn refresh(conn: &Connection, hub: &Hub) -> rusqlite::Result<()> {
  for statement_id in hub.watched_tallies() {
    match read_tally(conn, &statement_id)?.map(RawTally::into_tally).transpose() {
      Ok(tally) => hub.refresh_tally(&statement_id, tally),
      Err(e) => tracing::warn!(statement = %statement_id, error = %e, "skipping undecodable tally"),
    }
  }

  for key in hub.watched_user_votes() {
    let Some((voter_id, statement_id)) = split_user_vote_key(&key) else {
      continue;
    };
    match read_user_vote(conn, voter_id, statement_id)?
      .map(RawUserVote::into_record)
      .transpose()
    {
      Ok(record) => hub.refresh_user_vote(&key, record),
      Err(e) => tracing::warn!(%key, error = %e, "skipping undecodable voter record"),
    }
  }
  Ok(())
}
