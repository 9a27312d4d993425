//! Drift repair: recompute a tally from the voter records.
//!
//! Safe to run while voting continues. The result reflects the scan, not
//! votes that commit between the scan and the overwrite; running it again
//! converges.

use pulse_core::{
  store::VoteStore,
  vote::{AggregateTally, StatementId, TallyCounts},
};

use crate::error::{Error, Result};

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
  /// Stored counts before the overwrite, if a tally existed.
  pub before:          Option<TallyCounts>,
  pub after:           AggregateTally,
  pub records_scanned: usize,
}

impl Reconciliation {
  pub fn changed(&self) -> bool { self.before != Some(self.after.counts) }
}

/// Outcome of [`check`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
  pub stored:  Option<AggregateTally>,
  pub actual:  TallyCounts,
  pub records: usize,
}

impl DriftReport {
  pub fn in_sync(&self) -> bool {
    self.stored.as_ref().is_some_and(|t| t.counts == self.actual)
  }
}

async fn scan<S: VoteStore>(
  store: &S,
  statement: &StatementId,
) -> Result<(TallyCounts, usize), S::Error> {
  let records = store.list_user_votes(statement).await.map_err(Error::Store)?;
  let counts = TallyCounts::from_choices(records.iter().map(|r| r.choice));
  Ok((counts, records.len()))
}

/// Overwrite the stored tally for `statement` with counts recomputed from a
/// full scan of its voter records.
pub async fn reconcile<S: VoteStore>(
  store: &S,
  statement: &StatementId,
  statement_text: &str,
) -> Result<Reconciliation, S::Error> {
  let before = store
    .get_tally(statement)
    .await
    .map_err(Error::Store)?
    .map(|t| t.counts);
  let (actual, records_scanned) = scan(store, statement).await?;

  let after = store
    .overwrite_tally(statement, statement_text, actual)
    .await
    .map_err(Error::Store)?;

  tracing::info!(
    %statement,
    records = records_scanned,
    before = ?before,
    support = after.counts.support,
    against = after.counts.against,
    "tally reconciled"
  );
  Ok(Reconciliation { before, after, records_scanned })
}

/// Compare the stored tally with a fresh scan without writing anything.
pub async fn check<S: VoteStore>(
  store: &S,
  statement: &StatementId,
) -> Result<DriftReport, S::Error> {
  let stored = store.get_tally(statement).await.map_err(Error::Store)?;
  let (actual, records) = scan(store, statement).await?;
  Ok(DriftReport { stored, actual, records })
}
