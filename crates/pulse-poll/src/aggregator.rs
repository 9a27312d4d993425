//! [`VoteAggregator`]: the vote-casting protocol over any [`VoteStore`].

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, PoisonError},
};

use pulse_core::{
  store::VoteStore,
  subscription::Subscription,
  vote::{
    AggregateTally, Choice, RecordedVote, StatementId, TallyCounts, TallyDelta, UserVoteRecord,
    VoterId,
  },
};

use crate::error::{Error, Result};

/// What a successful [`VoteAggregator::cast_vote`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteReceipt {
  pub previous: Option<Choice>,
  pub record:   UserVoteRecord,
  pub tally:    AggregateTally,
}

impl VoteReceipt {
  pub fn choice(&self) -> Choice { self.record.choice }
}

type InFlightSet = Arc<Mutex<HashSet<(VoterId, StatementId)>>>;

/// Marks one voter's cast as running; released on drop.
struct InFlight {
  set: InFlightSet,
  key: (VoterId, StatementId),
}

impl InFlight {
  fn begin(set: &InFlightSet, voter: &VoterId, statement: &StatementId) -> Option<Self> {
    let key = (voter.clone(), statement.clone());
    let inserted = set
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key.clone());
    inserted.then(|| Self { set: Arc::clone(set), key })
  }
}

impl Drop for InFlight {
  fn drop(&mut self) {
    self
      .set
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.key);
  }
}

/// Casts votes and serves tallies for any statement.
///
/// Holds an injected store handle; cloning shares it, along with the set of
/// voters whose cast is still running.
pub struct VoteAggregator<S> {
  store:     Arc<S>,
  in_flight: InFlightSet,
}

impl<S> Clone for VoteAggregator<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      in_flight: Arc::clone(&self.in_flight),
    }
  }
}

impl<S: VoteStore> VoteAggregator<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store, in_flight: InFlightSet::default() } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// The voter's current choice, if they have voted.
  pub async fn get_user_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
  ) -> Result<Option<Choice>, S::Error> {
    let record = self
      .store
      .get_user_vote(voter, statement)
      .await
      .map_err(Error::Store)?;
    Ok(record.map(|r| r.choice))
  }

  /// Live view of the voter's own record.
  pub async fn subscribe_user_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
  ) -> Result<Subscription<Option<UserVoteRecord>>, S::Error> {
    self
      .store
      .subscribe_user_vote(voter, statement)
      .await
      .map_err(Error::Store)
  }

  /// Return the aggregate, reconstructing it from the voter records if it
  /// does not exist. Creation is create-if-absent, so racing voters and
  /// readers agree on a single document.
  pub async fn ensure_tally(
    &self,
    statement: &StatementId,
    statement_text: &str,
  ) -> Result<AggregateTally, S::Error> {
    if let Some(tally) = self.store.get_tally(statement).await.map_err(Error::Store)? {
      return Ok(tally);
    }

    let records = self
      .store
      .list_user_votes(statement)
      .await
      .map_err(Error::Store)?;
    let counts = TallyCounts::from_choices(records.iter().map(|r| r.choice));

    let tally = self
      .store
      .seed_tally(statement, statement_text, counts)
      .await
      .map_err(Error::Store)?;
    tracing::info!(
      %statement,
      records = records.len(),
      support = tally.counts.support,
      against = tally.counts.against,
      "tally initialised from voter records"
    );
    Ok(tally)
  }

  /// Live view of the aggregate. The first value is the current state.
  pub async fn subscribe_tally(
    &self,
    statement: &StatementId,
    statement_text: &str,
  ) -> Result<Subscription<Option<AggregateTally>>, S::Error> {
    self.ensure_tally(statement, statement_text).await?;
    self.store.subscribe_tally(statement).await.map_err(Error::Store)
  }

  /// Record `choice` for `voter` and move the aggregate accordingly.
  ///
  /// The store swaps the voter's record atomically and reports the choice it
  /// replaced, which decides the delta. A second cast for the same voter and
  /// statement while one is running fails with [`Error::VoteInFlight`].
  ///
  /// The voter's record is kept even if the tally update then fails; that
  /// failure is reported as [`Error::Tally`] carrying the choice to roll
  /// back to. Reconciliation repairs the resulting drift.
  pub async fn cast_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
    choice: Choice,
    statement_text: &str,
  ) -> Result<VoteReceipt, S::Error> {
    let Some(_in_flight) = InFlight::begin(&self.in_flight, voter, statement) else {
      tracing::debug!(%statement, %voter, %choice, "vote rejected; another is still running");
      return Err(Error::VoteInFlight);
    };

    // Seeding from a scan must happen before our own record exists, or the
    // delta below would count it twice.
    if let Err(e) = self.ensure_tally(statement, statement_text).await {
      tracing::warn!(%statement, error = %e, "could not initialise tally before voting");
    }

    let RecordedVote { previous, record } = self
      .store
      .put_user_vote(voter, statement, choice)
      .await
      .map_err(Error::Store)?;

    let delta = TallyDelta::for_vote(previous, choice);
    let tally = match self.store.apply_tally_delta(statement, statement_text, delta).await {
      Ok(tally) => tally,
      Err(source) => {
        tracing::warn!(
          %statement,
          %voter,
          ?previous,
          %choice,
          error = %source,
          "tally update failed; voter record kept"
        );
        return Err(Error::Tally { previous, source });
      }
    };

    tracing::debug!(%statement, %voter, ?previous, %choice, "vote cast");
    Ok(VoteReceipt { previous, record, tally })
  }
}
