//! Optimistic per-voter vote state.
//!
//! A [`VoteSession`] shows the voter's new choice as soon as they act and
//! settles once the store answers: each action moves
//! `Idle → Pending → Committed | RolledBack`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use pulse_core::{
  store::VoteStore,
  vote::{Choice, StatementId, VoterId},
};

use crate::{
  aggregator::{VoteAggregator, VoteReceipt},
  error::{Error, Result},
};

/// State of the most recent vote action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteAction {
  Idle,
  Pending { previous: Option<Choice>, choice: Choice },
  Committed { choice: Choice },
  RolledBack { previous: Option<Choice>, attempted: Choice },
}

#[derive(Debug)]
struct State {
  /// Last choice known to be stored.
  confirmed: Option<Choice>,
  action:    VoteAction,
}

/// One voter's view of one statement.
pub struct VoteSession<S> {
  aggregator:     VoteAggregator<S>,
  voter:          VoterId,
  statement:      StatementId,
  statement_text: String,
  state:          Mutex<State>,
}

impl<S: VoteStore> VoteSession<S> {
  pub fn new(
    aggregator: VoteAggregator<S>,
    voter: VoterId,
    statement: StatementId,
    statement_text: impl Into<String>,
  ) -> Self {
    Self {
      aggregator,
      voter,
      statement,
      statement_text: statement_text.into(),
      state: Mutex::new(State { confirmed: None, action: VoteAction::Idle }),
    }
  }

  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Load the stored choice.
  pub async fn refresh(&self) -> Result<Option<Choice>, S::Error> {
    let stored = self.aggregator.get_user_vote(&self.voter, &self.statement).await?;
    self.observe(stored);
    Ok(self.current_choice())
  }

  /// Feed a value from a live read of the voter's record. Ignored while an
  /// action is pending; the action's outcome decides then.
  pub fn observe(&self, stored: Option<Choice>) {
    let mut state = self.lock();
    if !matches!(state.action, VoteAction::Pending { .. }) {
      state.confirmed = stored;
    }
  }

  /// The choice to display: the pending one while in flight, otherwise the
  /// last confirmed one.
  pub fn current_choice(&self) -> Option<Choice> {
    let state = self.lock();
    match state.action {
      VoteAction::Pending { choice, .. } => Some(choice),
      _ => state.confirmed,
    }
  }

  pub fn action(&self) -> VoteAction { self.lock().action }

  /// Cast `choice`. Fails fast with [`Error::VoteInFlight`] if the previous
  /// action has not settled. On failure the displayed choice reverts.
  pub async fn vote(&self, choice: Choice) -> Result<VoteReceipt, S::Error> {
    let previous = {
      let mut state = self.lock();
      if matches!(state.action, VoteAction::Pending { .. }) {
        return Err(Error::VoteInFlight);
      }
      let previous = state.confirmed;
      state.action = VoteAction::Pending { previous, choice };
      previous
    };

    let outcome = self
      .aggregator
      .cast_vote(&self.voter, &self.statement, choice, &self.statement_text)
      .await;

    let mut state = self.lock();
    match &outcome {
      Ok(_) => {
        state.confirmed = Some(choice);
        state.action = VoteAction::Committed { choice };
      }
      Err(_) => {
        state.confirmed = previous;
        state.action = VoteAction::RolledBack { previous, attempted: choice };
      }
    }
    outcome
  }
}
