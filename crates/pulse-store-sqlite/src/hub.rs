//! Listener registry for live subscriptions.
//!
//! Publishing happens on the connection thread immediately after a commit,
//! and registration happens on the same thread together with the read of the
//! initial state, so a listener never misses or duplicates a change.
//!
//! Each watched document remembers the last state it delivered. Commits made
//! through other connections are picked up by the [`crate::watch`] task,
//! which re-reads watched documents and calls the `refresh_*` methods; those
//! only deliver states that differ from the last one.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use pulse_core::{
  subscription::Subscription,
  vote::{AggregateTally, UserVoteRecord},
};
use tokio::sync::mpsc;

struct Slot<T> {
  last:      T,
  listeners: Vec<(u64, mpsc::UnboundedSender<T>)>,
}

struct Topic<T> {
  next_id: u64,
  slots:   HashMap<String, Slot<T>>,
}

impl<T> Default for Topic<T> {
  fn default() -> Self { Self { next_id: 0, slots: HashMap::new() } }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn subscribe<T>(topic: &Arc<Mutex<Topic<T>>>, key: String, initial: T) -> Subscription<T>
where
  T: Clone + Send + 'static,
{
  let (tx, rx) = mpsc::unbounded_channel();
  // The receiver is still held here, so the initial send cannot fail.
  let _ = tx.send(initial.clone());

  let id = {
    let mut topic = lock(topic);
    let id = topic.next_id;
    topic.next_id += 1;
    let slot = topic
      .slots
      .entry(key.clone())
      .or_insert_with(|| Slot { last: initial.clone(), listeners: Vec::new() });
    slot.last = initial;
    slot.listeners.push((id, tx));
    id
  };

  let topic = Arc::clone(topic);
  Subscription::new(rx, move || {
    let mut topic = lock(&topic);
    if let Some(slot) = topic.slots.get_mut(&key) {
      slot.listeners.retain(|(other, _)| *other != id);
      if slot.listeners.is_empty() {
        topic.slots.remove(&key);
      }
    }
  })
}

fn publish<T>(topic: &Mutex<Topic<T>>, key: &str, value: T, only_if_changed: bool)
where
  T: Clone + PartialEq,
{
  let mut topic = lock(topic);
  let Some(slot) = topic.slots.get_mut(key) else {
    return;
  };
  if only_if_changed && slot.last == value {
    return;
  }
  slot.listeners.retain(|(_, tx)| tx.send(value.clone()).is_ok());
  slot.last = value;
}

fn keys<T>(topic: &Mutex<Topic<T>>) -> Vec<String> { lock(topic).slots.keys().cloned().collect() }

#[cfg(test)]
fn listener_count<T>(topic: &Mutex<Topic<T>>, key: &str) -> usize {
  lock(topic).slots.get(key).map_or(0, |slot| slot.listeners.len())
}

/// Registry key of a voter's record. Identifiers cannot contain `/`, so the
/// key is unambiguous.
pub(crate) fn user_vote_key(voter_id: &str, statement_id: &str) -> String {
  format!("{statement_id}/{voter_id}")
}

/// Inverse of [`user_vote_key`]: `(voter_id, statement_id)`.
pub(crate) fn split_user_vote_key(key: &str) -> Option<(&str, &str)> {
  key.split_once('/').map(|(statement, voter)| (voter, statement))
}

// ─── Hub ─────────────────────────────────────────────────────────────────────

/// Per-document listener lists for both collections.
#[derive(Clone, Default)]
pub(crate) struct Hub {
  tallies:    Arc<Mutex<Topic<Option<AggregateTally>>>>,
  user_votes: Arc<Mutex<Topic<Option<UserVoteRecord>>>>,
}

impl Hub {
  pub fn subscribe_tally(
    &self,
    statement_id: String,
    initial: Option<AggregateTally>,
  ) -> Subscription<Option<AggregateTally>> {
    subscribe(&self.tallies, statement_id, initial)
  }

  pub fn publish_tally(&self, statement_id: &str, tally: &AggregateTally) {
    publish(&self.tallies, statement_id, Some(tally.clone()), false);
  }

  pub fn refresh_tally(&self, statement_id: &str, tally: Option<AggregateTally>) {
    publish(&self.tallies, statement_id, tally, true);
  }

  pub fn subscribe_user_vote(
    &self,
    key: String,
    initial: Option<UserVoteRecord>,
  ) -> Subscription<Option<UserVoteRecord>> {
    subscribe(&self.user_votes, key, initial)
  }

  pub fn publish_user_vote(&self, key: &str, record: &UserVoteRecord) {
    publish(&self.user_votes, key, Some(record.clone()), false);
  }

  pub fn refresh_user_vote(&self, key: &str, record: Option<UserVoteRecord>) {
    publish(&self.user_votes, key, record, true);
  }

  /// Statement ids with at least one tally listener.
  pub fn watched_tallies(&self) -> Vec<String> { keys(&self.tallies) }

  /// Registry keys of voter records with at least one listener.
  pub fn watched_user_votes(&self) -> Vec<String> { keys(&self.user_votes) }

  pub fn is_idle(&self) -> bool {
    lock(&self.tallies).slots.is_empty() && lock(&self.user_votes).slots.is_empty()
  }

  #[cfg(test)]
  pub fn tally_listeners(&self, statement_id: &str) -> usize {
    listener_count(&self.tallies, statement_id)
  }

  #[cfg(test)]
  pub fn user_vote_listeners(&self, key: &str) -> usize {
    listener_count(&self.user_votes, key)
  }
}
