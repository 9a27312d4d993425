//! Vote protocol tests against the in-memory SQLite store.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use pulse_core::{
  store::VoteStore,
  subscription::Subscription,
  vote::{
    AggregateTally, Choice, RecordedVote, StatementId, TallyCounts, TallyDelta, UserVoteRecord,
    VoterId,
  },
};
use pulse_store_sqlite::SqliteStore;

use crate::{Error, VoteAction, VoteAggregator, VoteSession, check, reconcile};

const TEXT: &str = "We should expand harm-reduction programs.";

fn voter(name: &str) -> VoterId { VoterId::new(name).unwrap() }

fn statement() -> StatementId { StatementId::new("political-statement-v1").unwrap() }

async fn sqlite() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.unwrap())
}

async fn tally_of<S: VoteStore>(store: &S) -> TallyCounts {
  store.get_tally(&statement()).await.unwrap().unwrap().counts
}

async fn next(sub: &mut Subscription<Option<AggregateTally>>) -> TallyCounts {
  tokio::time::timeout(Duration::from_secs(5), sub.recv())
    .await
    .unwrap()
    .unwrap()
    .unwrap()
    .counts
}

// ─── Test double ─────────────────────────────────────────────────────────────

/// Delegates to SQLite, but can fail or hold the tally transaction.
struct FlakyStore {
  inner:      SqliteStore,
  fail_tally: AtomicBool,
  gate:       tokio::sync::Mutex<()>,
}

impl FlakyStore {
  async fn new() -> Self {
    Self {
      inner:      SqliteStore::open_in_memory().await.unwrap(),
      fail_tally: AtomicBool::new(false),
      gate:       tokio::sync::Mutex::new(()),
    }
  }
}

impl VoteStore for FlakyStore {
  type Error = pulse_store_sqlite::Error;

  async fn get_user_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
  ) -> Result<Option<UserVoteRecord>, Self::Error> {
    self.inner.get_user_vote(voter, statement).await
  }

  async fn put_user_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
    choice: Choice,
  ) -> Result<RecordedVote, Self::Error> {
    self.inner.put_user_vote(voter, statement, choice).await
  }

  async fn list_user_votes(
    &self,
    statement: &StatementId,
  ) -> Result<Vec<UserVoteRecord>, Self::Error> {
    self.inner.list_user_votes(statement).await
  }

  async fn get_tally(&self, statement: &StatementId) -> Result<Option<AggregateTally>, Self::Error> {
    self.inner.get_tally(statement).await
  }

  async fn seed_tally(
    &self,
    statement: &StatementId,
    statement_text: &str,
    counts: TallyCounts,
  ) -> Result<AggregateTally, Self::Error> {
    self.inner.seed_tally(statement, statement_text, counts).await
  }

  async fn apply_tally_delta(
    &self,
    statement: &StatementId,
    statement_text: &str,
    delta: TallyDelta,
  ) -> Result<AggregateTally, Self::Error> {
    let _held = self.gate.lock().await;
    if self.fail_tally.load(Ordering::SeqCst) {
      return Err(pulse_store_sqlite::Error::Contention {
        statement_id: statement.to_string(),
        attempts:     5,
      });
    }
    self.inner.apply_tally_delta(statement, statement_text, delta).await
  }

  async fn overwrite_tally(
    &self,
    statement: &StatementId,
    statement_text: &str,
    counts: TallyCounts,
  ) -> Result<AggregateTally, Self::Error> {
    self.inner.overwrite_tally(statement, statement_text, counts).await
  }

  async fn subscribe_tally(
    &self,
    statement: &StatementId,
  ) -> Result<Subscription<Option<AggregateTally>>, Self::Error> {
    self.inner.subscribe_tally(statement).await
  }

  async fn subscribe_user_vote(
    &self,
    voter: &VoterId,
    statement: &StatementId,
  ) -> Result<Subscription<Option<UserVoteRecord>>, Self::Error> {
    self.inner.subscribe_user_vote(voter, statement).await
  }
}

// ─── castVote ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn revoting_the_same_way_does_not_double_count() {
  let store = sqlite().await;
  let agg = VoteAggregator::new(Arc::clone(&store));
  let a = voter("a");

  agg.cast_vote(&a, &statement(), Choice::Support, TEXT).await.unwrap();
  let again = agg.cast_vote(&a, &statement(), Choice::Support, TEXT).await.unwrap();

  assert_eq!(again.previous, Some(Choice::Support));
  assert_eq!(again.tally.counts, TallyCounts::new(1, 0));
  assert_eq!(tally_of(store.as_ref()).await, TallyCounts::new(1, 0));
}

#[tokio::test]
async fn switching_moves_one_vote_across() {
  let store = sqlite().await;
  let agg = VoteAggregator::new(Arc::clone(&store));
  let (a, b) = (voter("a"), voter("b"));

  agg.cast_vote(&b, &statement(), Choice::Support, TEXT).await.unwrap();
  let before = tally_of(store.as_ref()).await;

  agg.cast_vote(&a, &statement(), Choice::Support, TEXT).await.unwrap();
  let switched = agg.cast_vote(&a, &statement(), Choice::Against, TEXT).await.unwrap();

  assert_eq!(switched.previous, Some(Choice::Support));
  assert_eq!(switched.choice(), Choice::Against);
  assert_eq!(switched.tally.counts.support, before.support);
  assert_eq!(switched.tally.counts.against, before.against + 1);
  assert_eq!(
    agg.get_user_vote(&a, &statement()).await.unwrap(),
    Some(Choice::Against)
  );
}

#[tokio::test]
async fn concurrent_opposite_votes_are_both_counted() {
  let store = sqlite().await;
  let agg = VoteAggregator::new(Arc::clone(&store));
  let (a, b, s) = (voter("a"), voter("b"), statement());

  let (left, right) = tokio::join!(
    agg.cast_vote(&a, &s, Choice::Support, TEXT),
    agg.cast_vote(&b, &s, Choice::Against, TEXT),
  );
  left.unwrap();
  right.unwrap();

  assert_eq!(tally_of(store.as_ref()).await, TallyCounts::new(1, 1));
}

#[tokio::test]
async fn concurrent_casts_for_one_voter_count_once() {
  let store = sqlite().await;
  // Separate aggregators share nothing but the store, like two server
  // processes on one database.
  let left = VoteAggregator::new(Arc::clone(&store));
  let right = VoteAggregator::new(Arc::clone(&store));
  let (a, s) = (voter("a"), statement());

  let (first, second) = tokio::join!(
    left.cast_vote(&a, &s, Choice::Support, TEXT),
    right.cast_vote(&a, &s, Choice::Support, TEXT),
  );
  first.unwrap();
  second.unwrap();
  assert_eq!(tally_of(store.as_ref()).await, TallyCounts::new(1, 0));
  assert_eq!(store.list_user_votes(&s).await.unwrap().len(), 1);

  let (first, second) = tokio::join!(
    left.cast_vote(&a, &s, Choice::Against, TEXT),
    right.cast_vote(&a, &s, Choice::Support, TEXT),
  );
  first.unwrap();
  second.unwrap();
  let report = check(store.as_ref(), &s).await.unwrap();
  assert!(report.in_sync(), "{report:?}");
  assert_eq!(report.actual.total(), 1);
}

#[tokio::test]
async fn second_cast_for_one_voter_is_rejected_while_running() {
  let store = Arc::new(FlakyStore::new().await);
  let agg = VoteAggregator::new(Arc::clone(&store));
  let (a, s) = (voter("a"), statement());

  let held = store.gate.lock().await;
  let first = tokio::spawn({
    let (agg, a, s) = (agg.clone(), a.clone(), s.clone());
    async move { agg.cast_vote(&a, &s, Choice::Support, TEXT).await }
  });
  // The record is written just before the held tally update.
  while agg.get_user_vote(&a, &s).await.unwrap().is_none() {
    tokio::task::yield_now().await;
  }

  assert!(matches!(
    agg.cast_vote(&a, &s, Choice::Against, TEXT).await,
    Err(Error::VoteInFlight)
  ));
  assert!(matches!(
    agg.clone().cast_vote(&a, &s, Choice::Support, TEXT).await,
    Err(Error::VoteInFlight)
  ));

  drop(held);
  first.await.unwrap().unwrap();
  assert_eq!(tally_of(store.as_ref()).await, TallyCounts::new(1, 0));

  let switched = agg.cast_vote(&a, &s, Choice::Against, TEXT).await.unwrap();
  assert_eq!(switched.tally.counts, TallyCounts::new(0, 1));
}

#[tokio::test]
async fn missing_tally_is_rebuilt_from_voter_records() {
  let store = sqlite().await;
  let s = statement();
  store.put_user_vote(&voter("a"), &s, Choice::Support).await.unwrap();
  store.put_user_vote(&voter("b"), &s, Choice::Against).await.unwrap();
  assert!(store.get_tally(&s).await.unwrap().is_none());

  let agg = VoteAggregator::new(Arc::clone(&store));
  let receipt = agg.cast_vote(&voter("c"), &s, Choice::Support, TEXT).await.unwrap();
  assert_eq!(receipt.tally.counts, TallyCounts::new(2, 1));
  assert_eq!(receipt.tally.statement, TEXT);

  let switched = agg.cast_vote(&voter("a"), &s, Choice::Against, TEXT).await.unwrap();
  assert_eq!(switched.tally.counts, TallyCounts::new(1, 2));
}

#[tokio::test]
async fn subscribe_tally_initialises_and_streams() {
  let store = sqlite().await;
  let agg = VoteAggregator::new(Arc::clone(&store));
  let s = statement();

  let mut sub = agg.subscribe_tally(&s, TEXT).await.unwrap();
  let initial = sub.recv().await.unwrap().unwrap();
  assert_eq!(initial.counts, TallyCounts::default());

  agg.cast_vote(&voter("a"), &s, Choice::Against, TEXT).await.unwrap();
  let next = sub.recv().await.unwrap().unwrap();
  assert_eq!(next.counts, TallyCounts::new(0, 1));
}

#[tokio::test]
async fn tally_failure_keeps_record_and_reports_previous() {
  let store = Arc::new(FlakyStore::new().await);
  let agg = VoteAggregator::new(Arc::clone(&store));
  let (a, s) = (voter("a"), statement());

  agg.cast_vote(&a, &s, Choice::Support, TEXT).await.unwrap();
  store.fail_tally.store(true, Ordering::SeqCst);

  let err = agg.cast_vote(&a, &s, Choice::Against, TEXT).await.unwrap_err();
  assert!(matches!(err, Error::Tally { previous: Some(Choice::Support), .. }));

  // The voter's record is not rolled back; the tally lags behind it.
  assert_eq!(agg.get_user_vote(&a, &s).await.unwrap(), Some(Choice::Against));
  assert_eq!(tally_of(store.as_ref()).await, TallyCounts::new(1, 0));

  let report = check(store.as_ref(), &s).await.unwrap();
  assert!(!report.in_sync());
  assert_eq!(report.actual, TallyCounts::new(0, 1));
}

#[tokio::test]
async fn tally_changes_from_another_connection_are_streamed() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("poll.db");
  let server = SqliteStore::open(&path)
    .await
    .unwrap()
    .with_watch_interval(Duration::from_millis(20));
  let agg = VoteAggregator::new(Arc::new(server));
  let s = statement();

  agg.cast_vote(&voter("a"), &s, Choice::Support, TEXT).await.unwrap();
  let mut sub = agg.subscribe_tally(&s, TEXT).await.unwrap();
  assert_eq!(sub.recv().await.unwrap().unwrap().counts, TallyCounts::new(1, 0));

  // A maintenance run opens its own connection to the same file.
  let maintenance = SqliteStore::open(&path).await.unwrap();
  maintenance.overwrite_tally(&s, TEXT, TallyCounts::new(99, 0)).await.unwrap();
  assert_eq!(next(&mut sub).await, TallyCounts::new(99, 0));

  reconcile(&maintenance, &s, TEXT).await.unwrap();
  assert_eq!(next(&mut sub).await, TallyCounts::new(1, 0));
}

// ─── VoteSession ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_commits_on_success() {
  let store = sqlite().await;
  let session = VoteSession::new(VoteAggregator::new(store), voter("a"), statement(), TEXT);
  assert_eq!(session.refresh().await.unwrap(), None);
  assert_eq!(session.action(), VoteAction::Idle);

  session.vote(Choice::Support).await.unwrap();
  assert_eq!(session.current_choice(), Some(Choice::Support));
  assert_eq!(session.action(), VoteAction::Committed { choice: Choice::Support });
}

#[tokio::test]
async fn session_rolls_back_on_tally_failure() {
  let store = Arc::new(FlakyStore::new().await);
  let session = VoteSession::new(
    VoteAggregator::new(Arc::clone(&store)),
    voter("a"),
    statement(),
    TEXT,
  );
  session.vote(Choice::Support).await.unwrap();

  store.fail_tally.store(true, Ordering::SeqCst);
  assert!(session.vote(Choice::Against).await.is_err());
  assert_eq!(session.current_choice(), Some(Choice::Support));
  assert_eq!(
    session.action(),
    VoteAction::RolledBack { previous: Some(Choice::Support), attempted: Choice::Against }
  );

  // Retrying after the store recovers goes through.
  store.fail_tally.store(false, Ordering::SeqCst);
  session.vote(Choice::Against).await.unwrap();
  assert_eq!(session.current_choice(), Some(Choice::Against));
}

#[tokio::test]
async fn session_rejects_a_second_vote_while_pending() {
  let store = Arc::new(FlakyStore::new().await);
  let session = Arc::new(VoteSession::new(
    VoteAggregator::new(Arc::clone(&store)),
    voter("a"),
    statement(),
    TEXT,
  ));

  let held = store.gate.lock().await;
  let first = tokio::spawn({
    let session = Arc::clone(&session);
    async move { session.vote(Choice::Support).await }
  });
  while !matches!(session.action(), VoteAction::Pending { .. }) {
    tokio::task::yield_now().await;
  }
  assert_eq!(session.current_choice(), Some(Choice::Support));

  // Live updates do not override the in-flight choice.
  session.observe(None);
  assert_eq!(session.current_choice(), Some(Choice::Support));

  assert!(matches!(
    session.vote(Choice::Against).await,
    Err(Error::VoteInFlight)
  ));

  drop(held);
  first.await.unwrap().unwrap();
  assert_eq!(session.action(), VoteAction::Committed { choice: Choice::Support });
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reconcile_repairs_corrupted_tally() {
  let store = sqlite().await;
  let s = statement();
  store.put_user_vote(&voter("a"), &s, Choice::Support).await.unwrap();
  store.put_user_vote(&voter("b"), &s, Choice::Support).await.unwrap();
  store.put_user_vote(&voter("c"), &s, Choice::Against).await.unwrap();
  store.overwrite_tally(&s, TEXT, TallyCounts::new(99, 0)).await.unwrap();

  let drift = check(store.as_ref(), &s).await.unwrap();
  assert!(!drift.in_sync());
  assert_eq!(drift.records, 3);

  let fixed = reconcile(store.as_ref(), &s, TEXT).await.unwrap();
  assert_eq!(fixed.before, Some(TallyCounts::new(99, 0)));
  assert_eq!(fixed.after.counts, TallyCounts::new(2, 1));
  assert_eq!(fixed.records_scanned, 3);
  assert!(fixed.changed());

  assert!(check(store.as_ref(), &s).await.unwrap().in_sync());

  let again = reconcile(store.as_ref(), &s, TEXT).await.unwrap();
  assert!(!again.changed());
}

#[tokio::test]
async fn reconcile_creates_missing_tally() {
  let store = sqlite().await;
  let s = statement();
  store.put_user_vote(&voter("a"), &s, Choice::Against).await.unwrap();

  assert!(check(store.as_ref(), &s).await.unwrap().stored.is_none());
  let result = reconcile(store.as_ref(), &s, TEXT).await.unwrap();
  assert_eq!(result.before, None);
  assert_eq!(result.after.counts, TallyCounts::new(0, 1));
}
