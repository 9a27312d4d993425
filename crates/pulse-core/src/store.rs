//! The `VoteStore` trait: the contract of the shared document store.
//!
//! The trait is implemented by storage backends (e.g. `pulse-store-sqlite`).
//! The poll logic and the HTTP layer depend on this abstraction, never on a
//! concrete backend, so both can be exercised against test doubles.
//!
//! Two collections are modelled:
//!
//! | Collection  | Keyed by                     | Type               |
//! |-------------|------------------------------|--------------------|
//! | `votes`     | `statementId`                | [`AggregateTally`] |
//! | `userVotes` | `(voterId, statementId)`     | [`UserVoteRecord`] |

use std::future::Future;

use crate::{
  subscription::Subscription,
  vote::{
    AggregateTally, Choice, RecordedVote, StatementId, TallyCounts, TallyDelta, UserVoteRecord,
    VoterId,
  },
};

/// Abstraction over the document store backing the poll.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait VoteStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── userVotes ─────────────────────────────────────────────────────────

  /// Read one voter's record. Returns `None` if they never voted.
  fn get_user_vote<'a>(
    &'a self,
    voter: &'a VoterId,
    statement: &'a StatementId,
  ) -> impl Future<Output = Result<Option<UserVoteRecord>, Self::Error>> + Send + 'a;

  /// Upsert a voter's choice and return the choice it replaced. Reading the
  /// old choice and writing the new one is atomic, so two concurrent writes
  /// for the same voter each see what the other left behind. Last write
  /// wins; `created_at` survives overwrites.
  fn put_user_vote<'a>(
    &'a self,
    voter: &'a VoterId,
    statement: &'a StatementId,
    choice: Choice,
  ) -> impl Future<Output = Result<RecordedVote, Self::Error>> + Send + 'a;

  /// Every voter record for a statement (a full scan).
  fn list_user_votes<'a>(
    &'a self,
    statement: &'a StatementId,
  ) -> impl Future<Output = Result<Vec<UserVoteRecord>, Self::Error>> + Send + 'a;

  // ── votes ─────────────────────────────────────────────────────────────

  /// Read the aggregate for a statement. Returns `None` if it does not exist.
  fn get_tally<'a>(
    &'a self,
    statement: &'a StatementId,
  ) -> impl Future<Output = Result<Option<AggregateTally>, Self::Error>> + Send + 'a;

  /// Create the aggregate with `counts` if it does not exist yet; leave an
  /// existing one untouched. Returns the stored aggregate either way.
  fn seed_tally<'a>(
    &'a self,
    statement: &'a StatementId,
    statement_text: &'a str,
    counts: TallyCounts,
  ) -> impl Future<Output = Result<AggregateTally, Self::Error>> + Send + 'a;

  /// Atomically apply `delta` to the aggregate, creating it with zero counts
  /// and `statement_text` first if absent, and stamp `updated_at`.
  ///
  /// Must use compare-and-retry semantics: concurrent callers never lose an
  /// increment or decrement. Fails only once the backend's retries are
  /// exhausted.
  fn apply_tally_delta<'a>(
    &'a self,
    statement: &'a StatementId,
    statement_text: &'a str,
    delta: TallyDelta,
  ) -> impl Future<Output = Result<AggregateTally, Self::Error>> + Send + 'a;

  /// Overwrite the counters (and statement text) with authoritative values,
  /// creating the aggregate if absent. Used by reconciliation only.
  fn overwrite_tally<'a>(
    &'a self,
    statement: &'a StatementId,
    statement_text: &'a str,
    counts: TallyCounts,
  ) -> impl Future<Output = Result<AggregateTally, Self::Error>> + Send + 'a;

  // ── Live reads ────────────────────────────────────────────────────────

  /// Subscribe to the aggregate. The current state is delivered first, then
  /// every committed change in commit order.
  fn subscribe_tally<'a>(
    &'a self,
    statement: &'a StatementId,
  ) -> impl Future<Output = Result<Subscription<Option<AggregateTally>>, Self::Error>> + Send + 'a;

  /// Subscribe to one voter's record, with the same delivery guarantees as
  /// [`VoteStore::subscribe_tally`].
  fn subscribe_user_vote<'a>(
    &'a self,
    voter: &'a VoterId,
    statement: &'a StatementId,
  ) -> impl Future<Output = Result<Subscription<Option<UserVoteRecord>>, Self::Error>> + Send + 'a;
}
