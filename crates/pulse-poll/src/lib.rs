//! Poll logic for the dashboard's single statement vote.
//!
//! [`VoteAggregator`] implements vote casting against any
//! [`pulse_core::store::VoteStore`]; [`VoteSession`] layers the optimistic
//! per-voter state on top; [`reconcile`] and [`check`] are the operator's
//! drift tools.

mod aggregator;
mod reconcile;
mod session;

pub mod error;

pub use aggregator::{VoteAggregator, VoteReceipt};
pub use error::{Error, Result};
pub use reconcile::{DriftReport, Reconciliation, check, reconcile};
pub use session::{VoteAction, VoteSession};

#[cfg(test)]
mod tests;
