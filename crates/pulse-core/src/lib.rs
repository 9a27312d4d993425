//! Core types and trait definitions for the overdose-trends dashboard.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The series indexer, the vote store backends, the poll logic and the HTTP
//! surface all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod series;
pub mod store;
pub mod subscription;
pub mod vote;

pub use error::{Error, Result};
