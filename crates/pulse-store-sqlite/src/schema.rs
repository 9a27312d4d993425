//! SQL schema for the poll store.
//!
//! Executed once at connection startup. The two tables mirror the document
//! collections: `votes` is keyed by statement id, `user_votes` by the
//! `(voter_id, statement_id)` pair.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;

-- Aggregate tally per statement. `version` is bumped on every write and
-- checked by the optimistic update.
CREATE TABLE IF NOT EXISTS votes (
    statement_id TEXT PRIMARY KEY,
    support      INTEGER NOT NULL DEFAULT 0,
    against      INTEGER NOT NULL DEFAULT 0,
    statement    TEXT NOT NULL,
    version      INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,   -- ISO 8601 UTC; store-assigned
    updated_at   TEXT NOT NULL
);

-- One live choice per voter per statement; overwritten in place.
CREATE TABLE IF NOT EXISTS user_votes (
    voter_id     TEXT NOT NULL,
    statement_id TEXT NOT NULL,
    vote         TEXT NOT NULL CHECK (vote IN ('support', 'against')),
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (voter_id, statement_id)
);

CREATE INDEX IF NOT EXISTS user_votes_statement_idx ON user_votes(statement_id);

PRAGMA user_version = 2;
";
