//! Durable persistence for runs, results and execution artifacts.
//!
//! The store is an append-oriented SQLite database in WAL journal mode:
//! runs are inserted once, mutated exactly once to a terminal status, and
//! never deleted; results are written exactly once per run. Each record is
//! persisted as a JSON blob (the source of truth) alongside normalized
//! columns that exist purely as query indices for filtering and the
//! leaderboard aggregation.
//!
//! Large per-run captures (agent stdout/stderr, workspace diff) go to the
//! artifact directory instead of the database.

pub mod artifacts;
pub mod database;

pub use artifacts::ArtifactStore;
pub use database::{BenchStore, LeaderboardEntry, RunQuery, RunWithResult, StoreError};
