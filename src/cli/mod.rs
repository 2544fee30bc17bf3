//! Command-line interface for harness-bench.
//!
//! Provides commands for running benchmark batches, inspecting the task
//! and harness catalogs, and viewing stored results.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
