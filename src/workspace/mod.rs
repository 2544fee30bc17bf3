//! Workspace provisioning and change tracking.
//!
//! Every run executes in its own ephemeral filesystem directory,
//! materialized from the task's execution context:
//!
//! ```text
//! Task context → clone (optional) → seed files → dependency install → baseline commit
//! ```
//!
//! The baseline commit captures the pre-agent state so that everything the
//! agent changed can be recovered afterwards with the read-only diff
//! helpers. Workspaces are owned exclusively by the orchestrator for the
//! lifetime of one run and released (best-effort) when the run's
//! processing ends.

pub mod diff;
pub mod provisioner;

pub use diff::{changed_files, diff_output, diff_stats, DiffStats};
pub use provisioner::{inject_test_files, Workspace, WorkspaceError, WorkspaceProvisioner};
