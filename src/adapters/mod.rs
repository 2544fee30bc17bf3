//! Harness adapters: the seam between the orchestrator and agent processes.
//!
//! Each adapter knows how to:
//! 1. Probe that its harness is installed and ready
//! 2. Launch the harness against a task inside a workspace, under a
//!    timeout it enforces itself
//! 3. Parse harness-specific output into the normalized metrics bundle
//!
//! Adapters never return errors from `run`: process-level failures are
//! encoded in [`ExecutionStatus`] so a broken harness can never abort a
//! benchmark batch. New harness integrations implement exactly this
//! contract and are registered in an [`AdapterRegistry`].

pub mod aider;
pub mod claude_code;
pub mod exec;
pub mod generic;
pub mod registry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::schema::Task;

pub use aider::AiderAdapter;
pub use claude_code::ClaudeCodeAdapter;
pub use exec::{BoundedCommand, ProcessOutcome};
pub use generic::GenericAdapter;
pub use registry::{AdapterRegistry, RegistryError};

/// Terminal state of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The harness exited zero.
    Success,
    /// The harness exited non-zero.
    Failure,
    /// The configured timeout expired; the process was killed.
    Timeout,
    /// The process could not be started or waited on.
    Error,
}

/// Configuration handed to an adapter for one run.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Workspace directory the harness runs inside.
    pub workspace: PathBuf,
    /// Target model identifier.
    pub model: String,
    /// Absolute timeout the adapter must enforce itself.
    pub timeout: Duration,
    /// Environment variable overrides on top of the parent environment.
    pub env: BTreeMap<String, String>,
    /// Whether the harness should stream output (reserved; built-in
    /// adapters run in batch mode).
    pub streaming: bool,
}

/// Raw captures from one adapter invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionArtifacts {
    pub stdout: String,
    pub stderr: String,
    /// Conversation transcript, when the harness emits one.
    pub transcript: Option<String>,
    /// Unified diff of workspace changes; filled in by the orchestrator.
    pub diff: Option<String>,
    /// Files changed during the run; filled in by the orchestrator.
    pub files_changed: Vec<String>,
}

/// Outcome of one adapter invocation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub exit_code: i32,
    /// The adapter's self-measured duration. The orchestrator's wall clock
    /// is authoritative for persisted metrics.
    pub duration: Duration,
    pub artifacts: ExecutionArtifacts,
}

/// Readiness probe outcome. Setup never throws; failure is communicated
/// through `ready = false`.
#[derive(Debug, Clone)]
pub struct SetupStatus {
    pub ready: bool,
    pub version: String,
    pub error: Option<String>,
}

impl SetupStatus {
    /// A ready harness at the given version.
    pub fn ready(version: impl Into<String>) -> Self {
        Self {
            ready: true,
            version: version.into(),
            error: None,
        }
    }

    /// A harness that cannot run, with the reason.
    pub fn not_ready(error: impl Into<String>) -> Self {
        Self {
            ready: false,
            version: "unknown".to_string(),
            error: Some(error.into()),
        }
    }
}

/// Normalized per-run metrics parsed from harness output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterMetrics {
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub tokens_cache_write: Option<u64>,
    pub tokens_cache_read: Option<u64>,
    pub tool_calls: u64,
    pub tool_calls_by_type: Option<BTreeMap<String, u64>>,
    pub turns: u64,
    pub cost_usd: f64,
}

/// Contract every harness integration implements.
#[async_trait]
pub trait HarnessAdapter: std::fmt::Debug + Send + Sync {
    /// Stable harness identifier (matches the registry key).
    fn id(&self) -> &str;

    /// Human-readable harness name.
    fn name(&self) -> &str;

    /// Probes binary presence and credentials. Never errors.
    async fn setup(&self) -> SetupStatus;

    /// Runs the task's prompt inside the workspace. Must enforce
    /// `config.timeout` by forcibly terminating the underlying process,
    /// and must encode process-level faults as `ExecutionStatus::Error`
    /// rather than propagating them.
    async fn run(&self, task: &Task, config: &ExecutionConfig) -> ExecutionResult;

    /// Best-effort parse of harness-specific output into the normalized
    /// bundle. Returns a zero-valued bundle on parse failure.
    async fn collect_metrics(&self, artifacts: &ExecutionArtifacts) -> AdapterMetrics;

    /// Releases adapter-held resources. Called unconditionally by the
    /// orchestrator's cleanup phase.
    async fn teardown(&self) {}
}

/// Maps a bounded-subprocess outcome onto the adapter result shape.
/// Shared by the built-in CLI adapters.
pub(crate) fn result_from_outcome(outcome: ProcessOutcome, duration: Duration) -> ExecutionResult {
    match outcome {
        ProcessOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        } => ExecutionResult {
            status: if exit_code == 0 {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failure
            },
            exit_code,
            duration,
            artifacts: ExecutionArtifacts {
                stdout,
                stderr,
                ..ExecutionArtifacts::default()
            },
        },
        ProcessOutcome::TimedOut { stdout, stderr } => ExecutionResult {
            status: ExecutionStatus::Timeout,
            exit_code: -1,
            duration,
            artifacts: ExecutionArtifacts {
                stdout,
                stderr,
                ..ExecutionArtifacts::default()
            },
        },
        ProcessOutcome::Failed { message } => ExecutionResult {
            status: ExecutionStatus::Error,
            exit_code: -1,
            duration,
            artifacts: ExecutionArtifacts {
                stderr: message,
                ..ExecutionArtifacts::default()
            },
        },
    }
}
