//! Run records: one attempt of one task by one harness+model combination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a run.
///
/// A run is created as `Running` and mutated exactly once to one of the
/// three terminal states. `Pending` exists for externally queued runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl RunStatus {
    /// Returns the wire name stored in the database status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Timeout
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host environment a run executed on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEnvironment {
    pub os: String,
    pub arch: String,
}

impl RunEnvironment {
    /// Captures the current host's OS and architecture.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// One attempt of one task by one harness+model combination.
///
/// The (task, harness, model, timestamp) tuple is not unique; repeated runs
/// of the same combination feed consistency metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique run identifier.
    pub id: Uuid,
    pub task_id: String,
    pub harness_id: String,
    pub model_id: String,
    /// Dispatch timestamp, recorded before provisioning starts.
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Measured execution duration; excludes workspace preparation.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub status: RunStatus,
    pub environment: RunEnvironment,
}

impl Run {
    /// Creates a new run in the `Running` state, stamped with a fresh id
    /// and the current host environment.
    pub fn dispatch(
        task_id: impl Into<String>,
        harness_id: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.into(),
            harness_id: harness_id.into(),
            model_id: model_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: RunStatus::Running,
            environment: RunEnvironment::current(),
        }
    }

    /// Transitions the run to a terminal status with its completion time.
    pub fn finish(&mut self, status: RunStatus, completed_at: DateTime<Utc>, duration_ms: u64) {
        self.status = status;
        self.completed_at = Some(completed_at);
        self.duration_ms = Some(duration_ms);
    }
}
