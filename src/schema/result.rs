//! Result records: the graded outcome of exactly one run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized metrics bundle merged from the adapter, the orchestrator's
/// wall clock, and workspace diff statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub tokens_input: u64,
    pub tokens_output: u64,
    #[serde(default)]
    pub tokens_cache_write: Option<u64>,
    #[serde(default)]
    pub tokens_cache_read: Option<u64>,
    /// Orchestrator-measured execution duration. Authoritative over the
    /// adapter's self-reported duration.
    pub wall_clock_ms: u64,
    pub tool_calls: u64,
    #[serde(default)]
    pub tool_calls_by_type: Option<BTreeMap<String, u64>>,
    pub turns: u64,
    pub cost_usd: f64,
    #[serde(default)]
    pub files_changed: Option<usize>,
    #[serde(default)]
    pub lines_added: Option<usize>,
    #[serde(default)]
    pub lines_removed: Option<usize>,
    #[serde(default)]
    pub diff_size: Option<usize>,
}

/// Strategy-specific grading diagnostics attached to a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDetail {
    /// Grading strategy that produced the score.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form diagnostic data (command output, per-file match states).
    pub details: serde_json::Value,
    #[serde(default)]
    pub tests_run: Option<u32>,
    #[serde(default)]
    pub tests_passed: Option<u32>,
    #[serde(default)]
    pub tests_failed: Option<u32>,
}

/// Error descriptor recorded when a run could not complete normally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// The outcome of exactly one run, keyed 1:1 by run id.
///
/// Created once, immediately after grading completes. Every run receives
/// exactly one result, including orchestration-failure paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub passed: bool,
    /// Score in `[0, validation.max_score]`.
    pub score: f64,
    pub metrics: ResultMetrics,
    #[serde(default)]
    pub validation: Option<ValidationDetail>,
    #[serde(default)]
    pub error: Option<ResultError>,
}

impl RunResult {
    /// Builds the zero-score result recorded when an orchestrator-internal
    /// fault prevents a run from being graded.
    pub fn execution_error(run_id: Uuid, wall_clock_ms: u64, message: impl Into<String>) -> Self {
        Self {
            run_id,
            passed: false,
            score: 0.0,
            metrics: ResultMetrics {
                wall_clock_ms,
                turns: 0,
                ..ResultMetrics::default()
            },
            validation: None,
            error: Some(ResultError {
                kind: "execution_error".to_string(),
                message: message.into(),
            }),
        }
    }
}
