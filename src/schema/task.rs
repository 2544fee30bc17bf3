//! Task definitions: the immutable specification of one benchmark challenge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::suite::Difficulty;

/// How a completed workspace is converted into a pass/fail + score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationType {
    /// Execute the task's test command and score by pass ratio.
    TestSuite,
    /// Compare expected file contents against the workspace.
    DiffMatch,
    /// Delegate scoring to an external LLM judge.
    LlmJudge,
    /// Test-suite first, weighted diff-match fallback.
    Hybrid,
    /// Requires human review; never passes automatically.
    Manual,
}

impl ValidationType {
    /// Returns the wire name used in task files and result records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationType::TestSuite => "test-suite",
            ValidationType::DiffMatch => "diff-match",
            ValidationType::LlmJudge => "llm-judge",
            ValidationType::Hybrid => "hybrid",
            ValidationType::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ValidationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution context a workspace is provisioned from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Remote repository to clone into the workspace.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Commit or branch to check out; defaults to the remote HEAD.
    #[serde(default)]
    pub repo_commit: Option<String>,
    /// Pre-baked snapshot identifier (informational).
    #[serde(default)]
    pub repo_snapshot: Option<String>,
    /// Seed files keyed by workspace-relative path. Written after any
    /// clone so they override repository content.
    #[serde(default)]
    pub files: Option<BTreeMap<String, String>>,
    /// Source language of the task (drives dependency installation).
    pub language: String,
    /// Frameworks the task exercises (informational).
    #[serde(default)]
    pub framework: Option<Vec<String>>,
    /// Tools the agent is expected to have available (informational).
    #[serde(default)]
    pub required_tools: Option<Vec<String>>,
    /// Packages to install before the agent starts, keyed by name.
    #[serde(default)]
    pub dependencies: Option<BTreeMap<String, String>>,
}

/// Validation descriptor: strategy type plus strategy-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskValidation {
    /// Grading strategy to apply.
    #[serde(rename = "type")]
    pub kind: ValidationType,
    /// Shell command executed by test-suite (and hybrid) grading.
    #[serde(default)]
    pub test_command: Option<String>,
    /// Workspace-relative destinations for grading-only test files that
    /// live next to the task YAML as `<task-id>.test.<ext>`.
    #[serde(default)]
    pub test_files: Option<Vec<String>>,
    /// Expected file contents for diff-match grading, keyed by path.
    #[serde(default)]
    pub expected_files: Option<BTreeMap<String, String>>,
    /// Rubric handed to the LLM judge.
    #[serde(default)]
    pub judge_prompt: Option<String>,
    /// Maximum attainable score.
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    /// Score at or above which the run passes.
    #[serde(default = "default_passing_score")]
    pub passing_score: f64,
}

fn default_max_score() -> f64 {
    100.0
}

fn default_passing_score() -> f64 {
    70.0
}

/// A single benchmark challenge. Loaded once per invocation, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: String,
    /// Suite this task belongs to.
    pub suite_id: String,
    /// Short human-readable title.
    pub title: String,
    /// Longer description of the challenge.
    pub description: String,
    /// Difficulty classification.
    pub difficulty: Difficulty,
    /// Rough expected completion time for a human.
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    /// Workspace provisioning context.
    pub context: TaskContext,
    /// The prompt handed to the harness.
    pub prompt: String,
    /// How the result is graded.
    pub validation: TaskValidation,
    /// Task author.
    pub author: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Task definition version.
    pub version: String,
}

impl Task {
    /// Checks invariants that typed deserialization cannot express.
    ///
    /// Returns the first violation found. Tasks failing validation must
    /// never reach the orchestrator.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("task id must be non-empty".to_string());
        }
        if self.suite_id.trim().is_empty() {
            return Err(format!("task '{}': suite_id must be non-empty", self.id));
        }
        if self.prompt.trim().is_empty() {
            return Err(format!("task '{}': prompt must be non-empty", self.id));
        }
        if self.validation.max_score <= 0.0 {
            return Err(format!(
                "task '{}': max_score must be positive, got {}",
                self.id, self.validation.max_score
            ));
        }
        if self.validation.passing_score < 0.0
            || self.validation.passing_score > self.validation.max_score
        {
            return Err(format!(
                "task '{}': passing_score {} must lie in [0, {}]",
                self.id, self.validation.passing_score, self.validation.max_score
            ));
        }
        Ok(())
    }
}
