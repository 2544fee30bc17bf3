//! Grading engine: converts a completed workspace into a pass/fail + score.
//!
//! Each validation strategy is a closed variant of [`GradingStrategy`],
//! carrying its own parameters and implementing a single grade capability,
//! so adding a strategy is a compile-time-checked extension rather than an
//! open-ended branch.
//!
//! Grading is infallible by design: subprocess failures, unreadable files
//! and unrecognized test output all fold into a failing score with
//! diagnostics, never into an orchestration fault.

pub mod output;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::adapters::{BoundedCommand, ProcessOutcome};
use crate::schema::{Task, TaskValidation, ValidationType};

pub use output::{parse_test_output, TestCounts};

/// Default bound on test-suite execution.
const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default shell command when a test-suite task does not configure one.
const DEFAULT_TEST_COMMAND: &str = "npm test";

/// Weighting applied when hybrid grading combines its component scores.
///
/// These are configurable constants, not invariants; construct a custom
/// value via [`Grader::with_weights`] to change the blend.
#[derive(Debug, Clone, Copy)]
pub struct GradingWeights {
    pub test: f64,
    pub diff: f64,
}

impl Default for GradingWeights {
    fn default() -> Self {
        Self {
            test: 0.7,
            diff: 0.3,
        }
    }
}

/// The graded outcome of one workspace.
#[derive(Debug, Clone)]
pub struct GradingOutcome {
    pub passed: bool,
    pub score: f64,
    /// Strategy that produced the score.
    pub kind: ValidationType,
    /// Strategy-specific diagnostic data.
    pub details: serde_json::Value,
    pub tests_run: Option<u32>,
    pub tests_passed: Option<u32>,
    pub tests_failed: Option<u32>,
}

impl GradingOutcome {
    fn scoreless(kind: ValidationType, details: serde_json::Value) -> Self {
        Self {
            passed: false,
            score: 0.0,
            kind,
            details,
            tests_run: None,
            tests_passed: None,
            tests_failed: None,
        }
    }
}

/// Grades workspaces against their task's validation descriptor.
#[derive(Debug, Clone)]
pub struct Grader {
    weights: GradingWeights,
    test_timeout: Duration,
}

impl Default for Grader {
    fn default() -> Self {
        Self::new()
    }
}

impl Grader {
    pub fn new() -> Self {
        Self {
            weights: GradingWeights::default(),
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    /// Overrides the hybrid combination weights.
    pub fn with_weights(mut self, weights: GradingWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Overrides the test-suite execution bound.
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Scores the workspace with the task's validation strategy.
    pub async fn grade(&self, task: &Task, workspace: &Path) -> GradingOutcome {
        let strategy = GradingStrategy::for_task(&task.validation, self.weights, self.test_timeout);
        let outcome = strategy.grade(workspace).await;

        info!(
            "Graded task {} ({}): {} with score {:.1}",
            task.id,
            outcome.kind,
            if outcome.passed { "PASSED" } else { "FAILED" },
            outcome.score
        );

        outcome
    }
}

/// Closed set of grading strategies.
pub enum GradingStrategy {
    TestSuite(TestSuiteStrategy),
    DiffMatch(DiffMatchStrategy),
    LlmJudge(LlmJudgeStrategy),
    Hybrid(HybridStrategy),
    Manual(ManualStrategy),
}

impl GradingStrategy {
    /// Builds the strategy described by a task's validation descriptor.
    pub fn for_task(
        validation: &TaskValidation,
        weights: GradingWeights,
        test_timeout: Duration,
    ) -> Self {
        match validation.kind {
            ValidationType::TestSuite => {
                GradingStrategy::TestSuite(TestSuiteStrategy::from_validation(
                    validation,
                    test_timeout,
                ))
            }
            ValidationType::DiffMatch => GradingStrategy::DiffMatch(DiffMatchStrategy {
                expected_files: validation.expected_files.clone(),
                max_score: validation.max_score,
                passing_score: validation.passing_score,
            }),
            ValidationType::LlmJudge => GradingStrategy::LlmJudge(LlmJudgeStrategy),
            ValidationType::Hybrid => GradingStrategy::Hybrid(HybridStrategy {
                test: TestSuiteStrategy::from_validation(validation, test_timeout),
                diff: validation
                    .expected_files
                    .as_ref()
                    .filter(|files| !files.is_empty())
                    .map(|files| DiffMatchStrategy {
                        expected_files: Some(files.clone()),
                        max_score: validation.max_score,
                        passing_score: validation.passing_score,
                    }),
                weights,
                passing_score: validation.passing_score,
            }),
            ValidationType::Manual => GradingStrategy::Manual(ManualStrategy),
        }
    }

    /// Scores the workspace. Never errors.
    pub async fn grade(&self, workspace: &Path) -> GradingOutcome {
        match self {
            GradingStrategy::TestSuite(s) => s.grade(workspace).await,
            GradingStrategy::DiffMatch(s) => s.grade(workspace),
            GradingStrategy::LlmJudge(s) => s.grade(),
            GradingStrategy::Hybrid(s) => s.grade(workspace).await,
            GradingStrategy::Manual(s) => s.grade(),
        }
    }
}

/// Executes the task's test command and scores by pass ratio.
pub struct TestSuiteStrategy {
    pub command: String,
    pub timeout: Duration,
    pub max_score: f64,
    pub passing_score: f64,
}

impl TestSuiteStrategy {
    fn from_validation(validation: &TaskValidation, timeout: Duration) -> Self {
        Self {
            command: validation
                .test_command
                .clone()
                .unwrap_or_else(|| DEFAULT_TEST_COMMAND.to_string()),
            timeout,
            max_score: validation.max_score,
            passing_score: validation.passing_score,
        }
    }

    async fn grade(&self, workspace: &Path) -> GradingOutcome {
        debug!("Running test command '{}' in {}", self.command, workspace.display());

        let outcome = shell_command(&self.command)
            .current_dir(workspace)
            .envs(&grading_env())
            .with_timeout(self.timeout)
            .run()
            .await;

        let (combined, mut details) = match outcome {
            ProcessOutcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                let combined = format!("{}{}", stdout, stderr);
                let mut details = json!({
                    "command": self.command,
                    "output": combined.clone(),
                    "exit_code": exit_code,
                });
                // The parsed pass ratio is authoritative; a non-zero exit
                // only taints the diagnostics.
                if exit_code != 0 {
                    details["tainted"] = json!(true);
                }
                (combined, details)
            }
            ProcessOutcome::TimedOut { stdout, stderr } => {
                warn!("Test command '{}' timed out after {:?}", self.command, self.timeout);
                let combined = format!("{}{}", stdout, stderr);
                let details = json!({
                    "command": self.command,
                    "output": combined.clone(),
                    "timed_out": true,
                });
                (combined, details)
            }
            ProcessOutcome::Failed { message } => {
                warn!("Test command '{}' failed to run: {}", self.command, message);
                (
                    String::new(),
                    json!({
                        "command": self.command,
                        "error": message,
                    }),
                )
            }
        };

        let counts = parse_test_output(&combined);
        let score = if counts.total > 0 {
            (counts.passed as f64 / counts.total as f64) * self.max_score
        } else {
            0.0
        };

        if counts.total == 0 {
            details["unrecognized_output"] = json!(true);
        }

        GradingOutcome {
            passed: score >= self.passing_score,
            score,
            kind: ValidationType::TestSuite,
            details,
            tests_run: Some(counts.total),
            tests_passed: Some(counts.passed),
            tests_failed: Some(counts.failed),
        }
    }
}

/// Compares expected file contents against the workspace, trimmed exact
/// equality per file.
pub struct DiffMatchStrategy {
    pub expected_files: Option<BTreeMap<String, String>>,
    pub max_score: f64,
    pub passing_score: f64,
}

impl DiffMatchStrategy {
    fn grade(&self, workspace: &Path) -> GradingOutcome {
        let expected = match self.expected_files {
            Some(ref files) if !files.is_empty() => files,
            _ => {
                return GradingOutcome::scoreless(
                    ValidationType::DiffMatch,
                    json!({"error": "No expected files defined"}),
                )
            }
        };

        let mut matched = 0usize;
        let mut details = serde_json::Map::new();

        for (rel_path, expected_content) in expected {
            let full_path = workspace.join(rel_path);
            let state = match std::fs::read_to_string(&full_path) {
                Ok(actual) => {
                    if actual.trim() == expected_content.trim() {
                        matched += 1;
                        "match"
                    } else {
                        "mismatch"
                    }
                }
                Err(_) => "missing",
            };
            details.insert(rel_path.clone(), json!(state));
        }

        let score = (matched as f64 / expected.len() as f64) * self.max_score;

        GradingOutcome {
            passed: score >= self.passing_score,
            score,
            kind: ValidationType::DiffMatch,
            details: serde_json::Value::Object(details),
            tests_run: None,
            tests_passed: None,
            tests_failed: None,
        }
    }
}

/// Placeholder until a judge backend is wired in: deterministic fail,
/// never a silent pass or skip.
pub struct LlmJudgeStrategy;

impl LlmJudgeStrategy {
    fn grade(&self) -> GradingOutcome {
        GradingOutcome::scoreless(
            ValidationType::LlmJudge,
            json!({"message": "LLM judge grading not yet implemented"}),
        )
    }
}

/// Test-suite first; when that alone does not pass, blends in diff-match.
pub struct HybridStrategy {
    pub test: TestSuiteStrategy,
    pub diff: Option<DiffMatchStrategy>,
    pub weights: GradingWeights,
    pub passing_score: f64,
}

impl HybridStrategy {
    async fn grade(&self, workspace: &Path) -> GradingOutcome {
        let test_outcome = self.test.grade(workspace).await;

        // A passing test suite is authoritative on its own.
        if test_outcome.passed {
            return test_outcome;
        }

        let diff = match self.diff {
            Some(ref diff) => diff,
            // No expected files: degrade to the pure test-suite result.
            None => return test_outcome,
        };

        let diff_outcome = diff.grade(workspace);
        let combined = self.weights.test * test_outcome.score + self.weights.diff * diff_outcome.score;

        GradingOutcome {
            passed: combined >= self.passing_score,
            score: combined,
            kind: ValidationType::Hybrid,
            details: json!({
                "test": test_outcome.details,
                "diff": diff_outcome.details,
            }),
            tests_run: test_outcome.tests_run,
            tests_passed: test_outcome.tests_passed,
            tests_failed: test_outcome.tests_failed,
        }
    }
}

/// Requires human review; never passes automatically.
pub struct ManualStrategy;

impl ManualStrategy {
    fn grade(&self) -> GradingOutcome {
        GradingOutcome::scoreless(
            ValidationType::Manual,
            json!({"message": "Manual grading required"}),
        )
    }
}

/// Builds the platform shell invocation for a test command.
fn shell_command(command: &str) -> BoundedCommand {
    #[cfg(windows)]
    {
        BoundedCommand::new("cmd").args(["/C", command])
    }
    #[cfg(not(windows))]
    {
        BoundedCommand::new("sh").args(["-c", command])
    }
}

/// Test runners get a CI-flagged, color-free environment.
fn grading_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("CI".to_string(), "true".to_string()),
        ("NO_COLOR".to_string(), "1".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Difficulty, TaskContext};
    use tempfile::TempDir;

    fn task_with_validation(validation: TaskValidation) -> Task {
        Task {
            id: "grading-task".to_string(),
            suite_id: "grading-suite".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            difficulty: Difficulty::Easy,
            estimated_minutes: None,
            context: TaskContext {
                repo_url: None,
                repo_commit: None,
                repo_snapshot: None,
                files: None,
                language: "text".to_string(),
                framework: None,
                required_tools: None,
                dependencies: None,
            },
            prompt: "p".to_string(),
            validation,
            author: "bench".to_string(),
            tags: vec![],
            version: "1.0.0".to_string(),
        }
    }

    fn validation(kind: ValidationType) -> TaskValidation {
        TaskValidation {
            kind,
            test_command: None,
            test_files: None,
            expected_files: None,
            judge_prompt: None,
            max_score: 100.0,
            passing_score: 70.0,
        }
    }

    #[tokio::test]
    async fn test_manual_never_passes() {
        let workspace = TempDir::new().unwrap();
        let task = task_with_validation(validation(ValidationType::Manual));

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.kind, ValidationType::Manual);
        assert!(outcome.details["message"]
            .as_str()
            .unwrap()
            .contains("Manual"));
    }

    #[tokio::test]
    async fn test_llm_judge_is_deterministic_fail() {
        let workspace = TempDir::new().unwrap();
        let task = task_with_validation(validation(ValidationType::LlmJudge));

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.kind, ValidationType::LlmJudge);
    }

    #[tokio::test]
    async fn test_diff_match_full_match() {
        let workspace = TempDir::new().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "x\n").unwrap();

        let mut v = validation(ValidationType::DiffMatch);
        v.expected_files = Some(BTreeMap::from([("a.txt".to_string(), "x".to_string())]));
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(outcome.passed);
        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.details["a.txt"], "match");
    }

    #[tokio::test]
    async fn test_diff_match_missing_file() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::DiffMatch);
        v.expected_files = Some(BTreeMap::from([("gone.txt".to_string(), "x".to_string())]));
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.details["gone.txt"], "missing");
    }

    #[tokio::test]
    async fn test_diff_match_without_expected_files() {
        let workspace = TempDir::new().unwrap();
        let task = task_with_validation(validation(ValidationType::DiffMatch));

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.details["error"].as_str().unwrap().contains("expected files"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_suite_scores_by_pass_ratio() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::TestSuite);
        v.test_command = Some("echo 'Tests: 8 passed, 2 failed, 10 total'".to_string());
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert_eq!(outcome.score, 80.0);
        assert!(outcome.passed);
        assert_eq!(outcome.tests_run, Some(10));
        assert_eq!(outcome.tests_passed, Some(8));
        assert_eq!(outcome.tests_failed, Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_suite_exit_code_only_taints() {
        let workspace = TempDir::new().unwrap();

        // Tests all pass but the command exits non-zero afterwards; the
        // parsed ratio stays authoritative.
        let mut v = validation(ValidationType::TestSuite);
        v.test_command = Some("echo 'Tests: 4 passed, 4 total'; exit 3".to_string());
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert_eq!(outcome.score, 100.0);
        assert!(outcome.passed);
        assert_eq!(outcome.details["tainted"], json!(true));
        assert_eq!(outcome.details["exit_code"], json!(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_suite_unrecognized_output_scores_zero() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::TestSuite);
        v.test_command = Some("echo 'no counters here'".to_string());
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.tests_run, Some(0));
        assert_eq!(outcome.details["unrecognized_output"], json!(true));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_test_suite_spawn_failure_folds_into_score() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::TestSuite);
        v.test_command = Some("harness-bench-no-such-test-runner".to_string());
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.score, 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hybrid_passing_tests_are_authoritative() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::Hybrid);
        v.test_command = Some("echo 'Tests: 5 passed, 5 total'".to_string());
        v.expected_files = Some(BTreeMap::from([("a.txt".to_string(), "x".to_string())]));
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert!(outcome.passed);
        assert_eq!(outcome.score, 100.0);
        assert_eq!(outcome.kind, ValidationType::TestSuite);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hybrid_combines_weighted_scores() {
        let workspace = TempDir::new().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "x").unwrap();

        let mut v = validation(ValidationType::Hybrid);
        v.test_command = Some("echo 'Tests: 1 passed, 1 failed, 2 total'".to_string());
        v.expected_files = Some(BTreeMap::from([("a.txt".to_string(), "x".to_string())]));
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        // 0.7 × 50 + 0.3 × 100 = 65, below the 70 threshold.
        assert_eq!(outcome.kind, ValidationType::Hybrid);
        assert!((outcome.score - 65.0).abs() < 1e-9);
        assert!(!outcome.passed);
        assert_eq!(outcome.tests_run, Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hybrid_without_expected_files_degrades_to_tests() {
        let workspace = TempDir::new().unwrap();

        let mut v = validation(ValidationType::Hybrid);
        v.test_command = Some("echo 'Tests: 1 passed, 1 failed, 2 total'".to_string());
        let task = task_with_validation(v);

        let outcome = Grader::new().grade(&task, workspace.path()).await;
        assert_eq!(outcome.kind, ValidationType::TestSuite);
        assert_eq!(outcome.score, 50.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_custom_weights_apply() {
        let workspace = TempDir::new().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "x").unwrap();

        let mut v = validation(ValidationType::Hybrid);
        v.test_command = Some("echo 'Tests: 0 passed, 2 failed, 2 total'".to_string());
        v.expected_files = Some(BTreeMap::from([("a.txt".to_string(), "x".to_string())]));
        let task = task_with_validation(v);

        let grader = Grader::new().with_weights(GradingWeights {
            test: 0.5,
            diff: 0.5,
        });
        let outcome = grader.grade(&task, workspace.path()).await;
        // 0.5 × 0 + 0.5 × 100 = 50.
        assert!((outcome.score - 50.0).abs() < 1e-9);
    }
}
