//! End-to-end orchestrator tests.
//!
//! These drive `execute` against scripted adapter doubles (registered via
//! the injectable registry), an in-memory store and scratch directories,
//! and assert the batch-level guarantees: deterministic ordering, skip
//! semantics, terminal status mapping, and exactly one result per run on
//! every path.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use harness_bench::adapters::{
    AdapterMetrics, AdapterRegistry, ExecutionArtifacts, ExecutionConfig, ExecutionResult,
    ExecutionStatus, HarnessAdapter, SetupStatus,
};
use harness_bench::orchestrator::{Orchestrator, RunPlan, RunProgress};
use harness_bench::schema::{
    Difficulty, RunStatus, Task, TaskContext, TaskValidation, ValidationType,
};
use harness_bench::storage::BenchStore;
use harness_bench::workspace::WorkspaceProvisioner;

/// Adapter double with a scripted outcome. On the success path it writes
/// `answer.txt` into the workspace so diff-match grading has something
/// real to score.
#[derive(Clone, Debug)]
struct ScriptedAdapter {
    id: String,
    ready: bool,
    status: ExecutionStatus,
}

impl ScriptedAdapter {
    fn succeeding(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ready: true,
            status: ExecutionStatus::Success,
        }
    }

    fn with_status(id: &str, status: ExecutionStatus) -> Self {
        Self {
            id: id.to_string(),
            ready: true,
            status,
        }
    }

    fn not_ready(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ready: false,
            status: ExecutionStatus::Success,
        }
    }
}

#[async_trait]
impl HarnessAdapter for ScriptedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Scripted test double"
    }

    async fn setup(&self) -> SetupStatus {
        if self.ready {
            SetupStatus::ready("0.0.0-test")
        } else {
            SetupStatus::not_ready("scripted as unavailable")
        }
    }

    async fn run(&self, _task: &Task, config: &ExecutionConfig) -> ExecutionResult {
        if self.status == ExecutionStatus::Success {
            std::fs::write(config.workspace.join("answer.txt"), "x\n").unwrap();
        }

        ExecutionResult {
            status: self.status,
            exit_code: if self.status == ExecutionStatus::Success {
                0
            } else {
                1
            },
            duration: Duration::from_millis(5),
            artifacts: ExecutionArtifacts {
                stdout: "scripted stdout".to_string(),
                stderr: String::new(),
                ..ExecutionArtifacts::default()
            },
        }
    }

    async fn collect_metrics(&self, _artifacts: &ExecutionArtifacts) -> AdapterMetrics {
        AdapterMetrics {
            tokens_input: 100,
            tokens_output: 50,
            tool_calls: 3,
            turns: 2,
            cost_usd: 0.01,
            ..AdapterMetrics::default()
        }
    }
}

fn diff_match_task(id: &str) -> Task {
    Task {
        id: id.to_string(),
        suite_id: "integration-suite".to_string(),
        title: "Write the answer".to_string(),
        description: "Write x into answer.txt".to_string(),
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
        prompt: "write x".to_string(),
        validation: TaskValidation {
            kind: ValidationType::DiffMatch,
            test_command: None,
            test_files: None,
            expected_files: Some(BTreeMap::from([(
                "answer.txt".to_string(),
                "x".to_string(),
            )])),
            judge_prompt: None,
            max_score: 100.0,
            passing_score: 70.0,
        },
        author: "bench".to_string(),
        tags: vec![],
        version: "1.0.0".to_string(),
    }
}

fn plan_for(tasks: Vec<Task>, harness_ids: Vec<&str>) -> RunPlan {
    RunPlan {
        tasks,
        harness_ids: harness_ids.into_iter().map(str::to_string).collect(),
        model_id: "test-model".to_string(),
        timeout: Duration::from_secs(5),
        env: BTreeMap::new(),
        data_dir: None,
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    store: BenchStore,
    _workspaces: TempDir,
    artifacts: TempDir,
}

async fn fixture(registry: AdapterRegistry) -> Fixture {
    let workspaces = TempDir::new().unwrap();
    Fixture {
        orchestrator: Orchestrator::new(registry)
            .with_provisioner(WorkspaceProvisioner::with_root(workspaces.path())),
        store: BenchStore::in_memory().await.unwrap(),
        _workspaces: workspaces,
        artifacts: TempDir::new().unwrap(),
    }
}

#[tokio::test]
async fn test_success_path_records_run_result_and_artifacts() {
    let mut registry = AdapterRegistry::new();
    registry.register("stub", || Box::new(ScriptedAdapter::succeeding("stub")));
    let fx = fixture(registry).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["stub"]);

    let mut progress_log: Vec<RunProgress> = Vec::new();
    let mut on_progress = |p: &RunProgress| progress_log.push(p.clone());

    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), Some(&mut on_progress))
        .await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.run.status, RunStatus::Completed);
    assert!(report.run.completed_at.is_some());
    assert!(report.result.passed);
    assert_eq!(report.result.score, 100.0);
    assert_eq!(report.result.metrics.tokens_input, 100);
    assert_eq!(report.result.metrics.files_changed, Some(0));

    // Persisted records agree with the report.
    let stored_run = fx.store.get_run(report.run.id).await.unwrap().unwrap();
    assert_eq!(stored_run.status, RunStatus::Completed);
    let stored_result = fx.store.get_result(report.run.id).await.unwrap().unwrap();
    assert!(stored_result.passed);

    // Artifact layout for the run.
    let run_dir = fx.artifacts.path().join(report.run.id.to_string());
    assert_eq!(
        std::fs::read_to_string(run_dir.join("stdout.txt")).unwrap(),
        "scripted stdout"
    );
    assert!(run_dir.join("stderr.txt").exists());

    // Progress: one callback per pair plus the final summary.
    assert_eq!(progress_log.len(), 2);
    let first = &progress_log[0];
    assert_eq!(first.completed, 0);
    assert_eq!(first.current.as_ref().unwrap().task_id, "task-a");
    let last = &progress_log[1];
    assert_eq!(last.completed, last.total);
    assert!(last.current.is_none());
}

#[tokio::test]
async fn test_adapter_error_status_fails_run_but_still_grades() {
    let mut registry = AdapterRegistry::new();
    registry.register("broken", || {
        Box::new(ScriptedAdapter::with_status("broken", ExecutionStatus::Error))
    });
    let fx = fixture(registry).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["broken"]);
    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.run.status, RunStatus::Failed);
    // A harness-level error is not an orchestration fault: grading still
    // ran (and scored zero, the answer file was never written).
    assert!(!report.result.passed);
    assert_eq!(report.result.score, 0.0);
    assert!(report.result.error.is_none());

    let stored_result = fx.store.get_result(report.run.id).await.unwrap().unwrap();
    assert_eq!(stored_result.score, 0.0);
}

#[tokio::test]
async fn test_timeout_status_maps_to_timeout_run() {
    let mut registry = AdapterRegistry::new();
    registry.register("slow", || {
        Box::new(ScriptedAdapter::with_status("slow", ExecutionStatus::Timeout))
    });
    let fx = fixture(registry).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["slow"]);
    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    assert_eq!(reports[0].run.status, RunStatus::Timeout);
    let stored = fx.store.get_run(reports[0].run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Timeout);
}

#[tokio::test]
async fn test_harness_exit_failure_still_completes_run() {
    let mut registry = AdapterRegistry::new();
    registry.register("nonzero", || {
        Box::new(ScriptedAdapter::with_status(
            "nonzero",
            ExecutionStatus::Failure,
        ))
    });
    let fx = fixture(registry).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["nonzero"]);
    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    // Non-zero harness exit is a completed run; the grade decides pass/fail.
    assert_eq!(reports[0].run.status, RunStatus::Completed);
    assert!(!reports[0].result.passed);
}

#[tokio::test]
async fn test_not_ready_harness_is_skipped_without_records() {
    let mut registry = AdapterRegistry::new();
    registry.register("absent", || Box::new(ScriptedAdapter::not_ready("absent")));
    let fx = fixture(registry).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["absent"]);

    let mut progress_log: Vec<RunProgress> = Vec::new();
    let mut on_progress = |p: &RunProgress| progress_log.push(p.clone());

    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), Some(&mut on_progress))
        .await;

    assert!(reports.is_empty());
    assert!(fx.store.get_all_runs().await.unwrap().is_empty());

    // Skipped pairs still count toward completion.
    let last = progress_log.last().unwrap();
    assert_eq!(last.completed, 1);
    assert_eq!(last.total, 1);
}

#[tokio::test]
async fn test_unknown_harness_id_is_skipped_without_records() {
    let fx = fixture(AdapterRegistry::new()).await;

    let plan = plan_for(vec![diff_match_task("task-a")], vec!["never-registered"]);
    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    assert!(reports.is_empty());
    assert!(fx.store.get_all_runs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_provision_failure_triggers_safety_net() {
    let mut registry = AdapterRegistry::new();
    registry.register("stub", || Box::new(ScriptedAdapter::succeeding("stub")));
    let fx = fixture(registry).await;

    let mut task = diff_match_task("task-a");
    task.context.repo_url =
        Some("file:///nonexistent/harness-bench-no-such-repo.git".to_string());

    let plan = plan_for(vec![task], vec!["stub"]);
    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    // The batch survives and the run still gets its one (error) result.
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.run.status, RunStatus::Failed);
    assert!(!report.result.passed);
    assert_eq!(report.result.score, 0.0);
    assert_eq!(
        report.result.error.as_ref().unwrap().kind,
        "execution_error"
    );

    let stored_run = fx.store.get_run(report.run.id).await.unwrap().unwrap();
    assert_eq!(stored_run.status, RunStatus::Failed);
    let stored_result = fx.store.get_result(report.run.id).await.unwrap().unwrap();
    assert_eq!(
        stored_result.error.as_ref().unwrap().kind,
        "execution_error"
    );
}

#[tokio::test]
async fn test_cross_product_is_deterministic_with_one_result_per_run() {
    let mut registry = AdapterRegistry::new();
    registry.register("alpha", || Box::new(ScriptedAdapter::succeeding("alpha")));
    registry.register("beta", || {
        Box::new(ScriptedAdapter::with_status("beta", ExecutionStatus::Error))
    });
    let fx = fixture(registry).await;

    let plan = plan_for(
        vec![diff_match_task("task-a"), diff_match_task("task-b")],
        vec!["alpha", "beta"],
    );

    let reports = fx
        .orchestrator
        .execute(&plan, &fx.store, fx.artifacts.path(), None)
        .await;

    // Outer loop over tasks, inner over harnesses.
    let order: Vec<(String, String)> = reports
        .iter()
        .map(|r| (r.run.task_id.clone(), r.run.harness_id.clone()))
        .collect();
    assert_eq!(
        order,
        vec![
            ("task-a".to_string(), "alpha".to_string()),
            ("task-a".to_string(), "beta".to_string()),
            ("task-b".to_string(), "alpha".to_string()),
            ("task-b".to_string(), "beta".to_string()),
        ]
    );

    // Every dispatched run has exactly one persisted result.
    for report in &reports {
        let result = fx.store.get_result(report.run.id).await.unwrap();
        assert!(result.is_some(), "run {} has no result", report.run.id);
        let run = fx.store.get_run(report.run.id).await.unwrap().unwrap();
        assert!(run.status.is_terminal());
    }
    assert_eq!(fx.store.get_all_runs().await.unwrap().len(), 4);
}
