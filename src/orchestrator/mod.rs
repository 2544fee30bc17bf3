//! The run orchestrator: sequences provisioning, execution, grading,
//! metrics and persistence for every (task × harness) pair.
//!
//! ```text
//! plan → [provision → run adapter → diff → artifacts → grade → metrics → persist] → cleanup
//! ```
//!
//! Pairs are processed strictly sequentially: one run is fully provisioned,
//! executed, graded and cleaned up before the next begins, so adapters with
//! global state never see overlapping invocations and workspaces cannot
//! collide. Failures are isolated at the per-pair boundary; nothing below
//! it may abort the batch. Every dispatched run receives exactly one
//! result, including orchestrator-internal fault paths.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapters::{AdapterRegistry, ExecutionConfig, ExecutionStatus, HarnessAdapter};
use crate::grading::Grader;
use crate::schema::{ResultMetrics, Run, RunResult, RunStatus, Task, ValidationDetail};
use crate::storage::{ArtifactStore, BenchStore};
use crate::workspace::{self, inject_test_files, Workspace, WorkspaceProvisioner};

/// Everything needed to execute one batch.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub tasks: Vec<Task>,
    pub harness_ids: Vec<String>,
    pub model_id: String,
    /// Per-run timeout enforced by the adapters.
    pub timeout: Duration,
    /// Environment variable overrides passed to every adapter invocation.
    pub env: BTreeMap<String, String>,
    /// Data directory holding grading-only test files, when tasks use them.
    pub data_dir: Option<PathBuf>,
}

/// The pair currently being processed.
#[derive(Debug, Clone)]
pub struct CurrentPair {
    pub task_id: String,
    pub harness_id: String,
}

/// Batch progress reported before each pair and once after the batch.
#[derive(Debug, Clone)]
pub struct RunProgress {
    pub total: usize,
    pub completed: usize,
    /// Absent on the final callback.
    pub current: Option<CurrentPair>,
}

/// A finished run together with its result.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: Run,
    pub result: RunResult,
}

/// Progress observer invoked by [`Orchestrator::execute`].
pub type ProgressCallback<'a> = &'a mut dyn FnMut(&RunProgress);

struct PairSuccess {
    status: RunStatus,
    completed_at: DateTime<Utc>,
    duration_ms: u64,
    result: RunResult,
}

struct PairFault {
    message: String,
    duration_ms: u64,
}

/// Drives benchmark batches. Collaborators are injected at construction
/// so tests can substitute adapter doubles and scratch directories.
pub struct Orchestrator {
    registry: AdapterRegistry,
    provisioner: WorkspaceProvisioner,
    grader: Grader,
}

impl Orchestrator {
    /// Creates an orchestrator over the given adapter registry.
    pub fn new(registry: AdapterRegistry) -> Self {
        Self {
            registry,
            provisioner: WorkspaceProvisioner::new(),
            grader: Grader::new(),
        }
    }

    /// Overrides the workspace provisioner.
    pub fn with_provisioner(mut self, provisioner: WorkspaceProvisioner) -> Self {
        self.provisioner = provisioner;
        self
    }

    /// Overrides the grader.
    pub fn with_grader(mut self, grader: Grader) -> Self {
        self.grader = grader;
        self
    }

    /// Executes the full task × harness cross-product sequentially.
    ///
    /// Ordering is deterministic: outer loop over tasks, inner over
    /// harness ids. Harnesses that fail their readiness probe are skipped
    /// (counted as completed, no records written). Every other dispatched
    /// pair produces exactly one run and one result in the store, whatever
    /// happens in between.
    pub async fn execute(
        &self,
        plan: &RunPlan,
        store: &BenchStore,
        artifacts_dir: &Path,
        mut on_progress: Option<ProgressCallback<'_>>,
    ) -> Vec<RunReport> {
        let artifact_store = ArtifactStore::new(artifacts_dir);
        let total = plan.tasks.len() * plan.harness_ids.len();
        let mut completed = 0usize;
        let mut reports = Vec::new();

        for task in &plan.tasks {
            for harness_id in &plan.harness_ids {
                if let Some(cb) = on_progress.as_mut() {
                    cb(&RunProgress {
                        total,
                        completed,
                        current: Some(CurrentPair {
                            task_id: task.id.clone(),
                            harness_id: harness_id.clone(),
                        }),
                    });
                }

                // A missing harness must not abort the batch.
                let adapter = match self.registry.create(harness_id) {
                    Ok(adapter) => adapter,
                    Err(e) => {
                        error!("{}", e);
                        completed += 1;
                        continue;
                    }
                };

                let setup = adapter.setup().await;
                if !setup.ready {
                    error!(
                        "Harness {} not ready: {}",
                        harness_id,
                        setup.error.as_deref().unwrap_or("unknown")
                    );
                    completed += 1;
                    continue;
                }

                if let Some(report) = self
                    .process_pair(task, harness_id, adapter.as_ref(), plan, store, &artifact_store)
                    .await
                {
                    reports.push(report);
                }

                completed += 1;
            }
        }

        if let Some(cb) = on_progress.as_mut() {
            cb(&RunProgress {
                total,
                completed,
                current: None,
            });
        }

        reports
    }

    /// Runs one pair end to end. Returns `None` only when the run record
    /// itself could not be persisted (nothing to attach a result to).
    async fn process_pair(
        &self,
        task: &Task,
        harness_id: &str,
        adapter: &dyn HarnessAdapter,
        plan: &RunPlan,
        store: &BenchStore,
        artifact_store: &ArtifactStore,
    ) -> Option<RunReport> {
        let mut run = Run::dispatch(task.id.as_str(), harness_id, plan.model_id.as_str());

        info!(
            "Dispatching run {}: {} -> {} ({})",
            run.id, harness_id, task.id, plan.model_id
        );

        // Persisted before execution so a crash mid-run is still visible
        // in the store as stuck-running.
        if let Err(e) = store.insert_run(&run).await {
            error!("Failed to persist run {}: {}", run.id, e);
            return None;
        }

        let outcome = match self.provisioner.create_workspace(task, run.id).await {
            Ok(ws) => {
                let attempt = self
                    .attempt_pair(task, adapter, &ws, plan, run.id, store, artifact_store)
                    .await;
                ws.cleanup();
                attempt
            }
            Err(e) => Err(PairFault {
                message: e.to_string(),
                duration_ms: 0,
            }),
        };

        adapter.teardown().await;

        match outcome {
            Ok(pair) => {
                run.finish(pair.status, pair.completed_at, pair.duration_ms);
                Some(RunReport {
                    run,
                    result: pair.result,
                })
            }
            Err(fault) => {
                // Fallback safety net: the run still gets a terminal status
                // and exactly one (zero-score) result.
                error!("Run {} failed: {}", run.id, fault.message);
                let completed_at = Utc::now();

                if let Err(e) = store
                    .update_run_status(run.id, RunStatus::Failed, completed_at, fault.duration_ms)
                    .await
                {
                    error!("Failed to mark run {} as failed: {}", run.id, e);
                }

                let result =
                    RunResult::execution_error(run.id, fault.duration_ms, fault.message.clone());
                if let Err(e) = store.insert_result(&result).await {
                    error!("Failed to persist error result for run {}: {}", run.id, e);
                }

                run.finish(RunStatus::Failed, completed_at, fault.duration_ms);
                Some(RunReport { run, result })
            }
        }
    }

    /// Execution through persistence for one provisioned pair. Any error
    /// here is an orchestrator-internal fault handled by the caller's
    /// safety net.
    async fn attempt_pair(
        &self,
        task: &Task,
        adapter: &dyn HarnessAdapter,
        workspace: &Workspace,
        plan: &RunPlan,
        run_id: Uuid,
        store: &BenchStore,
        artifact_store: &ArtifactStore,
    ) -> Result<PairSuccess, PairFault> {
        // The wall clock starts after provisioning: dependency installs
        // are preparatory work, not agent work.
        let exec_start = Instant::now();
        let elapsed_ms = |start: Instant| start.elapsed().as_millis() as u64;

        let config = ExecutionConfig {
            workspace: workspace.path().to_path_buf(),
            model: plan.model_id.clone(),
            timeout: plan.timeout,
            env: plan.env.clone(),
            streaming: false,
        };

        let exec = adapter.run(task, &config).await;

        let files_changed = workspace::changed_files(workspace.path()).await;
        let diff = workspace::diff_output(workspace.path()).await;
        let diff_stats = workspace::diff_stats(workspace.path()).await;

        let mut artifacts = exec.artifacts.clone();
        artifacts.files_changed = files_changed.clone();
        artifacts.diff = if diff.is_empty() {
            None
        } else {
            Some(diff.clone())
        };

        artifact_store
            .store_run(run_id, &artifacts, &diff)
            .map_err(|e| PairFault {
                message: format!("Failed to store artifacts: {}", e),
                duration_ms: elapsed_ms(exec_start),
            })?;

        if let Some(ref data_dir) = plan.data_dir {
            if let Err(e) = inject_test_files(task, workspace.path(), data_dir) {
                warn!("Failed to inject test files for task {}: {}", task.id, e);
            }
        }

        let grading = self.grader.grade(task, workspace.path()).await;
        let metrics = adapter.collect_metrics(&artifacts).await;

        // The orchestrator's wall clock is authoritative over the
        // adapter's self-reported duration.
        let completed_at = Utc::now();
        let duration_ms = elapsed_ms(exec_start);

        let status = terminal_status(exec.status);

        store
            .update_run_status(run_id, status, completed_at, duration_ms)
            .await
            .map_err(|e| PairFault {
                message: format!("Failed to update run status: {}", e),
                duration_ms,
            })?;

        let result = RunResult {
            run_id,
            passed: grading.passed,
            score: grading.score,
            metrics: ResultMetrics {
                tokens_input: metrics.tokens_input,
                tokens_output: metrics.tokens_output,
                tokens_cache_write: metrics.tokens_cache_write,
                tokens_cache_read: metrics.tokens_cache_read,
                wall_clock_ms: duration_ms,
                tool_calls: metrics.tool_calls,
                tool_calls_by_type: metrics.tool_calls_by_type,
                turns: metrics.turns,
                cost_usd: metrics.cost_usd,
                files_changed: Some(files_changed.len()),
                lines_added: Some(diff_stats.lines_added),
                lines_removed: Some(diff_stats.lines_removed),
                diff_size: Some(diff_stats.diff_size),
            },
            validation: Some(ValidationDetail {
                kind: grading.kind.as_str().to_string(),
                details: grading.details,
                tests_run: grading.tests_run,
                tests_passed: grading.tests_passed,
                tests_failed: grading.tests_failed,
            }),
            error: None,
        };

        store.insert_result(&result).await.map_err(|e| PairFault {
            message: format!("Failed to persist result: {}", e),
            duration_ms,
        })?;

        info!(
            "Run {} {}: score {:.1}, {} ms",
            run_id,
            status,
            result.score,
            duration_ms
        );

        Ok(PairSuccess {
            status,
            completed_at,
            duration_ms,
            result,
        })
    }
}

/// Maps an adapter's execution status onto the run's terminal status.
fn terminal_status(status: ExecutionStatus) -> RunStatus {
    match status {
        ExecutionStatus::Timeout => RunStatus::Timeout,
        ExecutionStatus::Error => RunStatus::Failed,
        ExecutionStatus::Success | ExecutionStatus::Failure => RunStatus::Completed,
    }
}
