//! Generic adapter for any CLI-based harness.
//!
//! Works with agents that accept the prompt on stdin or as a `--prompt`
//! argument. Produces a zero-valued metrics bundle since there is no
//! harness-specific output format to parse.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use super::exec::{BoundedCommand, ProcessOutcome};
use super::{
    result_from_outcome, AdapterMetrics, ExecutionConfig, ExecutionResult, HarnessAdapter,
    SetupStatus,
};
use crate::schema::Task;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Adapter for arbitrary command-line agents.
#[derive(Debug)]
pub struct GenericAdapter {
    id: String,
    name: String,
    command: String,
    args: Vec<String>,
    use_stdin: bool,
}

impl GenericAdapter {
    /// Creates a generic adapter that passes the prompt via stdin.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            command: command.into(),
            args: Vec::new(),
            use_stdin: true,
        }
    }

    /// Sets a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds fixed arguments prepended to every invocation.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Passes the prompt as `--prompt <text>` instead of stdin.
    pub fn with_prompt_arg(mut self) -> Self {
        self.use_stdin = false;
        self
    }
}

#[async_trait]
impl HarnessAdapter for GenericAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn setup(&self) -> SetupStatus {
        let outcome = BoundedCommand::new(&self.command)
            .arg("--version")
            .with_timeout(VERSION_PROBE_TIMEOUT)
            .run()
            .await;

        match outcome {
            ProcessOutcome::Completed {
                exit_code: 0,
                stdout,
                ..
            } => SetupStatus::ready(stdout.trim()),
            _ => SetupStatus::not_ready(format!("{} not found", self.command)),
        }
    }

    async fn run(&self, task: &Task, config: &ExecutionConfig) -> ExecutionResult {
        let start = Instant::now();

        info!(
            "Starting generic agent {} on task {} in {}",
            self.command,
            task.id,
            config.workspace.display()
        );

        let mut cmd = BoundedCommand::new(&self.command)
            .args(self.args.clone())
            .current_dir(&config.workspace)
            .envs(&config.env)
            .with_timeout(config.timeout);

        if self.use_stdin {
            cmd = cmd.with_stdin(task.prompt.clone());
        } else {
            cmd = cmd.arg("--prompt").arg(task.prompt.as_str());
        }

        result_from_outcome(cmd.run().await, start.elapsed())
    }

    async fn collect_metrics(&self, _artifacts: &super::ExecutionArtifacts) -> AdapterMetrics {
        AdapterMetrics {
            turns: 1,
            ..AdapterMetrics::default()
        }
    }
}
